pub mod codec;
pub mod file;

pub use file::{compute_next_id, FlatRecordStore};
