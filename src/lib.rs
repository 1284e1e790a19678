pub mod cli;
pub mod core;
pub mod logging;
pub mod service;

pub use crate::core::config::StoreConfig;
pub use crate::core::db::Database;
pub use crate::core::error::{ServiceError, StoreError};
pub use crate::core::storage::FlatRecordStore;
pub use crate::core::types::Record;
