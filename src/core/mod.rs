pub mod config;
pub mod db;
pub mod error;
pub mod formatter;
pub mod models;
pub mod schema;
pub mod storage;
pub mod types;
