pub mod compactor;
pub mod config;
pub mod engine;
pub mod error;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod ranking;
pub mod recurrence;
pub mod service;
pub mod store;
pub mod wal;

pub use error::{Error, Result};
