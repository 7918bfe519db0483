pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod storage;
pub mod testing;

mod types;

pub use config::Config;
pub use coordinator::{sanitize, Coordinator, CoordinatorConfig, RetrievedFile};
pub use error::{CoordinatorError, ErrorKind, Result, ServiceError, Stage, StorageError};
pub use manager::StorageManager;
pub use types::*;
