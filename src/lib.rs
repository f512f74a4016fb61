pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod external;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{Address, Amount, EngineEvent, GlobalConfig, Pool, PoolId, PoolStatus, Timestamp};
pub use engine::{Collaborators, LifecycleController, PoolPolicy, Registry};
pub use error::{AppError, EngineError};
