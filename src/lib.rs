pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod gateway;
pub mod model;
pub mod query;
pub mod session;
pub mod store;
pub mod sync;
pub mod ui_state;
pub mod workspace;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::{OpError, OpResult};
pub use gateway::{Gateway, MemoryGateway, SqliteGateway};
pub use session::Session;
pub use workspace::Workspace;
