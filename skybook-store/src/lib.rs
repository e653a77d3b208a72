pub mod app_config;
pub mod database;
pub mod mem;
pub mod pg;

pub use app_config::Config;
pub use database::DbClient;
pub use mem::{MemConn, MemStore};
pub use pg::PgStore;
