pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod schema;
pub mod store;

pub use config::Config;
pub use context::AppContext;
pub use db::DbPool;
pub use error::StoreError;
pub use store::{DeliveryStore, PgStore};
