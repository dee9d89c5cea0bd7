//! Infrastructure layer: the inventory store, Postgres wiring, config.

pub mod config;
pub mod db;
pub mod store;

mod integration_tests;

pub use config::{AppConfig, ConfigError, DatabaseConfig};
pub use store::{InMemoryProductStore, PostgresProductStore, ProductStore, StoreError};
