pub mod config;
pub mod error;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod thread; // pagination + reply-tree assembly shared by both stores

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
