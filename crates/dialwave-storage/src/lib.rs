//! Dialwave Storage - Campaign and call queue persistence
//!
//! This crate provides the `CampaignStore` abstraction used by the
//! scheduling core, backed by PostgreSQL or an in-memory store.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
