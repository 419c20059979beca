//! Dialwave API - REST surface over the campaign scheduling core
//!
//! Campaign lifecycle actions, the provider's call outcome callback, and a
//! manual scheduler tick.

pub mod handlers;
pub mod routes;

pub use routes::{create_router, AppState};
