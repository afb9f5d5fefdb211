//! HTTP control surface for the ShopGraph recommendation platform
//!
//! Routes: event admission (`/events`), orchestrated recommendations
//! (`/orchestrator/*`), broker introspection (`/rabbitmq/*`), and the
//! aggregated health probe (`/health`).

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use state::AppState;
