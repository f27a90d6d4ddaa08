//! HTTP API layer.
//!
//! Exposes the clinic management operations as JSON endpoints under
//! `/api/`. The router is composable; `api_router()` returns a `Router`
//! that can be mounted on any axum server instance, and `server` owns
//! the bind/spawn/shutdown lifecycle.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{ApiServer, ApiSession};
pub use types::ApiContext;
