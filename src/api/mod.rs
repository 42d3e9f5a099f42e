//! HTTP surface of the service.
//!
//! `api_router()` returns a composable `Router`; `serve()` binds it and runs
//! until shutdown. Handlers only parse requests and shape responses; all
//! document work goes through the batch runner.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;
pub mod upload;

pub use error::ApiError;
pub use router::api_router;
pub use server::{serve, serve_on, ServerError};
pub use types::ApiContext;
