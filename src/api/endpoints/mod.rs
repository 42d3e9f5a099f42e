//! Endpoint handlers, one module per concern.

pub mod batch;
pub mod grades;
pub mod health;
