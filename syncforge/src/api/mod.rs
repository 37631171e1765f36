//! HTTP surface: analyzer, preview and health endpoints.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{AppState, router, serve};
