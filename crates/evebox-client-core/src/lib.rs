//! evebox-client-core - client library for the EveBox API.
//!
//! This crate contains the request pipeline, the typed API facade, session
//! storage and client configuration. Front ends (the CLI) build on it.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, RequestPipeline};
pub use config::{Config, SessionBackend};
