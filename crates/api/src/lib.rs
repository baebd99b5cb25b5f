//! HTTP API: server, routing, guards, and request/response mapping.

pub mod app;
pub mod config;
pub mod guards;
pub mod middleware;
pub mod telemetry;
