//! Server-side components of the agent tree service.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration.
//! - [`db`] - Process-wide `sqlx` connection pool.
//! - [`repository`] - SQL access to the agent relation.
//! - [`service`] - Service, endpoint, middleware and gRPC handler layers.
//! - [`serve`] - tonic server assembly (health, reflection, gRPC-web).
//! - [`telemetry`] - Logging, and optional OpenTelemetry traces and metrics.

pub mod config;
pub mod db;
pub mod repository;
pub mod serve;
pub mod service;
pub mod telemetry;
