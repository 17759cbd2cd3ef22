//! Request pipeline from the gRPC transport down to the repository.
//!
//! ## Structure
//!
//! - [`handler`] - gRPC service entry point (`AgentTreeHandler`).
//! - [`middleware`] - Endpoint decorators (`LoggingMiddleware`).
//! - [`endpoint`] - Typed operations (`ChildAgentIdsEndpoint`).
//! - [`agent`] - Service seam over the repository (`AgentTreeService`).

pub mod agent;
pub mod endpoint;
pub mod handler;
pub mod middleware;
