//! Typed endpoints.
//!
//! An [`Endpoint`] is one RPC operation expressed in domain types. The
//! transport decodes the wire message into `Req`, calls the endpoint and
//! encodes `Response`. Because each operation has its own request type, a
//! payload of the wrong shape cannot reach the service.
//!
//! Cross-cutting behavior is added by wrapping one endpoint in another, see
//! [`LoggingMiddleware`](super::middleware::LoggingMiddleware).

use crate::server::service::agent::AgentService;
use agent_tree_core::{
    Result,
    types::{ChildAgentIds, ChildAgentIdsRequest},
};
use async_trait::async_trait;

#[async_trait]
pub trait Endpoint<Req>: Send + Sync
where
    Req: Send + 'static,
{
    type Response: Send;

    /// Short, stable name of the operation, used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn call(&self, req: Req) -> Result<Self::Response>;
}

/// `GetAgentIdsByParentAgentID` on top of an [`AgentService`].
#[derive(Clone, Debug)]
pub struct ChildAgentIdsEndpoint<S> {
    svc: S,
}

impl<S: AgentService> ChildAgentIdsEndpoint<S> {
    pub fn new(svc: S) -> Self {
        Self { svc }
    }
}

#[async_trait]
impl<S: AgentService> Endpoint<ChildAgentIdsRequest> for ChildAgentIdsEndpoint<S> {
    type Response = ChildAgentIds;

    fn name(&self) -> &'static str {
        "get_agent_ids_by_parent_agent_id"
    }

    async fn call(&self, req: ChildAgentIdsRequest) -> Result<ChildAgentIds> {
        self.svc
            .get_child_agent_ids(req.parent_id)
            .await
            .map(ChildAgentIds::from)
    }
}
