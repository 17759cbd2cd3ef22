//! Business-facing service layer.
//!
//! The service adds nothing to the repository call. It exists so the endpoint
//! and transport layers depend on [`AgentService`] rather than on storage.

use crate::server::repository::AgentRepository;
use agent_tree_core::{Result, types::AgentId};
use async_trait::async_trait;

#[async_trait]
pub trait AgentService: Send + Sync {
    async fn get_child_agent_ids(&self, parent_id: AgentId) -> Result<Vec<AgentId>>;
}

/// Forwards every call to its repository unchanged.
#[derive(Clone, Debug)]
pub struct AgentTreeService<R> {
    repo: R,
}

impl<R: AgentRepository> AgentTreeService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<R: AgentRepository> AgentService for AgentTreeService<R> {
    async fn get_child_agent_ids(&self, parent_id: AgentId) -> Result<Vec<AgentId>> {
        self.repo.get_child_agent_ids(parent_id).await
    }
}
