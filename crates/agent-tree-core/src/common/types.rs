//! # Agent Hierarchy Types
//!
//! Agents form a forest: every agent either is a root (its parent is
//! [`ROOT_PARENT_ID`]) or points at another existing agent. The service only
//! reads this relation.
//!
//! The endpoint layer of the server speaks the typed pair
//! [`ChildAgentIdsRequest`] / [`ChildAgentIds`] rather than the generated
//! protobuf messages, so the transport is the only place that touches the wire
//! types. Conversions in both directions live here.

use crate::proto::{GetAgentIdsByParentAgentIdRequest, GetAgentIdsByParentAgentIdResponse};

/// Identifier of an agent. Matches the `int32` used on the wire.
pub type AgentId = i32;

/// Parent id stored for agents that have no parent.
pub const ROOT_PARENT_ID: AgentId = 0;

/// A row of the agent relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Agent {
    pub agent_id: AgentId,
    pub parent_agent_id: AgentId,
}

impl Agent {
    pub const fn new(agent_id: AgentId, parent_agent_id: AgentId) -> Self {
        Self {
            agent_id,
            parent_agent_id,
        }
    }

    pub const fn root(agent_id: AgentId) -> Self {
        Self::new(agent_id, ROOT_PARENT_ID)
    }

    pub const fn is_root(&self) -> bool {
        self.parent_agent_id == ROOT_PARENT_ID
    }
}

/// Request for the direct children of `parent_id`.
///
/// A `parent_id` of [`ROOT_PARENT_ID`] selects the root agents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChildAgentIdsRequest {
    pub parent_id: AgentId,
}

impl ChildAgentIdsRequest {
    pub const fn new(parent_id: AgentId) -> Self {
        Self { parent_id }
    }

    pub const fn roots() -> Self {
        Self::new(ROOT_PARENT_ID)
    }
}

impl From<GetAgentIdsByParentAgentIdRequest> for ChildAgentIdsRequest {
    fn from(req: GetAgentIdsByParentAgentIdRequest) -> Self {
        Self::new(req.agent_id)
    }
}

impl From<ChildAgentIdsRequest> for GetAgentIdsByParentAgentIdRequest {
    fn from(req: ChildAgentIdsRequest) -> Self {
        Self {
            agent_id: req.parent_id,
        }
    }
}

/// Child agent ids in the order the store returned them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChildAgentIds(pub Vec<AgentId>);

impl From<Vec<AgentId>> for ChildAgentIds {
    fn from(ids: Vec<AgentId>) -> Self {
        Self(ids)
    }
}

impl From<ChildAgentIds> for GetAgentIdsByParentAgentIdResponse {
    fn from(ids: ChildAgentIds) -> Self {
        Self { agent_ids: ids.0 }
    }
}
