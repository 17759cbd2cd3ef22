pub mod error;
pub mod types;

pub use error::{Error, Result};

/// gRPC service and message definitions generated from `proto/agent_tree.proto`.
///
/// - [`GetAgentIdsByParentAgentIdRequest`] carries the parent agent id.
/// - [`GetAgentIdsByParentAgentIdResponse`] carries the child ids in store
///   order.
///
/// [`GetAgentIdsByParentAgentIdRequest`]: proto::GetAgentIdsByParentAgentIdRequest
/// [`GetAgentIdsByParentAgentIdResponse`]: proto::GetAgentIdsByParentAgentIdResponse
pub mod proto {
    tonic::include_proto!("agent_tree");

    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("agent_tree_descriptor");
}
