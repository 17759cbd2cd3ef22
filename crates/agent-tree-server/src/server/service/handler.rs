//! gRPC transport for the agent tree.
//!
//! [`AgentTreeHandler`] implements the generated [`AgentTree`] service on top
//! of a typed [`Endpoint`]. It is the only code that touches the protobuf
//! messages: it converts the request into a [`ChildAgentIdsRequest`], calls the
//! endpoint, and builds the response from the returned ids.
//!
//! On failure no response message is built at all; the [`Error`] is mapped
//! onto a `tonic::Status` and returned as is.
//!
//! [`Error`]: agent_tree_core::Error

use crate::server::{
    service::endpoint::Endpoint,
    telemetry::{
        increment_request_errors, increment_requests, record_children_per_request,
        record_request_duration,
    },
};
use agent_tree_core::{
    proto::{
        GetAgentIdsByParentAgentIdRequest, GetAgentIdsByParentAgentIdResponse,
        agent_tree_server::{AgentTree, AgentTreeServer},
    },
    types::{ChildAgentIds, ChildAgentIdsRequest},
};
use std::time::Instant;
use tonic::{Request, Response, Status, codec::CompressionEncoding};

pub struct AgentTreeHandler<E> {
    endpoint: E,
}

impl<E> AgentTreeHandler<E>
where
    E: Endpoint<ChildAgentIdsRequest, Response = ChildAgentIds> + 'static,
{
    pub fn new(endpoint: E) -> Self {
        Self { endpoint }
    }

    /// Wraps the handler in the generated tonic server with every supported
    /// compression scheme enabled in both directions.
    pub fn into_server(self) -> AgentTreeServer<Self> {
        AgentTreeServer::new(self)
            .send_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Deflate)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Deflate)
    }
}

#[tonic::async_trait]
impl<E> AgentTree for AgentTreeHandler<E>
where
    E: Endpoint<ChildAgentIdsRequest, Response = ChildAgentIds> + 'static,
{
    /// Returns the direct children of `agent_id`.
    ///
    /// If `otel-metrics` is enabled, emits request count, error count, request
    /// duration and the number of ids returned.
    #[tracing::instrument(skip_all, fields(agent_id = req.get_ref().agent_id))]
    async fn get_agent_ids_by_parent_agent_id(
        &self,
        req: Request<GetAgentIdsByParentAgentIdRequest>,
    ) -> Result<Response<GetAgentIdsByParentAgentIdResponse>, Status> {
        let start = Instant::now();
        increment_requests();

        let result = self
            .endpoint
            .call(ChildAgentIdsRequest::from(req.into_inner()))
            .await;
        record_request_duration(start.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(ids) => {
                record_children_per_request(ids.0.len() as f64);
                Ok(Response::new(ids.into()))
            }
            Err(e) => {
                increment_request_errors();
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::service::{
        agent::{AgentTreeService, tests::MockRepository},
        endpoint::ChildAgentIdsEndpoint,
        middleware::LoggingMiddleware,
    };
    use tonic::Code;

    type TestHandler =
        AgentTreeHandler<LoggingMiddleware<ChildAgentIdsEndpoint<AgentTreeService<MockRepository>>>>;

    fn handler(repo: MockRepository) -> TestHandler {
        AgentTreeHandler::new(LoggingMiddleware::new(ChildAgentIdsEndpoint::new(
            AgentTreeService::new(repo),
        )))
    }

    #[tokio::test]
    async fn copies_ids_into_response() {
        let repo = MockRepository::with_children(&[(3, &[9]), (0, &[1, 2, 3, 4])]);
        let handler = handler(repo.clone());

        let resp = handler
            .get_agent_ids_by_parent_agent_id(Request::new(GetAgentIdsByParentAgentIdRequest {
                agent_id: 3,
            }))
            .await
            .unwrap();
        assert_eq!(resp.into_inner().agent_ids, vec![9]);

        let resp = handler
            .get_agent_ids_by_parent_agent_id(Request::new(
                GetAgentIdsByParentAgentIdRequest::default(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.into_inner().agent_ids, vec![1, 2, 3, 4]);

        assert_eq!(repo.calls(), vec![3, 0]);
    }

    #[tokio::test]
    async fn empty_result_is_not_an_error() {
        let handler = handler(MockRepository::default());
        let resp = handler
            .get_agent_ids_by_parent_agent_id(Request::new(GetAgentIdsByParentAgentIdRequest {
                agent_id: 10,
            }))
            .await
            .unwrap();
        assert!(resp.into_inner().agent_ids.is_empty());
    }

    #[tokio::test]
    async fn storage_errors_become_status_without_payload() {
        let handler = handler(MockRepository::failing());
        let status = handler
            .get_agent_ids_by_parent_agent_id(Request::new(GetAgentIdsByParentAgentIdRequest {
                agent_id: 1,
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::Unavailable);
    }
}
