//! tonic server assembly.
//!
//! Besides the agent tree service itself the server exposes `grpc.health.v1`
//! and gRPC reflection, accepts gRPC-web over HTTP/1.1 with permissive CORS,
//! and turns handler panics into an error response instead of a dropped
//! connection.

use crate::server::service::{endpoint::Endpoint, handler::AgentTreeHandler};
use agent_tree_core::{
    proto::{FILE_DESCRIPTOR_SET, agent_tree_server::AgentTreeServer},
    types::{ChildAgentIds, ChildAgentIdsRequest},
};
use core::future::Future;
use core::time::Duration;
use futures::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::transport::{Server, server::Connected};
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{Any, CorsLayer},
};

/// Serves `endpoint` on every connection yielded by `incoming` until
/// `shutdown` resolves.
///
/// Once `shutdown` resolves the health service reports `NOT_SERVING`, new
/// connections are refused, and in-flight calls are allowed to finish.
pub async fn serve_with_incoming<E, I, IO, IE, F>(
    endpoint: E,
    incoming: I,
    request_timeout: Option<Duration>,
    shutdown: F,
) -> anyhow::Result<()>
where
    E: Endpoint<ChildAgentIdsRequest, Response = ChildAgentIds> + 'static,
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<AgentTreeServer<AgentTreeHandler<E>>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let mut builder = Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true));
    if let Some(timeout) = request_timeout {
        builder = builder.timeout(timeout);
    }

    let shutdown = async move {
        shutdown.await;
        health_reporter
            .set_not_serving::<AgentTreeServer<AgentTreeHandler<E>>>()
            .await;
    };

    builder
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(AgentTreeHandler::new(endpoint).into_server())
        .serve_with_incoming_shutdown(incoming, shutdown)
        .await?;

    tracing::info!("Server shut down successfully");
    Ok(())
}
