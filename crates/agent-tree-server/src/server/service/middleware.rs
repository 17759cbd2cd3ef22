//! Endpoint middleware.
//!
//! [`LoggingMiddleware`] wraps any [`Endpoint`] and emits one event per call
//! with the request, the elapsed time and the error if there was one. A call
//! that is dropped before completing (client cancel, deadline) is logged as
//! cancelled. It never changes what the wrapped endpoint returns.

use crate::server::service::endpoint::Endpoint;
use agent_tree_core::Result;
use async_trait::async_trait;
use core::fmt;
use futures::FutureExt;
use std::any::Any;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct LoggingMiddleware<E> {
    inner: E,
}

impl<E> LoggingMiddleware<E> {
    pub fn new(inner: E) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<Req, E> Endpoint<Req> for LoggingMiddleware<E>
where
    Req: fmt::Debug + Send + 'static,
    E: Endpoint<Req>,
{
    type Response = E::Response;

    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn call(&self, req: Req) -> Result<Self::Response> {
        let mut log = CallLog::start(self.inner.name(), format!("{req:?}"));

        // The panic is re-raised once the event is written.
        let outcome = AssertUnwindSafe(self.inner.call(req)).catch_unwind().await;
        let took = log.finish();
        let (endpoint, request) = (log.endpoint, &log.request);

        match outcome {
            Ok(Ok(resp)) => {
                tracing::info!(endpoint, req = %request, ?took, "request served");
                Ok(resp)
            }
            Ok(Err(error)) => {
                tracing::warn!(endpoint, req = %request, ?took, %error, "request failed");
                Err(error)
            }
            Err(payload) => {
                tracing::error!(
                    endpoint,
                    req = %request,
                    ?took,
                    panic = panic_message(payload.as_ref()),
                    "request panicked"
                );
                resume_unwind(payload)
            }
        }
    }
}

/// Bookkeeping for one call. If the call future is dropped before
/// [`CallLog::finish`] runs (client cancel, deadline) the drop writes the
/// event instead.
struct CallLog {
    endpoint: &'static str,
    request: String,
    begin: Instant,
    finished: bool,
}

impl CallLog {
    fn start(endpoint: &'static str, request: String) -> Self {
        Self {
            endpoint,
            request,
            begin: Instant::now(),
            finished: false,
        }
    }

    fn finish(&mut self) -> Duration {
        self.finished = true;
        self.begin.elapsed()
    }
}

impl Drop for CallLog {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                endpoint = self.endpoint,
                req = %self.request,
                took = ?self.begin.elapsed(),
                "request cancelled"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::service::{
        agent::{AgentTreeService, tests::MockRepository},
        endpoint::ChildAgentIdsEndpoint,
    };
    use agent_tree_core::{
        Error,
        types::{ChildAgentIds, ChildAgentIdsRequest},
    };
    use std::sync::{Arc, Mutex};
    use tracing::{
        Event, Level,
        field::{Field, Visit},
    };
    use tracing_subscriber::{
        Layer,
        layer::{Context, SubscriberExt},
    };

    /// Collects `(level, message)` of every event while installed.
    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<Mutex<Vec<(Level, String)>>>);

    impl CapturedEvents {
        fn take(&self) -> Vec<(Level, String)> {
            core::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for CapturedEvents {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut message = Message::default();
            event.record(&mut message);
            self.0
                .lock()
                .unwrap()
                .push((*event.metadata().level(), message.0));
        }
    }

    #[derive(Default)]
    struct Message(String);

    impl Visit for Message {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    struct StalledEndpoint;

    #[async_trait]
    impl Endpoint<ChildAgentIdsRequest> for StalledEndpoint {
        type Response = ChildAgentIds;

        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn call(&self, _req: ChildAgentIdsRequest) -> Result<ChildAgentIds> {
            core::future::pending::<Result<ChildAgentIds>>().await
        }
    }

    struct PanickingEndpoint;

    #[async_trait]
    impl Endpoint<ChildAgentIdsRequest> for PanickingEndpoint {
        type Response = ChildAgentIds;

        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn call(&self, _req: ChildAgentIdsRequest) -> Result<ChildAgentIds> {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn passes_responses_through() {
        let repo = MockRepository::with_children(&[(2, &[7, 8])]);
        let endpoint = LoggingMiddleware::new(ChildAgentIdsEndpoint::new(AgentTreeService::new(
            repo.clone(),
        )));

        assert_eq!(endpoint.name(), "get_agent_ids_by_parent_agent_id");
        let ids = endpoint.call(ChildAgentIdsRequest::new(2)).await.unwrap();
        assert_eq!(ids, ChildAgentIds(vec![7, 8]));
        assert_eq!(repo.calls(), vec![2]);
    }

    #[tokio::test]
    async fn passes_errors_through() {
        let endpoint = LoggingMiddleware::new(ChildAgentIdsEndpoint::new(AgentTreeService::new(
            MockRepository::failing(),
        )));

        let err = endpoint.call(ChildAgentIdsRequest::new(1)).await.unwrap_err();
        assert!(matches!(err, Error::Storage(sqlx::Error::PoolTimedOut)));
    }

    #[tokio::test]
    async fn resumes_panics_after_logging() {
        let endpoint = LoggingMiddleware::new(PanickingEndpoint);
        let handle =
            tokio::spawn(async move { endpoint.call(ChildAgentIdsRequest::new(1)).await });

        let err = handle.await.unwrap_err();
        assert!(err.is_panic());
        let payload = err.into_panic();
        assert_eq!(panic_message(payload.as_ref()), "boom");
    }

    #[tokio::test]
    async fn cancelled_calls_are_still_logged() {
        let events = CapturedEvents::default();
        let _subscriber =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));

        let endpoint = LoggingMiddleware::new(StalledEndpoint);
        let res = tokio::time::timeout(
            Duration::from_millis(20),
            endpoint.call(ChildAgentIdsRequest::new(4)),
        )
        .await;
        assert!(res.is_err());

        assert_eq!(
            events.take(),
            vec![(Level::WARN, "request cancelled".to_string())]
        );
    }

    #[tokio::test]
    async fn completed_calls_log_exactly_once() {
        let events = CapturedEvents::default();
        let _subscriber =
            tracing::subscriber::set_default(tracing_subscriber::registry().with(events.clone()));

        let endpoint = LoggingMiddleware::new(ChildAgentIdsEndpoint::new(AgentTreeService::new(
            MockRepository::with_children(&[(3, &[9])]),
        )));
        endpoint.call(ChildAgentIdsRequest::new(3)).await.unwrap();
        assert_eq!(
            events.take(),
            vec![(Level::INFO, "request served".to_string())]
        );

        let failing = LoggingMiddleware::new(ChildAgentIdsEndpoint::new(AgentTreeService::new(
            MockRepository::failing(),
        )));
        failing.call(ChildAgentIdsRequest::new(3)).await.unwrap_err();
        assert_eq!(
            events.take(),
            vec![(Level::WARN, "request failed".to_string())]
        );
    }

    #[test]
    fn panic_message_handles_owned_and_static_strings() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "static");
        assert_eq!(panic_message(other.as_ref()), "<non-string panic payload>");
    }
}
