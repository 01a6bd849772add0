//! Remote transport seam and corrective retry dispatch

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::errors::{ReconcileError, Result};
use crate::model::MutationType;

/// One corrected mutation to re-issue against the remote
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRequest {
    pub id: String,
    pub model_name: String,
    pub mutation_type: MutationType,
    pub payload: Value,
    /// Version the remote reported at conflict time, sent as the
    /// precondition for the retry
    pub precondition_version: u64,
}

/// Client able to perform one remote mutation call
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn mutate(&self, request: MutationRequest) -> Result<()>;
}

/// Hook receiving errors from fire-and-forget retry requests
pub type ErrorHook = Arc<dyn Fn(ReconcileError) + Send + Sync>;

/// Fire-and-forget dispatcher for corrective retries.
///
/// The transport reference is non-owning; the owning pipeline may tear
/// it down while conflict operations are still in flight.
pub struct RetryDispatcher {
    transport: Weak<dyn RemoteTransport>,
    error_hook: ErrorHook,
}

impl RetryDispatcher {
    pub fn new(transport: Weak<dyn RemoteTransport>, error_hook: ErrorHook) -> Self {
        Self {
            transport,
            error_hook,
        }
    }

    /// Issue one retry. The caller succeeds once the request is on its
    /// way; the retry's eventual outcome surfaces through the ordinary
    /// sync pipeline, with errors routed to the error hook only.
    pub fn dispatch(&self, request: MutationRequest) -> Result<JoinHandle<()>> {
        let transport = self
            .transport
            .upgrade()
            .ok_or(ReconcileError::TransportUnavailable)?;
        let hook = self.error_hook.clone();

        debug!(
            "Dispatching {} retry for {} {} at version {}",
            request.mutation_type, request.model_name, request.id, request.precondition_version
        );

        Ok(tokio::spawn(async move {
            if let Err(e) = transport.mutate(request).await {
                error!("Retry mutation failed: {}", e);
                hook(e);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct RecordingTransport {
        sent: mpsc::UnboundedSender<MutationRequest>,
        fail: bool,
    }

    #[async_trait]
    impl RemoteTransport for RecordingTransport {
        async fn mutate(&self, request: MutationRequest) -> Result<()> {
            self.sent.send(request).unwrap();
            if self.fail {
                return Err(ReconcileError::RetryDispatch("remote is down".to_string()));
            }
            Ok(())
        }
    }

    fn request() -> MutationRequest {
        MutationRequest {
            id: "t1".to_string(),
            model_name: "Task".to_string(),
            mutation_type: MutationType::Update,
            payload: json!({"id": "t1"}),
            precondition_version: 4,
        }
    }

    #[tokio::test]
    async fn test_dispatch_sends_request() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport: Arc<dyn RemoteTransport> =
            Arc::new(RecordingTransport { sent: tx, fail: false });

        let dispatcher = RetryDispatcher::new(Arc::downgrade(&transport), Arc::new(|_| {}));
        let handle = dispatcher.dispatch(request()).unwrap();
        handle.await.unwrap();

        let sent = rx.recv().await.unwrap();
        assert_eq!(sent.precondition_version, 4);
        assert_eq!(sent.mutation_type, MutationType::Update);
    }

    #[tokio::test]
    async fn test_dispatch_without_transport_is_fatal() {
        let transport: Arc<dyn RemoteTransport> = Arc::new(RecordingTransport {
            sent: mpsc::unbounded_channel().0,
            fail: false,
        });
        let weak = Arc::downgrade(&transport);
        drop(transport);

        let dispatcher = RetryDispatcher::new(weak, Arc::new(|_| {}));
        assert!(matches!(
            dispatcher.dispatch(request()),
            Err(ReconcileError::TransportUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_retry_errors_go_to_hook() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport: Arc<dyn RemoteTransport> =
            Arc::new(RecordingTransport { sent: tx, fail: true });

        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = reported.clone();
        let dispatcher = RetryDispatcher::new(
            Arc::downgrade(&transport),
            Arc::new(move |e| sink.lock().unwrap().push(e.to_string())),
        );

        let handle = dispatcher.dispatch(request()).unwrap();
        handle.await.unwrap();

        // The request still went out, and the failure only reached the hook
        assert!(rx.recv().await.is_some());
        let reported = reported.lock().unwrap();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains("remote is down"));
    }
}
