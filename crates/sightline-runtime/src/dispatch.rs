//! Fire-and-forget snapshot submission.

use sightline_trace_capture::UnresolvedStack;
use sightline_types::Snapshot;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::Backend;

pub struct SnapshotDispatcher {
    backend: Arc<dyn Backend>,
    handle: Handle,
}

impl SnapshotDispatcher {
    pub fn new(backend: Arc<dyn Backend>, handle: Handle) -> Self {
        Self { backend, handle }
    }

    /// Queues the snapshot on the blocking pool and returns immediately.
    /// When a stack is given, it is symbolized there and rendered into
    /// `stack_trace` before submission. Failures are logged, never retried.
    pub fn send(&self, mut snapshot: Snapshot, stack: Option<UnresolvedStack>) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        self.handle.spawn_blocking(move || {
            if let Some(stack) = stack {
                snapshot.stack_trace = stack.render();
            }
            match backend.submit_snapshot(&snapshot) {
                Ok(()) => info!(
                    breakpoint = %snapshot.breakpoint_id,
                    file = %snapshot.file_path,
                    line = snapshot.line_number,
                    "snapshot captured"
                ),
                Err(e) => warn!(breakpoint = %snapshot.breakpoint_id, %e, "failed to submit snapshot"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendError;
    use parking_lot::Mutex;
    use sightline_trace_capture::CaptureOptions;
    use sightline_types::{AutoRegistration, BreakpointConfig};
    use std::thread::ThreadId;

    #[derive(Default)]
    struct Sink {
        snapshots: Mutex<Vec<Snapshot>>,
        threads: Mutex<Vec<ThreadId>>,
        fail: bool,
    }

    impl Backend for Sink {
        fn fetch_active(&self, _service_name: &str) -> Result<Vec<BreakpointConfig>, BackendError> {
            Ok(Vec::new())
        }

        fn auto_register(&self, _registration: &AutoRegistration) -> Result<(), BackendError> {
            Ok(())
        }

        fn submit_snapshot(&self, snapshot: &Snapshot) -> Result<(), BackendError> {
            self.snapshots.lock().push(snapshot.clone());
            self.threads.lock().push(std::thread::current().id());
            if self.fail {
                return Err(BackendError::Transport {
                    url: "sink".into(),
                    message: "connection reset".into(),
                });
            }
            Ok(())
        }
    }

    fn snapshot(id: &str) -> Snapshot {
        Snapshot {
            breakpoint_id: id.into(),
            service_name: "checkout".into(),
            file_path: "payment.rs".into(),
            line_number: 42,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn send_submits_in_background() {
        let sink = Arc::new(Sink::default());
        let dispatcher = SnapshotDispatcher::new(Arc::clone(&sink) as Arc<dyn Backend>, Handle::current());

        dispatcher.send(snapshot("bp-1"), None).await.expect("dispatch task");
        let sent = sink.snapshots.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].breakpoint_id, "bp-1");
        assert!(sent[0].stack_trace.is_empty());
    }

    #[tokio::test]
    async fn stack_is_rendered_off_the_caller_before_submission() {
        let sink = Arc::new(Sink::default());
        let dispatcher = SnapshotDispatcher::new(Arc::clone(&sink) as Arc<dyn Backend>, Handle::current());

        let stack = sightline_trace_capture::capture_unresolved(CaptureOptions::default());
        dispatcher.send(snapshot("bp-1"), Some(stack)).await.expect("dispatch task");

        let sent = sink.snapshots.lock();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].stack_trace.starts_with("   0: "), "{}", sent[0].stack_trace);
        let threads = sink.threads.lock();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let sink = Arc::new(Sink {
            fail: true,
            ..Default::default()
        });
        let dispatcher = SnapshotDispatcher::new(Arc::clone(&sink) as Arc<dyn Backend>, Handle::current());

        dispatcher.send(snapshot("bp-1"), None).await.expect("dispatch task");
        dispatcher.send(snapshot("bp-2"), None).await.expect("dispatch task");
        assert_eq!(sink.snapshots.lock().len(), 2);
    }
}
