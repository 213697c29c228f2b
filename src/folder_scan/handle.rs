use std::sync::Arc;

use futures::stream::{self, Stream};
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::scanner::FolderScanner;
use super::types::{ScanEvent, ScanRequest, ScanSummary};
use crate::error::{CleanerError, Result};
use crate::ops::{OperationKind, OperationRegistry, RunState};

/// A scan running on the blocking pool. Events arrive in order and the stream
/// ends after `ScanEvent::Completed`.
pub struct ScanHandle {
    operation_id: String,
    events: mpsc::UnboundedReceiver<ScanEvent>,
    token: CancellationToken,
    task: JoinHandle<ScanSummary>,
}

impl FolderScanner {
    /// Start a scan on a dedicated worker. Pre-flight errors (bad root, another
    /// scan already running) are returned here, before anything is spawned.
    ///
    /// The pre-flight runs on the caller's thread: an in-memory cache lookup and,
    /// on a miss, one `metadata` call on the root. On a slow or unresponsive
    /// share that call blocks the calling task; wrap `spawn` in
    /// `tokio::task::block_in_place` there. All walking and sizing happen on the
    /// blocking pool.
    pub fn spawn(
        self: &Arc<Self>,
        request: ScanRequest,
        registry: &OperationRegistry,
    ) -> Result<ScanHandle> {
        let plan = self.prepare(&request)?;
        let operation = registry.register(OperationKind::FolderScan)?;
        let operation_id = operation.id().to_string();
        let token = operation.token().clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let scanner = Arc::clone(self);
        let worker_token = token.clone();
        let task = task::spawn_blocking(move || {
            let mut emit = |event: ScanEvent| {
                match &event {
                    ScanEvent::CandidatesFound { .. } => operation.report("sizing", 0.0),
                    ScanEvent::Progress { percent } => operation.report("sizing", *percent),
                    _ => {}
                }
                // A dropped receiver only means nobody is listening any more.
                let _ = tx.send(event);
            };
            let summary = scanner.run(&request, plan, &worker_token, &mut emit);
            let state = if summary.stopped {
                RunState::Stopped
            } else {
                RunState::Completed
            };
            operation.finish(state);
            summary
        });

        Ok(ScanHandle {
            operation_id,
            events: rx,
            token,
            task,
        })
    }
}

impl ScanHandle {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    /// Cooperative stop: already-sized folders are still delivered.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub async fn next_event(&mut self) -> Option<ScanEvent> {
        self.events.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = ScanEvent> {
        stream::unfold(self.events, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }

    /// Drain every remaining event and return them with the final summary.
    pub async fn finish(mut self) -> Result<(Vec<ScanEvent>, ScanSummary)> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let summary = self.task.await.map_err(|e| CleanerError::Collaborator {
            name: "scan worker",
            message: e.to_string(),
        })?;
        Ok((events, summary))
    }
}
