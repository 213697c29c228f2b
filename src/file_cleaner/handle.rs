use std::sync::Arc;

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::engine::{CleanupEngine, ProgressCallback};
use super::types::{CleaningCategory, CleaningMode, CleanupReport};
use crate::error::{CleanerError, Result};
use crate::ops::{OperationKind, OperationRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CleanupEvent {
    Progress { message: String, percent: f32 },
    Finished(CleanupReport),
}

/// A cleanup or preview running on the blocking pool.
pub struct CleanupHandle {
    operation_id: String,
    events: mpsc::UnboundedReceiver<CleanupEvent>,
    token: CancellationToken,
    task: JoinHandle<CleanupReport>,
}

impl CleanupEngine {
    /// Run `execute` (or a preview when `dry_run`) on a dedicated worker.
    pub fn spawn(
        self: &Arc<Self>,
        registry: &OperationRegistry,
        mode: CleaningMode,
        selected: Option<Vec<CleaningCategory>>,
        dry_run: bool,
    ) -> Result<CleanupHandle> {
        let kind = if dry_run {
            OperationKind::Preview
        } else {
            OperationKind::Cleanup
        };
        let operation = registry.register(kind)?;
        let operation_id = operation.id().to_string();
        let token = operation.token().clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let engine = Arc::clone(self);
        let worker_token = token.clone();
        let task = task::spawn_blocking(move || {
            let progress = |message: &str, percent: f32| {
                operation.report(message, percent);
                let _ = tx.send(CleanupEvent::Progress {
                    message: message.to_string(),
                    percent,
                });
            };
            let callback: ProgressCallback<'_> = &progress;
            let report = engine.run(
                mode,
                selected.as_deref(),
                Some(callback),
                dry_run,
                worker_token,
            );
            operation.finish(report.state);
            let _ = tx.send(CleanupEvent::Finished(report.clone()));
            report
        });

        Ok(CleanupHandle {
            operation_id,
            events: rx,
            token,
            task,
        })
    }
}

impl CleanupHandle {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn stop(&self) {
        self.token.cancel();
    }

    pub async fn next_event(&mut self) -> Option<CleanupEvent> {
        self.events.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = CleanupEvent> {
        stream::unfold(self.events, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }

    pub async fn finish(mut self) -> Result<(Vec<CleanupEvent>, CleanupReport)> {
        let mut events = Vec::new();
        while let Some(event) = self.events.recv().await {
            events.push(event);
        }
        let report = self.task.await.map_err(|e| CleanerError::Collaborator {
            name: "cleanup worker",
            message: e.to_string(),
        })?;
        Ok((events, report))
    }
}
