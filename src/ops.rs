use std::sync::{Arc, Mutex};
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::error::{CleanerError, Result};

pub type OperationId = String;

/// Lifecycle of a long-running scan or cleanup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Stopped | RunState::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    FolderScan,
    Cleanup,
    Preview,
}

impl OperationKind {
    fn label(&self) -> &'static str {
        match self {
            OperationKind::FolderScan => "folder scan",
            OperationKind::Cleanup | OperationKind::Preview => "cleanup",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpState {
    pub id: OperationId,
    pub kind: OperationKind,
    pub started_at_ms: u128,
    pub stage: String,
    pub progress: f32,
    pub status: RunState,
}

/// Current state plus the cancellation token of the run in progress.
/// A fresh token is issued per run so a stop never leaks into the next one.
pub struct RunTracker {
    state: Mutex<RunState>,
    token: Mutex<CancellationToken>,
}

impl Default for RunTracker {
    fn default() -> Self {
        RunTracker {
            state: Mutex::new(RunState::Idle),
            token: Mutex::new(CancellationToken::new()),
        }
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        self.begin_with(token.clone());
        token
    }

    /// Start a run driven by a token the caller already holds.
    pub fn begin_with(&self, token: CancellationToken) {
        *self.token.lock().unwrap_or_else(|p| p.into_inner()) = token;
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = RunState::Running;
    }

    pub fn finish(&self, state: RunState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub fn stop(&self) {
        self.token.lock().unwrap_or_else(|p| p.into_inner()).cancel();
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Tracks live operations and allows one scan and one cleanup per process.
#[derive(Clone)]
pub struct OperationRegistry {
    inner: Arc<DashMap<OperationId, OpState>>,
    scan_sem: Arc<Semaphore>,
    clean_sem: Arc<Semaphore>,
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            scan_sem: Arc::new(Semaphore::new(1)),
            clean_sem: Arc::new(Semaphore::new(1)),
        }
    }

    /// Claim the slot for `kind`, failing with `Busy` if one is already running.
    pub fn register(&self, kind: OperationKind) -> Result<Operation> {
        let sem = match kind {
            OperationKind::FolderScan => &self.scan_sem,
            OperationKind::Cleanup | OperationKind::Preview => &self.clean_sem,
        };
        let permit = sem
            .clone()
            .try_acquire_owned()
            .map_err(|_| CleanerError::Busy(kind.label()))?;

        let id = uuid::Uuid::new_v4().to_string();
        let state = OpState {
            id: id.clone(),
            kind,
            started_at_ms: now_ms(),
            stage: "pending".into(),
            progress: 0.0,
            status: RunState::Running,
        };
        self.inner.insert(id.clone(), state);
        Ok(Operation {
            id,
            token: CancellationToken::new(),
            started_at: Instant::now(),
            registry: self.clone(),
            _permit: permit,
        })
    }

    pub fn get(&self, id: &str) -> Option<OpState> {
        self.inner.get(id).map(|e| e.clone())
    }

    pub fn active(&self) -> Vec<OpState> {
        self.inner.iter().map(|e| e.value().clone()).collect()
    }

    fn update(&self, id: &str, mut f: impl FnMut(&mut OpState)) {
        if let Some(mut entry) = self.inner.get_mut(id) {
            f(entry.value_mut());
        }
    }
}

/// A registered operation. Dropping it releases the slot.
pub struct Operation {
    id: OperationId,
    token: CancellationToken,
    started_at: Instant,
    registry: OperationRegistry,
    _permit: OwnedSemaphorePermit,
}

impl Operation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn report(&self, stage: &str, progress: f32) {
        self.registry.update(&self.id, |s| {
            s.stage = stage.to_string();
            s.progress = progress;
        });
    }

    /// Record the terminal state and release the slot, returning the final state.
    pub fn finish(self, status: RunState) -> Option<OpState> {
        log::debug!(
            "Operation {} finished as {:?} after {:?}",
            self.id,
            status,
            self.started_at.elapsed()
        );
        self.registry.update(&self.id, |s| {
            s.status = status;
            if status == RunState::Completed {
                s.progress = 100.0;
                s.stage = "complete".into();
            }
        });
        self.registry.inner.remove(&self.id).map(|(_, state)| state)
    }
}

impl Drop for Operation {
    fn drop(&mut self) {
        self.registry.inner.remove(&self.id);
    }
}

fn now_ms() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}
