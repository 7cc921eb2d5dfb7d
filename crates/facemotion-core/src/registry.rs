use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, watch};

use crate::types::{Failure, GenerationParams, TaskId, TaskSnapshot, TaskState};

/// The complete in-memory record for a single task.
#[derive(Debug)]
pub struct TaskRecord {
    pub id: TaskId,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub image: PathBuf,
    pub audio: PathBuf,
    pub params: GenerationParams,
    /// Cancellation signal; the dispatcher subscribes while the task waits
    /// for a slot.
    pub cancel_tx: watch::Sender<bool>,
}

/// Injectable, thread-safe task registry.
///
/// Uses a `tokio::sync::RwLock<HashMap>` so many readers can observe task
/// state concurrently while the execution driver updates it.  Status reads
/// return cloned snapshots, never references into the map.
///
/// All state transitions go through the guard methods below
/// ([`Self::begin_processing`], [`Self::complete`], [`Self::fail`]); each
/// checks the current state under the write lock and refuses anything but a
/// forward transition.  That single mechanism makes terminal states permanent
/// and discards late results from timed-out or cancelled workers.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<RwLock<HashMap<TaskId, TaskRecord>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record in state `Queued`.
    pub async fn insert(
        &self,
        id: TaskId,
        image: PathBuf,
        audio: PathBuf,
        params: GenerationParams,
    ) {
        let now = Utc::now();
        let (cancel_tx, _) = watch::channel(false);
        let record = TaskRecord {
            id,
            state: TaskState::Queued,
            created_at: now,
            updated_at: now,
            image,
            audio,
            params,
            cancel_tx,
        };
        self.inner.write().await.insert(id, record);
    }

    /// Return a point-in-time copy of the task's observable state.
    pub async fn snapshot(&self, id: TaskId) -> Option<TaskSnapshot> {
        let guard = self.inner.read().await;
        let record = guard.get(&id)?;
        Some(TaskSnapshot {
            id,
            state: record.state.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Input references and parameters, as stored at creation.
    pub async fn inputs(&self, id: TaskId) -> Option<(PathBuf, PathBuf, GenerationParams)> {
        let guard = self.inner.read().await;
        let record = guard.get(&id)?;
        Some((
            record.image.clone(),
            record.audio.clone(),
            record.params.clone(),
        ))
    }

    /// Subscribe to the task's cancellation signal.
    pub async fn cancel_rx(&self, id: TaskId) -> Option<watch::Receiver<bool>> {
        self.inner
            .read()
            .await
            .get(&id)
            .map(|r| r.cancel_tx.subscribe())
    }

    /// Raise the cancellation signal.  Returns `false` for unknown ids.
    pub async fn signal_cancel(&self, id: TaskId) -> bool {
        match self.inner.read().await.get(&id) {
            Some(record) => {
                // Ignore send errors: no receiver just means nobody is
                // waiting on a slot for this task right now.
                let _ = record.cancel_tx.send(true);
                true
            }
            None => false,
        }
    }

    // ── Transition guards ────────────────────────────────────────────────────

    /// `Queued → Processing`.  Returns `false` if the task is in any other
    /// state (e.g. already cancelled).
    pub async fn begin_processing(&self, id: TaskId) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&id) {
            Some(record) if record.state == TaskState::Queued => {
                record.state = TaskState::Processing;
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// `Processing → Completed`.  Returns `false` if the task already reached
    /// a terminal state, in which case the result must be discarded.
    pub async fn complete(&self, id: TaskId, video: PathBuf) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&id) {
            Some(record) if record.state == TaskState::Processing => {
                record.state = TaskState::Completed { video };
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Any non-terminal state `→ Failed`.  Returns `false` if the task is
    /// already terminal.
    pub async fn fail(&self, id: TaskId, failure: Failure) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get_mut(&id) {
            Some(record) if !record.state.is_terminal() => {
                record.state = TaskState::Failed { failure };
                record.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Remove the record entirely.  Task ids are never reused, so a removed
    /// id simply becomes `NotFound`.
    pub async fn remove(&self, id: TaskId) -> Option<TaskRecord> {
        self.inner.write().await.remove(&id)
    }

    /// Ids of terminal tasks whose last transition is older than `cutoff`.
    /// Non-terminal tasks are never eligible, regardless of age.
    pub async fn terminal_older_than(&self, cutoff: DateTime<Utc>) -> Vec<TaskId> {
        self.inner
            .read()
            .await
            .values()
            .filter(|r| r.state.is_terminal() && r.updated_at < cutoff)
            .map(|r| r.id)
            .collect()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    async fn queued_task(registry: &TaskRegistry) -> TaskId {
        let id = TaskId::new();
        registry
            .insert(id, "img.png".into(), "voice.wav".into(), GenerationParams::default())
            .await;
        id
    }

    #[tokio::test]
    async fn transitions_are_monotonic() {
        let registry = TaskRegistry::new();
        let id = queued_task(&registry).await;

        assert!(registry.begin_processing(id).await);
        // Processing → Queued is not expressible; re-entering Processing is.
        assert!(!registry.begin_processing(id).await);

        assert!(registry.complete(id, "out.mp4".into()).await);
        // Terminal states are permanent.
        assert!(!registry.fail(id, Failure::cancelled()).await);
        assert!(!registry.complete(id, "other.mp4".into()).await);

        let snap = registry.snapshot(id).await.expect("task exists");
        assert!(matches!(snap.state, TaskState::Completed { .. }));
    }

    #[tokio::test]
    async fn fail_is_reachable_straight_from_queued() {
        let registry = TaskRegistry::new();
        let id = queued_task(&registry).await;

        assert!(registry.fail(id, Failure::cancelled()).await);
        // The dispatcher must now refuse to start it.
        assert!(!registry.begin_processing(id).await);
    }

    #[tokio::test]
    async fn late_result_cannot_overwrite_failure() {
        let registry = TaskRegistry::new();
        let id = queued_task(&registry).await;

        assert!(registry.begin_processing(id).await);
        assert!(
            registry
                .fail(id, Failure::timeout(std::time::Duration::from_secs(1)))
                .await
        );
        // The worker finishing afterwards must be discarded.
        assert!(!registry.complete(id, "late.mp4".into()).await);

        let snap = registry.snapshot(id).await.expect("task exists");
        assert!(matches!(snap.state, TaskState::Failed { .. }));
    }

    #[tokio::test]
    async fn snapshot_of_unknown_id_is_none() {
        let registry = TaskRegistry::new();
        assert!(registry.snapshot(TaskId::new()).await.is_none());
    }

    #[tokio::test]
    async fn sweep_only_sees_old_terminal_tasks() {
        let registry = TaskRegistry::new();
        let queued = queued_task(&registry).await;
        let done = queued_task(&registry).await;
        assert!(registry.begin_processing(done).await);
        assert!(registry.complete(done, "out.mp4".into()).await);

        let eligible = registry.terminal_older_than(Utc::now()).await;
        assert!(eligible.contains(&done));
        assert!(!eligible.contains(&queued), "non-terminal tasks are never swept");
    }
}
