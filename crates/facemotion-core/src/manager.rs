use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::SynthesisEngine;
use crate::files::FileStore;
use crate::registry::TaskRegistry;
use crate::scheduler::{SlotPermit, SlotPool};
use crate::types::{
    ArtifactKind, CoreError, Failure, GenerationParams, TaskId, TaskSnapshot, TaskState,
};

/// One uploaded input file, as received from the API layer.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Tunables for [`TaskManager::start`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Concurrent synthesis runs; one per GPU in typical deployments.
    pub gpu_slots: usize,
    /// Maximum queued-but-unadmitted submissions before `create` rejects.
    pub queue_capacity: usize,
    /// Wall-clock ceiling on a single synthesis run.
    pub processing_ceiling: Duration,
    /// Age past which terminal tasks (and their artifacts) are purged.
    /// `None` disables the retention sweeper.
    pub retention: Option<Duration>,
    /// How often the retention sweeper wakes up.
    pub sweep_interval: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            gpu_slots: 1,
            queue_capacity: 64,
            processing_ceiling: Duration::from_secs(30 * 60),
            retention: Some(Duration::from_secs(24 * 60 * 60)),
            sweep_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Owns task records and drives the `Queued → Processing → terminal` state
/// machine.
///
/// `create` persists the inputs, registers the task, and hands its id to the
/// dispatch loop over a bounded channel; it never waits for a GPU slot.  The
/// dispatch loop admits tasks strictly in submission order, and each admitted
/// task runs in its own spawned execution unit holding a [`SlotPermit`] for
/// the duration of the synthesis call.
#[derive(Clone)]
pub struct TaskManager {
    registry: TaskRegistry,
    files: FileStore,
    slots: SlotPool,
    engine: Arc<dyn SynthesisEngine>,
    queue_tx: mpsc::Sender<TaskId>,
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("slots", &self.slots.capacity())
            .finish()
    }
}

impl TaskManager {
    /// Start the manager: spawns the dispatch loop and (if retention is
    /// configured) the sweeper, then returns a cloneable handle.
    pub fn start(files: FileStore, engine: Arc<dyn SynthesisEngine>, options: ManagerOptions) -> Self {
        let registry = TaskRegistry::new();
        let slots = SlotPool::new(options.gpu_slots);
        let (queue_tx, queue_rx) = mpsc::channel::<TaskId>(options.queue_capacity);

        let driver = ExecutionDriver {
            registry: registry.clone(),
            files: files.clone(),
            slots: slots.clone(),
            engine: Arc::clone(&engine),
            ceiling: options.processing_ceiling,
        };
        tokio::spawn(driver.run(queue_rx));

        if let Some(retention) = options.retention {
            tokio::spawn(sweep_loop(
                registry.clone(),
                files.clone(),
                retention,
                options.sweep_interval,
            ));
        }

        Self {
            registry,
            files,
            slots,
            engine,
            queue_tx,
        }
    }

    /// Create a task: validate parameters, persist both inputs, register the
    /// record in state `Queued`, and enqueue it for admission.
    ///
    /// Returns as soon as the id is on the dispatch queue; synthesis happens
    /// in the background.  Validation failures never create a task and leave
    /// nothing on disk.
    pub async fn create(
        &self,
        image: Upload,
        audio: Upload,
        params: GenerationParams,
    ) -> Result<TaskId, CoreError> {
        params.validate()?;

        let id = TaskId::new();
        let image_path = self
            .store_input(id, ArtifactKind::SourceImage, &image)
            .await?;
        let audio_path = self
            .store_input(id, ArtifactKind::DrivenAudio, &audio)
            .await?;

        self.registry
            .insert(id, image_path, audio_path, params)
            .await;

        if let Err(e) = self.queue_tx.try_send(id) {
            self.registry.remove(id).await;
            let _ = self.files.purge(id).await;
            return Err(match e {
                mpsc::error::TrySendError::Full(_) => CoreError::QueueFull {
                    capacity: self.queue_tx.max_capacity(),
                },
                mpsc::error::TrySendError::Closed(_) => CoreError::Shutdown,
            });
        }

        info!(task_id = %id, "task created");
        Ok(id)
    }

    /// Point-in-time snapshot of a task.  Never blocks, never mutates.
    pub async fn status(&self, id: TaskId) -> Result<TaskSnapshot, CoreError> {
        self.registry
            .snapshot(id)
            .await
            .ok_or(CoreError::NotFound(id))
    }

    /// Path of the rendered video, available only once the task completed.
    pub async fn artifact(&self, id: TaskId) -> Result<PathBuf, CoreError> {
        let snapshot = self.status(id).await?;
        match snapshot.state {
            TaskState::Completed { video } => Ok(video),
            TaskState::Failed { failure } => Err(CoreError::Failed { id, failure }),
            TaskState::Queued | TaskState::Processing => Err(CoreError::NotReady(id)),
        }
    }

    /// Best-effort cancellation.
    ///
    /// A queued task fails immediately with `Cancelled` and is skipped by the
    /// dispatcher without consuming a slot.  A processing task is marked the
    /// same way; the engine cannot be interrupted, so its eventual result is
    /// discarded by the registry's terminal guard.  Terminal tasks are left
    /// untouched, which makes the call idempotent.
    pub async fn cancel(&self, id: TaskId) -> Result<TaskSnapshot, CoreError> {
        let snapshot = self.status(id).await?;
        if snapshot.state.is_terminal() {
            return Ok(snapshot);
        }

        self.registry.signal_cancel(id).await;
        if self.registry.fail(id, Failure::cancelled()).await {
            info!(task_id = %id, "task cancelled");
        }
        self.status(id).await
    }

    /// Purge a terminal task: record and all artifacts.  Idempotent at the
    /// file level; the record itself becomes `NotFound` afterwards.
    pub async fn delete(&self, id: TaskId) -> Result<(), CoreError> {
        let snapshot = self.status(id).await?;
        if !snapshot.state.is_terminal() {
            return Err(CoreError::NotTerminal {
                id,
                state: snapshot.state.as_str(),
            });
        }

        self.registry.remove(id).await;
        self.files.purge(id).await?;
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    /// Accelerator availability, for the health probe.
    pub fn accelerator_available(&self) -> bool {
        self.engine.accelerator_available()
    }

    pub fn slot_capacity(&self) -> usize {
        self.slots.capacity()
    }

    pub fn slots_available(&self) -> usize {
        self.slots.available()
    }

    async fn store_input(
        &self,
        id: TaskId,
        kind: ArtifactKind,
        upload: &Upload,
    ) -> Result<PathBuf, CoreError> {
        match self
            .files
            .save(id, kind, &upload.filename, &upload.bytes)
            .await
        {
            Ok(path) => Ok(path),
            Err(e) => {
                // Drop whatever the earlier input already wrote.
                let _ = self.files.purge(id).await;
                Err(e)
            }
        }
    }
}

// ─── Execution driver ─────────────────────────────────────────────────────────

/// Background half of the manager: admits queued tasks FIFO and runs them.
#[derive(Clone)]
struct ExecutionDriver {
    registry: TaskRegistry,
    files: FileStore,
    slots: SlotPool,
    engine: Arc<dyn SynthesisEngine>,
    ceiling: Duration,
}

impl ExecutionDriver {
    /// Dispatch loop.  Receives task ids in submission order and blocks on
    /// slot acquisition for the head-of-line task, so admission order equals
    /// creation order regardless of slot count.
    async fn run(self, mut queue_rx: mpsc::Receiver<TaskId>) {
        while let Some(id) = queue_rx.recv().await {
            self.admit(id).await;
        }
        debug!("dispatch queue closed; driver exiting");
    }

    async fn admit(&self, id: TaskId) {
        let Some(mut cancel_rx) = self.registry.cancel_rx(id).await else {
            // Deleted before admission.
            return;
        };
        if *cancel_rx.borrow_and_update() {
            debug!(task_id = %id, "skipping cancelled task");
            return;
        }

        // Wait for a slot, but drop out of the wait line on cancellation so
        // a cancelled queued task never consumes capacity.
        let permit = tokio::select! {
            biased;
            _ = cancel_rx.changed() => {
                debug!(task_id = %id, "queued task cancelled while waiting for a slot");
                return;
            }
            permit = self.slots.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let Some((image, audio, params)) = self.registry.inputs(id).await else {
            return;
        };

        // Inputs must still exist and be non-empty at admission time; a task
        // whose uploads vanished fails here instead of blocking a slot.
        if let Err(reason) = verify_input(&image).await.and(verify_input(&audio).await) {
            warn!(task_id = %id, %reason, "inputs unavailable at admission");
            self.registry
                .fail(id, Failure::input_unavailable(reason))
                .await;
            return;
        }

        if !self.registry.begin_processing(id).await {
            // Lost a race with cancellation between the select and here.
            return;
        }
        info!(task_id = %id, "task admitted to execution slot");

        let driver = self.clone();
        tokio::spawn(async move {
            driver.execute(id, image, audio, params, permit).await;
        });
    }

    /// One execution unit: runs the engine under the processing ceiling and
    /// records the terminal state *before* the slot permit drops, so a freed
    /// slot always implies a durably recorded outcome.
    async fn execute(
        &self,
        id: TaskId,
        image: PathBuf,
        audio: PathBuf,
        params: GenerationParams,
        permit: SlotPermit,
    ) {
        let result_dir = self.files.task_dir(id, ArtifactKind::Output);
        if let Err(e) = tokio::fs::create_dir_all(&result_dir).await {
            self.registry
                .fail(id, Failure::engine(format!("could not create result dir: {e}")))
                .await;
            drop(permit);
            return;
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.ceiling,
            self.engine.synthesize(&image, &audio, &params, &result_dir),
        )
        .await;

        match outcome {
            Ok(Ok(video)) => {
                if self.registry.complete(id, video.clone()).await {
                    info!(
                        task_id = %id,
                        video = %video.display(),
                        elapsed_ms = started.elapsed().as_millis(),
                        "task completed"
                    );
                } else {
                    // Timed out or cancelled while we were rendering.
                    info!(task_id = %id, "late result discarded; task already terminal");
                }
            }
            Ok(Err(e)) => {
                warn!(task_id = %id, error = %e, "synthesis failed");
                self.registry.fail(id, e.into_failure()).await;
            }
            Err(_) => {
                warn!(
                    task_id = %id,
                    ceiling_s = self.ceiling.as_secs(),
                    "processing ceiling exceeded; the worker may still be running and its result will be discarded"
                );
                self.registry.fail(id, Failure::timeout(self.ceiling)).await;
            }
        }

        drop(permit);
    }
}

async fn verify_input(path: &Path) -> Result<(), String> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(format!("{} is empty or not a regular file", path.display())),
        Err(e) => Err(format!("{}: {e}", path.display())),
    }
}

// ─── Retention sweeper ────────────────────────────────────────────────────────

/// Periodically purge terminal tasks older than the retention window.
/// Non-terminal tasks are never touched, however old.
async fn sweep_loop(
    registry: TaskRegistry,
    files: FileStore,
    retention: Duration,
    interval: Duration,
) {
    let retention = match chrono::Duration::from_std(retention) {
        Ok(d) => d,
        Err(_) => chrono::Duration::hours(24),
    };
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let cutoff = Utc::now() - retention;
        for id in registry.terminal_older_than(cutoff).await {
            registry.remove(id).await;
            match files.purge(id).await {
                Ok(()) => info!(task_id = %id, "expired task purged"),
                Err(e) => warn!(task_id = %id, error = %e, "retention purge failed"),
            }
        }
    }
}
