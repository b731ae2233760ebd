//! Per-resource tick serialization
//!
//! Each resource gets one worker task fed by a bounded queue, so a tick never
//! reads lag reports while an earlier tick of the same resource is still being
//! written. Different resources run on independent workers and never wait on
//! each other.
//!
//! A worker unregisters itself when it goes idle, exits or panics. It only
//! retires while no tick is queued and holding the map's entry lock, so a
//! replacement worker never runs next to a predecessor with pending work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::{ForecastStepOrchestrator, TickError};
use crate::models::{CyberReport, ResourceId};
use crate::observability::SentinelMetrics;

/// Default per-resource queue depth
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Default time a worker waits for a tick before retiring
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

struct TickRequest {
    season_index: i64,
    actual_value: f64,
    reply: oneshot::Sender<Result<CyberReport, TickError>>,
}

/// resource_id -> queue of the resource's worker
type WorkerMap = DashMap<ResourceId, mpsc::Sender<TickRequest>>;

/// Routes ticks to a single writer per resource
pub struct TickDispatcher {
    orchestrator: Arc<ForecastStepOrchestrator>,
    workers: Arc<WorkerMap>,
    queue_depth: usize,
    idle_timeout: Duration,
    closed: AtomicBool,
    metrics: SentinelMetrics,
}

impl TickDispatcher {
    pub fn new(orchestrator: Arc<ForecastStepOrchestrator>) -> Self {
        Self {
            orchestrator,
            workers: Arc::new(DashMap::new()),
            queue_depth: DEFAULT_QUEUE_DEPTH,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            closed: AtomicBool::new(false),
            metrics: SentinelMetrics::new(),
        }
    }

    /// Set the number of ticks that may wait per resource
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Set how long a worker without ticks stays alive
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn orchestrator(&self) -> &Arc<ForecastStepOrchestrator> {
        &self.orchestrator
    }

    /// Process one tick on the resource's worker and wait for its report
    ///
    /// Ticks submitted for the same resource run one at a time in submission
    /// order. After [`Self::shutdown`] every call fails with
    /// [`TickError::ShuttingDown`]. Must be called from within a tokio runtime.
    pub async fn submit(
        &self,
        resource_id: ResourceId,
        season_index: i64,
        actual_value: f64,
    ) -> Result<CyberReport, TickError> {
        if self.is_shut_down() {
            return Err(TickError::ShuttingDown);
        }

        let (reply, response) = oneshot::channel();
        let mut request = TickRequest {
            season_index,
            actual_value,
            reply,
        };

        // The worker may retire between handing out its queue and the send;
        // the tick is then handed back and goes to a fresh worker.
        for _ in 0..2 {
            let queue = self.worker_for(resource_id)?;
            match queue.send(request).await {
                Ok(()) => {
                    return response
                        .await
                        .map_err(|_| TickError::WorkerUnavailable(resource_id))?;
                }
                Err(mpsc::error::SendError(returned)) => {
                    self.workers
                        .remove_if(&resource_id, |_, current| current.same_channel(&queue));
                    request = returned;
                }
            }
        }

        Err(TickError::WorkerUnavailable(resource_id))
    }

    /// Number of resources with a running worker
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting ticks and close every queue
    ///
    /// Workers finish the ticks already queued and exit. No worker is started
    /// afterwards, so a draining worker is never joined by a second writer.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        info!(workers = self.workers.len(), "Shutting down tick workers");
        self.workers.clear();
    }

    fn worker_for(&self, resource_id: ResourceId) -> Result<mpsc::Sender<TickRequest>, TickError> {
        let (queue, worker) = match self.workers.entry(resource_id) {
            Entry::Occupied(entry) => return Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                // Checked under the entry lock so shutdown's clear sees any worker registered here
                if self.is_shut_down() {
                    return Err(TickError::ShuttingDown);
                }
                let (queue, worker) = self.new_worker(resource_id);
                entry.insert(queue.clone());
                (queue, worker)
            }
        };

        // Spawned after the entry lock is released; the worker's drop takes it again
        tokio::spawn(worker.run(self.orchestrator.clone(), self.idle_timeout));
        Ok(queue)
    }

    fn new_worker(&self, resource_id: ResourceId) -> (mpsc::Sender<TickRequest>, Worker) {
        let (queue, requests) = mpsc::channel::<TickRequest>(self.queue_depth);
        self.metrics.inc_active_workers();

        let worker = Worker {
            resource_id,
            requests,
            workers: self.workers.clone(),
            metrics: self.metrics.clone(),
        };
        (queue, worker)
    }
}

impl Drop for TickDispatcher {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.workers.clear();
    }
}

/// What an idle worker found when it tried to retire
enum Idle {
    Retired,
    /// A tick arrived just before retiring
    Pending(TickRequest),
    /// Already removed from the map by shutdown
    Detached,
}

/// Receiving end of one resource's queue
///
/// Dropping it, on a normal exit or while unwinding from a panic, closes the
/// queue and removes the worker from the map.
struct Worker {
    resource_id: ResourceId,
    requests: mpsc::Receiver<TickRequest>,
    workers: Arc<WorkerMap>,
    metrics: SentinelMetrics,
}

impl Worker {
    async fn run(mut self, orchestrator: Arc<ForecastStepOrchestrator>, idle_timeout: Duration) {
        debug!(resource_id = self.resource_id, "Tick worker started");

        loop {
            let request = match tokio::time::timeout(idle_timeout, self.requests.recv()).await {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(_) => match self.retire() {
                    Idle::Pending(request) => request,
                    Idle::Retired => {
                        debug!(resource_id = self.resource_id, "Tick worker idle, retiring");
                        break;
                    }
                    Idle::Detached => continue,
                },
            };

            let result = orchestrator
                .process_tick(self.resource_id, request.season_index, request.actual_value)
                .await;

            if request.reply.send(result).is_err() {
                debug!(
                    resource_id = self.resource_id,
                    season_index = request.season_index,
                    "Submitter went away before the tick completed"
                );
            }
        }
    }

    /// Unregister unless a tick is waiting, under the entry lock
    fn retire(&mut self) -> Idle {
        let requests = &mut self.requests;
        let mut pending = None;

        let removed = self
            .workers
            .remove_if(&self.resource_id, |_, _| match requests.try_recv() {
                Ok(request) => {
                    pending = Some(request);
                    false
                }
                Err(_) => {
                    requests.close();
                    true
                }
            })
            .is_some();

        match pending {
            Some(request) => Idle::Pending(request),
            None if removed => Idle::Retired,
            None => Idle::Detached,
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.requests.close();
        self.workers
            .remove_if(&self.resource_id, |_, queue| queue.is_closed());
        self.metrics.dec_active_workers();
        debug!(resource_id = self.resource_id, "Tick worker stopped");
    }
}
