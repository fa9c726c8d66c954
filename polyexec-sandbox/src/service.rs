//! Execution service - bounded worker pool in front of the dispatcher

use crate::config::{ExecutorConfig, PoolConfig};
use crate::dispatcher::ExecutionDispatcher;
use crate::language::Language;
use crate::types::{ExecutionRequest, ExecutionResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub const QUEUE_FULL_MESSAGE: &str = "Execution queue is full";
pub const CANCELLED_MESSAGE: &str = "Execution cancelled";

/// Runs requests on at most `workers` executions at once, with at most
/// `queue_depth` more waiting. Cloning shares the pool.
#[derive(Clone)]
pub struct ExecutionService {
    dispatcher: Arc<ExecutionDispatcher>,
    workers: Arc<Semaphore>,
    admitted: Arc<AtomicUsize>,
    pool: PoolConfig,
}

impl ExecutionService {
    pub fn new(dispatcher: ExecutionDispatcher, pool: PoolConfig) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            workers: Arc::new(Semaphore::new(pool.workers.max(1))),
            admitted: Arc::new(AtomicUsize::new(0)),
            pool,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(ExecutionDispatcher::from_config(config), config.pool.clone())
    }

    pub fn dispatcher(&self) -> &ExecutionDispatcher {
        &self.dispatcher
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Requests currently running or waiting for a worker
    pub fn in_flight(&self) -> usize {
        self.admitted.load(Ordering::Acquire)
    }

    /// Execute a request, waiting for a free worker if needed
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        self.execute_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Execute a request that can be abandoned through `cancel`.
    ///
    /// Cancelling drops the execution: its process group is killed and its
    /// workspace removed before the worker is handed to the next request.
    pub async fn execute_with_cancel(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionResult {
        let language = request.language.parse::<Language>().ok();

        let Some(_admission) = Admission::try_admit(&self.admitted, self.capacity()) else {
            tracing::warn!(
                language = %request.language,
                in_flight = self.in_flight(),
                "Rejecting execution, queue is full"
            );
            return ExecutionResult::internal_error(language, QUEUE_FULL_MESSAGE);
        };

        let language_id = request.language.clone();
        let started = Instant::now();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(language = %language_id, "Execution cancelled");
                ExecutionResult::internal_error(language, CANCELLED_MESSAGE)
                    .with_duration(started.elapsed())
            }
            result = self.run_on_worker(request) => result,
        }
    }

    async fn run_on_worker(&self, request: ExecutionRequest) -> ExecutionResult {
        let language = request.language.parse::<Language>().ok();
        let _permit = match self.workers.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return ExecutionResult::internal_error(
                    language,
                    format!("Worker pool unavailable: {}", e),
                )
            }
        };
        self.dispatcher.execute(request).await
    }

    fn capacity(&self) -> usize {
        self.pool.workers.max(1) + self.pool.queue_depth
    }
}

/// Admission slot, counted from acceptance until the result is returned
struct Admission<'a>(&'a AtomicUsize);

impl<'a> Admission<'a> {
    fn try_admit(counter: &'a AtomicUsize, capacity: usize) -> Option<Self> {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < capacity).then_some(n + 1)
            })
            .ok()
            .map(|_| Self(counter))
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}
