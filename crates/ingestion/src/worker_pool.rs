//! Bounded pool of async workers with panic containment.
//!
//! Jobs wait in a bounded queue; `submit` blocks once it is full. A job that
//! panics is reported as [`CatalogError::JobFault`] and its worker carries
//! on. Failures land on a bounded error stream; when nobody drains it, new
//! errors are dropped with a warning instead of stalling the workers.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use catalog_common::{CatalogError, CatalogResult};

use crate::config::SyncConfig;

pub type Job = BoxFuture<'static, CatalogResult<()>>;

/// Counts jobs that were submitted but have not finished.
#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    idle: Notify,
}

impl Pending {
    fn start(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn reset(&self) {
        self.count.store(0, Ordering::SeqCst);
        self.idle.notify_waiters();
    }
}

pub struct WorkerPool {
    jobs: StdMutex<Option<mpsc::Sender<Job>>>,
    errors: StdMutex<Option<mpsc::Receiver<CatalogError>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    pending: Arc<Pending>,
}

impl WorkerPool {
    /// Start `workers` workers. Must be called inside a tokio runtime.
    pub fn new(workers: usize, queue_capacity: usize, error_buffer: usize) -> Self {
        let workers = workers.max(1);
        let (job_tx, job_rx) = mpsc::channel::<Job>(queue_capacity.max(1));
        let (error_tx, error_rx) = mpsc::channel(error_buffer.max(1));
        let (shutdown_tx, _) = watch::channel(false);
        let pending = Arc::new(Pending::default());

        let queue = Arc::new(Mutex::new(job_rx));
        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    queue.clone(),
                    error_tx.clone(),
                    shutdown_tx.subscribe(),
                    pending.clone(),
                ))
            })
            .collect();

        info!(workers, queue_capacity, error_buffer, "Worker pool started");

        Self {
            jobs: StdMutex::new(Some(job_tx)),
            errors: StdMutex::new(Some(error_rx)),
            workers: Mutex::new(handles),
            shutdown: shutdown_tx,
            pending,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.workers, config.queue_capacity, config.error_buffer)
    }

    /// Queue a job, waiting for room if the queue is full.
    pub async fn submit<F>(&self, job: F) -> CatalogResult<()>
    where
        F: Future<Output = CatalogResult<()>> + Send + 'static,
    {
        let sender = self
            .jobs
            .lock()
            .map_err(|_| CatalogError::Internal("worker pool lock poisoned".to_string()))?
            .clone()
            .ok_or(CatalogError::PoolClosed)?;

        // Count the job only once it holds a slot, so a caller that gives up
        // while waiting for room leaves nothing behind.
        let permit = sender
            .reserve()
            .await
            .map_err(|_| CatalogError::PoolClosed)?;
        self.pending.start();
        permit.send(Box::pin(job));
        Ok(())
    }

    /// Hand out the error stream. Only the first caller gets it.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<CatalogError>> {
        self.errors.lock().ok().and_then(|mut errors| errors.take())
    }

    /// Jobs submitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Wait until every submitted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.pending.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs and wait for the workers to finish their current
    /// job. Jobs still queued are discarded.
    pub async fn close(&self) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.take();
        }
        self.shutdown.send_replace(true);

        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        let discarded = self.pending();
        if discarded > 0 {
            warn!(discarded, "Discarded queued jobs on close");
        }
        self.pending.reset();
        info!("Worker pool closed");
    }
}

async fn run_worker(
    id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    errors: mpsc::Sender<CatalogError>,
    mut shutdown: watch::Receiver<bool>,
    pending: Arc<Pending>,
) {
    debug!(worker = id, "Worker started");

    loop {
        let job = {
            let mut queue = queue.lock().await;
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            }
        };

        let result = match AssertUnwindSafe(job).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(worker = id, panic = %message, "Job panicked");
                Err(CatalogError::JobFault(message))
            }
        };

        if let Err(e) = result {
            report(&errors, e);
        }
        pending.finish();
    }

    debug!(worker = id, "Worker stopped");
}

fn report(errors: &mpsc::Sender<CatalogError>, err: CatalogError) {
    match errors.try_send(err) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(err)) => {
            warn!(error = %err, "Error stream full, dropping error");
        }
        Err(mpsc::error::TrySendError::Closed(err)) => {
            debug!(error = %err, "Error stream closed");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "job panicked".to_string()
    }
}

/// Drain the error stream, logging every error until the pool goes away.
pub fn spawn_error_supervisor(mut errors: mpsc::Receiver<CatalogError>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(err) = errors.recv().await {
            error!(error = %err, status = err.http_status_code(), "Background job failed");
        }
        debug!("Error supervisor stopped");
    })
}
