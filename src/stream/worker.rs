use std::sync::Arc;

use tokio::sync::Semaphore;

/// Bounded pool for CPU-bound recognition work. Jobs run on the blocking
/// thread pool; at most `workers` of them at once.
#[derive(Debug, Clone)]
pub struct RecognitionPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl RecognitionPool {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` once a slot is free. The slot is held until the job
    /// returns, even if the caller stops waiting.
    pub async fn run<F, T>(&self, job: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self.permits.clone().acquire_owned().await?;
        let output = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await?;
        Ok(output)
    }
}
