//! Periodically reloaded value with lock-free reads.
//!
//! Holds the latest result of an async loader behind an `ArcSwap`. A
//! background task calls the loader on a fixed interval; readers always see
//! the last successful load and never wait for a refresh in flight.

use arc_swap::ArcSwap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

use crate::error::Result;

pub struct AsyncRefreshCache<T> {
    value: Arc<ArcSwap<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> AsyncRefreshCache<T> {
    /// Await the first load, then keep reloading every `period`.
    ///
    /// Fails if the first load fails. Later failures are logged and the
    /// previous value is kept.
    pub async fn new<F, Fut>(load: F, period: Duration) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let value = Arc::new(ArcSwap::from_pointee(load().await?));

        let shared = value.clone();
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                match load().await {
                    Ok(fresh) => {
                        shared.store(Arc::new(fresh));
                        tracing::debug!("refresh cache reloaded");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "refresh cache reload failed, keeping previous value");
                    }
                }
            }
        });

        Ok(Self { value, task })
    }

    /// Latest successfully loaded value.
    pub fn get(&self) -> Arc<T> {
        self.value.load_full()
    }

    /// Stop refreshing. The current value stays readable.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl<T> Drop for AsyncRefreshCache<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
