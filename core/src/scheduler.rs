//! Fixed-period background jobs on the shared tokio runtime.

use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("job {0} has a zero period")]
    ZeroPeriod(String),
}

/// A named job that runs after `initial_delay` and then every `period`.
///
/// A run that returns an error or panics is logged; the schedule keeps
/// going. Runs of one job never overlap.
pub struct PeriodicJob {
    name: Arc<str>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicJob {
    pub fn spawn<F, Fut, E>(
        name: impl Into<String>,
        initial_delay: Duration,
        period: Duration,
        job: F,
    ) -> Result<Self, ScheduleError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            return Err(ScheduleError::ZeroPeriod(name));
        }
        let name: Arc<str> = Arc::from(name);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_schedule(
            Arc::clone(&name),
            initial_delay,
            period,
            job,
            cancel.clone(),
        ));
        info!(job = %name, ?initial_delay, ?period, "scheduled periodic job");
        Ok(Self {
            name,
            cancel,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels the schedule and waits up to `grace` for a running job to
    /// finish, aborting it afterwards. Returns `true` if it finished in time.
    pub async fn stop(&self, grace: Duration) -> bool {
        self.cancel.cancel();
        let handle = match self.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut handle) = handle else {
            return true;
        };
        match tokio::time::timeout(grace, &mut handle).await {
            Ok(_) => {
                info!(job = %self.name, "stopped periodic job");
                true
            }
            Err(_) => {
                warn!(job = %self.name, "periodic job did not stop within {grace:?}; aborting");
                handle.abort();
                false
            }
        }
    }
}

impl Drop for PeriodicJob {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_schedule<F, Fut, E>(
    name: Arc<str>,
    initial_delay: Duration,
    period: Duration,
    job: F,
    cancel: CancellationToken,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(initial_delay) => {}
    }

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!(job = %name, "running periodic job");
                match AssertUnwindSafe(job()).catch_unwind().await {
                    Ok(Ok(())) => debug!(job = %name, "periodic job finished"),
                    Ok(Err(err)) => error!(job = %name, error = %err, "periodic job failed"),
                    Err(_) => error!(job = %name, "periodic job panicked"),
                }
            }
        }
    }
    debug!(job = %name, "periodic job schedule exited");
}
