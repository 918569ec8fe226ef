use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::ForumSyncConfig;
use crate::curator::GreenlightCurator;
use crate::greenlit::GreenlitRecord;
use crate::platform::ForumPlatform;
use crate::scheduler::PeriodicJob;
use crate::scheduler::ScheduleError;
use crate::store::DocumentStore;
use crate::suggestion::SuggestionCache;
use crate::suggestion::SuggestionReconciler;

/// The reconciliation and curation jobs, sharing one suggestion cache.
///
/// The two jobs are scheduled independently and do not exclude each other.
pub struct SyncServices {
    cache: SuggestionCache,
    reconciler: Arc<SuggestionReconciler>,
    curator: Arc<GreenlightCurator>,
    jobs: Vec<PeriodicJob>,
}

impl SyncServices {
    /// Spawns the cache and both jobs. Must be called inside a tokio runtime.
    /// Fails without spawning either job if a schedule period is zero.
    pub fn start(
        platform: Arc<dyn ForumPlatform>,
        store: Arc<dyn DocumentStore<GreenlitRecord>>,
        config: Arc<ForumSyncConfig>,
    ) -> Result<Self, ScheduleError> {
        let schedule = &config.schedule;
        if schedule.reconcile_interval().is_zero() {
            return Err(ScheduleError::ZeroPeriod("suggestion-reconciler".to_string()));
        }
        if schedule.curate_interval().is_zero() {
            return Err(ScheduleError::ZeroPeriod("greenlight-curator".to_string()));
        }

        let cache = SuggestionCache::spawn();
        let reconciler = Arc::new(SuggestionReconciler::new(
            Arc::clone(&platform),
            cache.clone(),
            Arc::clone(&config),
        ));
        let curator = Arc::new(GreenlightCurator::new(
            platform,
            store,
            cache.clone(),
            Arc::clone(&config),
        ));

        let reconcile_job = {
            let reconciler = Arc::clone(&reconciler);
            PeriodicJob::spawn(
                "suggestion-reconciler",
                Duration::ZERO,
                schedule.reconcile_interval(),
                move || {
                    let reconciler = Arc::clone(&reconciler);
                    async move { reconciler.run_reconciliation().await.map(|_| ()) }
                },
            )?
        };
        let curate_job = {
            let curator = Arc::clone(&curator);
            PeriodicJob::spawn(
                "greenlight-curator",
                schedule.curate_initial_delay(),
                schedule.curate_interval(),
                move || {
                    let curator = Arc::clone(&curator);
                    async move {
                        let promoted = curator.curate_all().await;
                        info!(promoted = promoted.len(), "curation pass finished");
                        Ok::<(), Infallible>(())
                    }
                },
            )?
        };

        Ok(Self {
            cache,
            reconciler,
            curator,
            jobs: vec![reconcile_job, curate_job],
        })
    }

    pub fn cache(&self) -> &SuggestionCache {
        &self.cache
    }

    pub fn reconciler(&self) -> &Arc<SuggestionReconciler> {
        &self.reconciler
    }

    pub fn curator(&self) -> &Arc<GreenlightCurator> {
        &self.curator
    }

    /// Stops both jobs, giving each up to `grace` to finish a running pass.
    pub async fn shutdown(&self, grace: Duration) {
        for job in &self.jobs {
            job.stop(grace).await;
        }
    }
}
