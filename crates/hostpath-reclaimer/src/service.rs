//! Async driver: one-shot or periodic reclaim runs with graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use hostpath_types::{Clock, Error, Result};

use crate::host_fs::HostFs;
use crate::reclaimer::DirectoryReclaimer;
use crate::report::ReclaimReport;

/// Runs a [`DirectoryReclaimer`] off the async runtime.
pub struct ReclaimerService<F, C> {
    reclaimer: Arc<DirectoryReclaimer<F, C>>,
}

impl<F, C> Clone for ReclaimerService<F, C> {
    fn clone(&self) -> Self {
        Self {
            reclaimer: Arc::clone(&self.reclaimer),
        }
    }
}

impl<F, C> ReclaimerService<F, C>
where
    F: HostFs + 'static,
    C: Clock + 'static,
{
    pub fn new(reclaimer: DirectoryReclaimer<F, C>) -> Self {
        Self {
            reclaimer: Arc::new(reclaimer),
        }
    }

    /// One run on a blocking thread.
    pub async fn run_once(&self) -> Result<ReclaimReport> {
        let reclaimer = Arc::clone(&self.reclaimer);
        tokio::task::spawn_blocking(move || reclaimer.run())
            .await
            .map_err(|e| Error::Internal(format!("reclaim task failed: {}", e)))?
    }

    /// Run immediately, then every `interval` until `shutdown` flips.
    ///
    /// With no interval a single run is made and its error, if any, is
    /// returned. In periodic mode a failed run is logged and the loop keeps
    /// going. A run in progress is never interrupted by shutdown.
    pub async fn run_periodic<R>(
        &self,
        interval: Option<Duration>,
        mut shutdown: watch::Receiver<bool>,
        mut on_report: R,
    ) -> Result<()>
    where
        R: FnMut(&ReclaimReport),
    {
        loop {
            match self.run_once().await {
                Ok(report) => on_report(&report),
                Err(e) if interval.is_none() || e.is_fatal() => return Err(e),
                Err(e) => tracing::error!(error = %e, "Reclaim run failed"),
            }

            let Some(interval) = interval else {
                return Ok(());
            };
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("Reclaimer stopped");
        Ok(())
    }
}
