use std::sync::Arc;
use std::time::Duration;

use quarry_worker::{TaskClass, WorkerPool};

use crate::jobs::FindMatchesJob;
use crate::runner::RunnerRef;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Keeps the jobs and runners of a dropped manager alive until those jobs
/// finished or the pool went idle.
pub(super) struct DelayedJobCleaner {
	jobs: Vec<Arc<FindMatchesJob>>,
	runners: Vec<RunnerRef>,
	pool: WorkerPool<FindMatchesJob>,
}

impl DelayedJobCleaner {
	pub fn new(jobs: Vec<Arc<FindMatchesJob>>, runners: Vec<RunnerRef>, pool: WorkerPool<FindMatchesJob>) -> Self {
		Self { jobs, runners, pool }
	}

	fn is_done(&self) -> bool {
		self.jobs.iter().all(|job| job.is_finished()) || self.pool.is_idle()
	}

	pub fn spawn(self) {
		tracing::debug!(jobs = self.jobs.len(), runners = self.runners.len(), "manager.cleaner_start");
		quarry_worker::spawn(TaskClass::Background, async move {
			while !self.is_done() {
				tokio::select! {
					() = self.pool.wait_idle() => {}
					() = tokio::time::sleep(POLL_INTERVAL) => {}
				}
			}
			tracing::debug!(runners = self.runners.len(), "manager.cleaner_done");
		});
	}
}
