//! Per-runner search jobs and their admission policies.
//!
//! Normal-speed runners are gated by [`RateCapPolicy`], which bounds how
//! many jobs of one runner (keyed by name) run at once. Slow runners are
//! gated by [`DelayPolicy`] instead, which holds them back until a shared
//! [`DelayTimer`] expires so quick typing does not start expensive searches
//! that are about to be invalidated.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use quarry_worker::{DelayTimer, PolicyRef, PoolJob, QueuePolicy};

use crate::runner::{RunnerRef, RunnerSpeed};
use crate::session::{MatchContext, QuerySession};

/// One runner searching one session instance.
pub struct FindMatchesJob {
	runner: RunnerRef,
	session: QuerySession,
	delay: Option<DelayTimer>,
	finished: AtomicBool,
}

impl std::fmt::Debug for FindMatchesJob {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FindMatchesJob")
			.field("runner", &self.runner.id())
			.field("generation", &self.session.generation())
			.field("delayed", &self.delay.is_some())
			.field("finished", &self.is_finished())
			.finish()
	}
}

struct FinishOnDrop<'a>(&'a AtomicBool);

impl Drop for FinishOnDrop<'_> {
	fn drop(&mut self) {
		self.0.store(true, Ordering::Release);
	}
}

impl FindMatchesJob {
	pub fn new(runner: RunnerRef, session: QuerySession, delay: Option<DelayTimer>) -> Self {
		Self {
			runner,
			session,
			delay,
			finished: AtomicBool::new(false),
		}
	}

	pub fn runner(&self) -> &RunnerRef {
		&self.runner
	}

	pub fn session(&self) -> &QuerySession {
		&self.session
	}

	/// Timer gating this job, present for slow runners only.
	pub fn delay_timer(&self) -> Option<&DelayTimer> {
		self.delay.as_ref()
	}

	/// Whether the job body has returned (or unwound).
	pub fn is_finished(&self) -> bool {
		self.finished.load(Ordering::Acquire)
	}
}

impl PoolJob for FindMatchesJob {
	fn run(&self) {
		let _finish = FinishOnDrop(&self.finished);
		if !self.session.is_valid() {
			tracing::trace!(runner = self.runner.id(), "job.skip_stale");
			return;
		}
		tracing::trace!(runner = self.runner.id(), generation = self.session.generation(), "job.find_matches");
		let ctx = MatchContext::new(&self.session, &self.runner);
		self.runner.find_matches(&ctx);
	}

	fn priority(&self) -> i32 {
		self.runner.priority() as i32
	}
}

/// Bounds concurrently admitted jobs per runner name.
///
/// Admission increments the running count for the job's runner when it is
/// below the cap; [`free`](QueuePolicy::free) decrements it again.
#[derive(Debug)]
pub struct RateCapPolicy {
	cap: AtomicUsize,
	running: Mutex<HashMap<String, usize>>,
}

impl RateCapPolicy {
	pub fn new(cap: usize) -> Self {
		Self {
			cap: AtomicUsize::new(cap),
			running: Mutex::new(HashMap::new()),
		}
	}

	pub fn cap(&self) -> usize {
		self.cap.load(Ordering::Relaxed)
	}

	pub fn set_cap(&self, cap: usize) {
		self.cap.store(cap, Ordering::Relaxed);
	}

	/// Admitted, not yet freed jobs for runner `name`.
	pub fn running(&self, name: &str) -> usize {
		self.running.lock().get(name).copied().unwrap_or(0)
	}
}

impl QueuePolicy<FindMatchesJob> for RateCapPolicy {
	fn can_run(&self, job: &FindMatchesJob) -> bool {
		let name = job.runner().name();
		let cap = self.cap();
		let mut running = self.running.lock();
		let count = running.entry(name.to_string()).or_insert(0);
		if *count >= cap {
			tracing::trace!(runner = name, cap, "job.rate_capped");
			return false;
		}
		*count += 1;
		true
	}

	fn free(&self, job: &FindMatchesJob) {
		let name = job.runner().name();
		let mut running = self.running.lock();
		if let Some(count) = running.get_mut(name) {
			*count = count.saturating_sub(1);
			if *count == 0 {
				running.remove(name);
			}
		}
	}
}

/// Refuses jobs while their delay timer is pending.
#[derive(Debug, Default)]
pub struct DelayPolicy;

impl QueuePolicy<FindMatchesJob> for DelayPolicy {
	fn can_run(&self, job: &FindMatchesJob) -> bool {
		job.delay_timer().is_none_or(|timer| !timer.is_pending())
	}

	fn free(&self, _job: &FindMatchesJob) {}
}

/// Owns the admission policies and the shared slow-runner timer for one manager.
#[derive(Clone)]
pub struct AdmissionController {
	rate_cap: Arc<RateCapPolicy>,
	delay: Arc<DelayPolicy>,
	delay_timer: DelayTimer,
	slow_delay: Duration,
}

impl std::fmt::Debug for AdmissionController {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("AdmissionController")
			.field("cap", &self.rate_cap.cap())
			.field("slow_delay", &self.slow_delay)
			.finish()
	}
}

impl AdmissionController {
	pub fn new(cap: usize, slow_delay: Duration) -> Self {
		Self {
			rate_cap: Arc::new(RateCapPolicy::new(cap)),
			delay: Arc::new(DelayPolicy),
			delay_timer: DelayTimer::new(),
			slow_delay,
		}
	}

	pub fn rate_cap(&self) -> &RateCapPolicy {
		&self.rate_cap
	}

	pub fn delay_timer(&self) -> &DelayTimer {
		&self.delay_timer
	}

	pub fn slow_delay(&self) -> Duration {
		self.slow_delay
	}

	/// Gates for a new job of `runner`, plus the timer to attach to it.
	pub fn policies_for(&self, runner: &RunnerRef) -> (Vec<PolicyRef<FindMatchesJob>>, Option<DelayTimer>) {
		match runner.speed() {
			RunnerSpeed::Slow => {
				let delay: PolicyRef<FindMatchesJob> = self.delay.clone();
				(vec![delay], Some(self.delay_timer.clone()))
			}
			RunnerSpeed::Normal => {
				let cap: PolicyRef<FindMatchesJob> = self.rate_cap.clone();
				(vec![cap], None)
			}
		}
	}

	/// Restarts the slow-runner delay; `on_expire` runs once it elapses.
	pub fn arm_delay<F>(&self, on_expire: F)
	where
		F: FnOnce() + Send + 'static,
	{
		self.delay_timer.arm(self.slow_delay, on_expire);
	}
}
