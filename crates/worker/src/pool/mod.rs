//! Admission-gated worker pool.
//!
//! # Mental model
//!
//! * Jobs are queued with zero or more [`QueuePolicy`] gates.
//! * A queued job starts only when a thread slot is free and every gate
//!   answers [`QueuePolicy::can_run`] with `true`. Gates that already
//!   admitted the job are released when a later gate refuses.
//! * A refused job stays queued, not paused: it is reconsidered whenever a
//!   job finishes, a job is enqueued, or [`WorkerPool::reschedule`] is called.
//! * Started jobs run to completion on the blocking pool; their gates are
//!   freed and the per-job completion hook fires afterwards.
//!
//! # Invariants
//!
//! * At most `max_threads` jobs run at once.
//! * Queue order is priority descending, then submission order.
//! * Gates are freed exactly once per admitted job, including when the job
//!   body panics.
//! * Dequeued jobs were never admitted and are never freed.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::spawn_blocking_on;


/// One unit of work executed by a [`WorkerPool`].
pub trait PoolJob: Send + Sync + 'static {
	/// Executes the job. Called at most once, on a blocking thread.
	fn run(&self);

	/// Scheduling priority; higher values start first.
	fn priority(&self) -> i32 {
		0
	}
}

/// Admission gate consulted before a queued job may start.
pub trait QueuePolicy<J>: Send + Sync {
	/// Returns `true` to admit the job. An admitting gate has reserved
	/// whatever it guards and expects a matching [`free`](Self::free) or
	/// [`release`](Self::release).
	fn can_run(&self, job: &J) -> bool;

	/// Returns the reservation taken by `can_run` after the job finished.
	fn free(&self, job: &J);

	/// Returns the reservation when another gate refused the job.
	fn release(&self, job: &J) {
		self.free(job);
	}
}

/// Shared handle to a policy gate.
pub type PolicyRef<J> = Arc<dyn QueuePolicy<J>>;

/// Hook invoked on the worker thread once a job has finished and its gates were freed.
pub type DoneHook<J> = Box<dyn FnOnce(Arc<J>) + Send + 'static>;

/// Identifier of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
	/// Upper bound on concurrently running jobs.
	pub max_threads: usize,
}

impl PoolConfig {
	/// Sizes the pool from the detected processor count: two threads per
	/// processor beyond the first, plus two, capped at `max_threads`.
	pub fn from_processors(max_threads: usize) -> Self {
		let processors = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
		Self::for_processors(processors, max_threads)
	}

	/// Same as [`Self::from_processors`] with an explicit processor count.
	pub fn for_processors(processors: usize, max_threads: usize) -> Self {
		let processors = processors.max(1);
		let wanted = 2 + (processors - 1) * 2;
		Self {
			max_threads: wanted.min(max_threads).max(1),
		}
	}
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self::from_processors(16)
	}
}

struct Entry<J> {
	id: JobId,
	priority: i32,
	job: Arc<J>,
	policies: Vec<PolicyRef<J>>,
	on_done: Option<DoneHook<J>>,
}

impl<J> Entry<J> {
	/// Asks every gate in order; rolls back earlier admissions on refusal.
	fn try_admit(&self) -> bool {
		for (idx, policy) in self.policies.iter().enumerate() {
			if !policy.can_run(&self.job) {
				for admitted in &self.policies[..idx] {
					admitted.release(&self.job);
				}
				return false;
			}
		}
		true
	}
}

struct PoolState<J> {
	queue: Vec<Entry<J>>,
	running: usize,
	next_id: u64,
}

struct PoolShared<J> {
	state: Mutex<PoolState<J>>,
	max_threads: usize,
	idle: Notify,
	handle: tokio::runtime::Handle,
}

/// Cloneable handle to a shared admission-gated pool.
pub struct WorkerPool<J> {
	shared: Arc<PoolShared<J>>,
}

impl<J> Clone for WorkerPool<J> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<J> fmt::Debug for WorkerPool<J> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.shared.state.lock();
		f.debug_struct("WorkerPool")
			.field("max_threads", &self.shared.max_threads)
			.field("queued", &state.queue.len())
			.field("running", &state.running)
			.finish()
	}
}

/// Completes a started job on drop so accounting survives a panicking job body.
struct CompletionGuard<J: PoolJob> {
	shared: Arc<PoolShared<J>>,
	entry: Option<Entry<J>>,
}

impl<J: PoolJob> Drop for CompletionGuard<J> {
	fn drop(&mut self) {
		if let Some(entry) = self.entry.take() {
			PoolShared::complete(&self.shared, entry);
		}
	}
}

impl<J: PoolJob> WorkerPool<J> {
	/// Creates a pool bound to the ambient (or global fallback) runtime.
	pub fn new(config: PoolConfig) -> Self {
		Self {
			shared: Arc::new(PoolShared {
				state: Mutex::new(PoolState {
					queue: Vec::new(),
					running: 0,
					next_id: 0,
				}),
				max_threads: config.max_threads.max(1),
				idle: Notify::new(),
				handle: crate::runtime_handle(),
			}),
		}
	}

	/// Queues a job behind the given gates and starts whatever is admissible.
	pub fn enqueue(&self, job: Arc<J>, policies: Vec<PolicyRef<J>>, on_done: Option<DoneHook<J>>) -> JobId {
		let id = {
			let mut state = self.shared.state.lock();
			state.next_id = state.next_id.wrapping_add(1);
			let id = JobId(state.next_id);
			let priority = job.priority();
			let at = state.queue.partition_point(|queued| queued.priority >= priority);
			state.queue.insert(
				at,
				Entry {
					id,
					priority,
					job,
					policies,
					on_done,
				},
			);
			tracing::trace!(job = id.0, priority, queued = state.queue.len(), running = state.running, "pool.enqueue");
			id
		};
		PoolShared::pump(&self.shared);
		id
	}

	/// Removes every job that has not started yet and returns them.
	pub fn dequeue(&self) -> Vec<Arc<J>> {
		let drained: Vec<_> = {
			let mut state = self.shared.state.lock();
			state.queue.drain(..).collect()
		};
		if !drained.is_empty() {
			tracing::debug!(count = drained.len(), "pool.dequeue");
		}
		let jobs = drained.into_iter().map(|entry| entry.job).collect();
		self.shared.notify_if_idle();
		jobs
	}

	/// Removes one not-yet-started job. Returns `false` if it already started or is unknown.
	pub fn dequeue_job(&self, id: JobId) -> bool {
		let removed = {
			let mut state = self.shared.state.lock();
			match state.queue.iter().position(|entry| entry.id == id) {
				Some(idx) => {
					state.queue.remove(idx);
					true
				}
				None => false,
			}
		};
		if removed {
			self.shared.notify_if_idle();
		}
		removed
	}

	/// Re-evaluates gates of queued jobs, e.g. after a delay expired.
	pub fn reschedule(&self) {
		PoolShared::pump(&self.shared);
	}

	/// Returns `true` when nothing is queued or running.
	pub fn is_idle(&self) -> bool {
		self.shared.is_idle()
	}

	/// Number of jobs waiting for admission.
	pub fn queued_len(&self) -> usize {
		self.shared.state.lock().queue.len()
	}

	/// Number of jobs currently executing.
	pub fn running_len(&self) -> usize {
		self.shared.state.lock().running
	}

	/// Upper bound on concurrently running jobs.
	pub fn max_threads(&self) -> usize {
		self.shared.max_threads
	}

	/// Resolves once the pool has nothing queued or running.
	pub async fn wait_idle(&self) {
		loop {
			let notified = self.shared.idle.notified();
			tokio::pin!(notified);
			notified.as_mut().enable();
			if self.is_idle() {
				return;
			}
			notified.await;
		}
	}
}

impl<J> PoolShared<J> {
	fn is_idle(&self) -> bool {
		let state = self.state.lock();
		state.queue.is_empty() && state.running == 0
	}

	fn notify_if_idle(&self) {
		if self.is_idle() {
			self.idle.notify_waiters();
		}
	}
}

impl<J: PoolJob> PoolShared<J> {
	/// Starts admissible jobs while thread slots are free.
	fn pump(shared: &Arc<Self>) {
		let started: Vec<Entry<J>> = {
			let mut state = shared.state.lock();
			let mut started = Vec::new();
			while state.running < shared.max_threads {
				let Some(idx) = state.queue.iter().position(Entry::try_admit) else {
					break;
				};
				let entry = state.queue.remove(idx);
				state.running += 1;
				started.push(entry);
			}
			started
		};

		for entry in started {
			tracing::trace!(job = entry.id.0, "pool.start");
			let guard = CompletionGuard {
				shared: Arc::clone(shared),
				entry: Some(entry),
			};
			spawn_blocking_on(&shared.handle, move || {
				if let Some(entry) = guard.entry.as_ref() {
					entry.job.run();
				}
				drop(guard);
			});
		}
	}

	fn complete(shared: &Arc<Self>, mut entry: Entry<J>) {
		for policy in &entry.policies {
			policy.free(&entry.job);
		}
		{
			let mut state = shared.state.lock();
			state.running = state.running.saturating_sub(1);
		}
		tracing::trace!(job = entry.id.0, "pool.finish");

		if let Some(on_done) = entry.on_done.take() {
			on_done(Arc::clone(&entry.job));
		}

		Self::pump(shared);
		shared.notify_if_idle();
	}
}
