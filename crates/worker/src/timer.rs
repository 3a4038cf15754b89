//! Timer primitives used for admission delays and notification coalescing.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::{TaskClass, spawn};

/// Stand-in deadline for delays too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(delay: Duration) -> Instant {
	let now = Instant::now();
	now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

#[derive(Debug, Default)]
struct DelayState {
	deadline: Option<Instant>,
	generation: u64,
}

/// Restartable one-shot timer.
///
/// The timer is *pending* from [`start`](Self::start) until its deadline
/// passes. Restarting moves the deadline and invalidates expiry callbacks
/// armed by earlier starts.
#[derive(Debug, Clone, Default)]
pub struct DelayTimer {
	state: Arc<Mutex<DelayState>>,
}

impl DelayTimer {
	/// Creates an idle timer.
	pub fn new() -> Self {
		Self::default()
	}

	/// Starts (or restarts) the timer and returns the arm generation.
	pub fn start(&self, delay: Duration) -> u64 {
		let mut state = self.state.lock();
		state.generation = state.generation.wrapping_add(1);
		state.deadline = Some(deadline_after(delay));
		state.generation
	}

	/// Starts the timer and runs `on_expire` once the deadline passes,
	/// unless the timer was restarted or stopped in between.
	pub fn arm<F>(&self, delay: Duration, on_expire: F)
	where
		F: FnOnce() + Send + 'static,
	{
		let generation = self.start(delay);
		let Some(deadline) = self.deadline() else {
			return;
		};
		let timer = self.clone();
		spawn(TaskClass::Interactive, async move {
			tokio::time::sleep_until(deadline).await;
			if timer.is_current(generation) {
				on_expire();
			}
		});
	}

	/// Cancels the pending deadline.
	pub fn stop(&self) {
		let mut state = self.state.lock();
		state.generation = state.generation.wrapping_add(1);
		state.deadline = None;
	}

	/// Returns `true` while the deadline lies in the future.
	pub fn is_pending(&self) -> bool {
		self.state.lock().deadline.is_some_and(|deadline| Instant::now() < deadline)
	}

	/// Returns the active deadline, if any.
	pub fn deadline(&self) -> Option<Instant> {
		self.state.lock().deadline
	}

	fn is_current(&self, generation: u64) -> bool {
		self.state.lock().generation == generation
	}
}

#[derive(Debug, Default)]
struct DebounceState {
	deadline: Option<Instant>,
	waiter: bool,
}

/// Trailing-edge debouncer.
///
/// Every [`trigger`](Debouncer::trigger) pushes the deadline out by the
/// quiet interval; the callback runs once the interval elapses without
/// another trigger. A burst is served by a single waiting task that
/// follows the moving deadline.
#[derive(Clone)]
pub struct Debouncer {
	interval: Duration,
	state: Arc<Mutex<DebounceState>>,
	callback: Arc<dyn Fn() + Send + Sync>,
}

impl fmt::Debug for Debouncer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.state.lock();
		f.debug_struct("Debouncer")
			.field("interval", &self.interval)
			.field("deadline", &state.deadline)
			.field("waiter", &state.waiter)
			.finish()
	}
}

impl Debouncer {
	/// Creates a debouncer that invokes `callback` after `interval` of quiet.
	pub fn new<F>(interval: Duration, callback: F) -> Self
	where
		F: Fn() + Send + Sync + 'static,
	{
		Self {
			interval,
			state: Arc::new(Mutex::new(DebounceState::default())),
			callback: Arc::new(callback),
		}
	}

	/// Restarts the quiet interval.
	pub fn trigger(&self) {
		let mut state = self.state.lock();
		state.deadline = Some(deadline_after(self.interval));
		if state.waiter {
			return;
		}
		state.waiter = true;
		drop(state);

		let shared = Arc::clone(&self.state);
		let callback = Arc::clone(&self.callback);
		spawn(TaskClass::Interactive, async move {
			loop {
				let Some(deadline) = shared.lock().deadline else {
					break;
				};
				tokio::time::sleep_until(deadline).await;

				let mut state = shared.lock();
				match state.deadline {
					Some(current) if current == deadline => {
						state.deadline = None;
						state.waiter = false;
						drop(state);
						callback();
						return;
					}
					Some(_) => continue,
					None => break,
				}
			}
			shared.lock().waiter = false;
		});
	}

	/// Drops any pending callback.
	pub fn cancel(&self) {
		self.state.lock().deadline = None;
	}

	/// Returns `true` while a callback is scheduled.
	pub fn is_pending(&self) -> bool {
		self.state.lock().deadline.is_some()
	}

	/// Returns the quiet interval.
	pub fn interval(&self) -> Duration {
		self.interval
	}
}
