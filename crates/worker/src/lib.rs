//! Shared worker runtime primitives for query dispatch.
//!
//! * [`WorkerPool`]: bounded pool whose queued jobs start only once every
//!   attached [`QueuePolicy`] admits them.
//! * [`DelayTimer`] / [`Debouncer`]: one-shot delay gate and trailing-edge
//!   notification coalescing, both driven by tokio time.
//! * [`spawn`] / [`spawn_blocking_on`]: task entry points that fall back to a
//!   process-wide runtime when called outside tokio.

mod class;
mod pool;
mod spawn;
mod timer;
mod token;

pub use class::TaskClass;
pub use pool::{DoneHook, JobId, PolicyRef, PoolConfig, PoolJob, QueuePolicy, WorkerPool};
pub use spawn::{runtime_handle, spawn, spawn_blocking_on};
pub use timer::{Debouncer, DelayTimer};
pub use token::GenerationClock;

