use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

use crate::TaskClass;

static FALLBACK: OnceLock<Runtime> = OnceLock::new();

/// Handle of the runtime the caller is on. Outside tokio this is a small
/// process-wide runtime built on first use.
pub fn runtime_handle() -> Handle {
	Handle::try_current().unwrap_or_else(|_| {
		FALLBACK
			.get_or_init(|| {
				Builder::new_multi_thread()
					.enable_all()
					.worker_threads(2)
					.thread_name("quarry-dispatch")
					.build()
					.expect("failed to build quarry fallback runtime")
			})
			.handle()
			.clone()
	})
}

/// Spawns `fut` on the ambient runtime, tagged with `class` in traces.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

/// Runs `f` on the blocking pool of `handle`.
///
/// The pool captures its handle at construction so job bodies keep landing
/// on the same runtime no matter which thread enqueues them.
pub fn spawn_blocking_on<F, R>(handle: &Handle, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = TaskClass::Blocking.as_str(), "worker.spawn_blocking");
	handle.spawn_blocking(f)
}
