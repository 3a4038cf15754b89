//! End-to-end dispatch against real timing: slow-runner delay, rate cap and
//! debounced publication working together.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use quarry_config::{ConfigStore, MemoryStore, Table, Value};
use quarry_runner::{MANAGER_GROUP, ManagerEvent, MatchContext, MatchType, Runner, RunnerManager, RunnerRef, RunnerSpeed, StaticRegistry};
use tokio::time::{sleep, timeout};

async fn wait_until<F>(name: &str, mut condition: F)
where
	F: FnMut() -> bool,
{
	timeout(Duration::from_secs(5), async move {
		loop {
			if condition() {
				return;
			}
			sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.unwrap_or_else(|_| panic!("timed out waiting for {name}"));
}

struct Scripted {
	id: &'static str,
	speed: RunnerSpeed,
	pause: Duration,
	result: Option<(&'static str, MatchType, f64)>,
	started: Mutex<Vec<Instant>>,
}

impl Scripted {
	fn new(id: &'static str, speed: RunnerSpeed, result: Option<(&'static str, MatchType, f64)>) -> Arc<Self> {
		Self::pausing(id, speed, Duration::ZERO, result)
	}

	fn pausing(id: &'static str, speed: RunnerSpeed, pause: Duration, result: Option<(&'static str, MatchType, f64)>) -> Arc<Self> {
		Arc::new(Self {
			id,
			speed,
			pause,
			result,
			started: Mutex::new(Vec::new()),
		})
	}
}

impl Runner for Scripted {
	fn id(&self) -> &str {
		self.id
	}

	fn speed(&self) -> RunnerSpeed {
		self.speed
	}

	fn find_matches(&self, ctx: &MatchContext<'_>) {
		self.started.lock().push(Instant::now());
		std::thread::sleep(self.pause);
		if let Some((text, match_type, relevance)) = self.result {
			ctx.add_match(ctx.new_match().with_id(text).with_text(text).with_type(match_type).with_relevance(relevance));
		}
	}
}

#[derive(Default)]
struct Gated {
	open: Mutex<bool>,
	cv: Condvar,
	searches: AtomicUsize,
}

impl Gated {
	fn release(&self) {
		*self.open.lock() = true;
		self.cv.notify_all();
	}
}

impl Runner for Gated {
	fn id(&self) -> &str {
		"gated"
	}

	fn find_matches(&self, _ctx: &MatchContext<'_>) {
		self.searches.fetch_add(1, Ordering::SeqCst);
		let mut open = self.open.lock();
		while !*open {
			self.cv.wait(&mut open);
		}
	}
}

fn store_with(entries: &[(&str, Value)]) -> Arc<dyn ConfigStore> {
	let group: Table = entries.iter().map(|(key, value)| (key.to_string(), value.clone())).collect();
	let mut root = Table::new();
	root.insert(MANAGER_GROUP.to_string(), Value::Table(group));
	Arc::new(MemoryStore::from_table(root))
}

fn registry(runners: Vec<RunnerRef>) -> Arc<StaticRegistry> {
	Arc::new(runners.into_iter().fold(StaticRegistry::new(), StaticRegistry::with_runner))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_runner_joins_after_delay() {
	let _ = tracing_subscriber::fmt::try_init();
	let a = Scripted::pausing("a", RunnerSpeed::Normal, Duration::from_millis(50), Some(("a1", MatchType::Possible, 0.6)));
	let b = Scripted::new("b", RunnerSpeed::Slow, Some(("b1", MatchType::Exact, 0.9)));
	let c = Scripted::new("c", RunnerSpeed::Normal, None);
	let manager = RunnerManager::new(
		registry(vec![a.clone() as RunnerRef, b.clone() as RunnerRef, c.clone() as RunnerRef]),
		store_with(&[("max_threads", Value::Integer(4))]),
	);
	let mut events = manager.subscribe();

	let launched = Instant::now();
	manager.launch_query("kate", None);

	sleep(Duration::from_millis(150)).await;
	let texts: Vec<String> = manager.matches().iter().map(|m| m.text().to_string()).collect();
	assert_eq!(texts, ["a1"]);
	assert!(b.started.lock().is_empty());
	assert_eq!(c.started.lock().len(), 1);

	wait_until("slow runner result", || manager.matches().len() == 2).await;
	let texts: Vec<String> = manager.matches().iter().map(|m| m.text().to_string()).collect();
	assert_eq!(texts, ["b1", "a1"]);

	let b_started = b.started.lock()[0];
	assert!(b_started.duration_since(launched) >= Duration::from_millis(400));

	let published = timeout(Duration::from_secs(2), async {
		loop {
			if let Ok(ManagerEvent::MatchesChanged(list)) = events.recv().await
				&& list.len() == 2
			{
				return list;
			}
		}
	})
	.await
	.expect("two-match publication");
	assert_eq!(published[0].text(), "b1");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retyping_restarts_slow_delay() {
	let b = Scripted::new("b", RunnerSpeed::Slow, Some(("b1", MatchType::Exact, 0.9)));
	let manager = RunnerManager::new(registry(vec![b.clone() as RunnerRef]), store_with(&[("slow_run_delay_ms", Value::Integer(150))]));

	let launched = Instant::now();
	manager.launch_query("zzqx k", None);
	sleep(Duration::from_millis(100)).await;
	manager.launch_query("zzqx ka", None);
	sleep(Duration::from_millis(100)).await;
	manager.launch_query("zzqx kat", None);

	wait_until("slow runner ran", || !manager.matches().is_empty()).await;
	let started = b.started.lock().clone();
	assert_eq!(started.len(), 1);
	assert!(started[0].duration_since(launched) >= Duration::from_millis(350));
	assert_eq!(manager.query(), "zzqx kat");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn rate_cap_holds_third_job_until_one_frees() {
	let gated = Arc::new(Gated::default());
	let manager = RunnerManager::new(registry(vec![gated.clone() as RunnerRef]), store_with(&[("max_threads", Value::Integer(4))]));

	manager.launch_query("zzqx one", None);
	wait_until("first job", || gated.searches.load(Ordering::SeqCst) == 1).await;
	manager.launch_query("zzqx two", None);
	wait_until("second job", || gated.searches.load(Ordering::SeqCst) == 2).await;
	manager.launch_query("zzqx three", None);

	sleep(Duration::from_millis(100)).await;
	assert_eq!(gated.searches.load(Ordering::SeqCst), 2);
	assert_eq!(manager.old_job_count(), 2);
	assert_eq!(manager.search_job_count(), 1);

	gated.release();
	wait_until("third job", || gated.searches.load(Ordering::SeqCst) == 3).await;
	wait_until("all drained", || manager.search_job_count() == 0 && manager.old_job_count() == 0).await;
}
