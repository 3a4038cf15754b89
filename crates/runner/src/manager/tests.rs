use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use quarry_config::{MemoryStore, Table, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{sleep, timeout};

use super::*;
use crate::error::RunnerLoadError;
use crate::kind::QueryKind;
use crate::learning;
use crate::registry::{RunnerOffer, StaticRegistry};
use crate::runner::{Runner, RunnerSyntax};

async fn wait_until<F>(name: &str, mut condition: F)
where
	F: FnMut() -> bool,
{
	timeout(Duration::from_secs(3), async move {
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

async fn next_event<F>(events: &mut broadcast::Receiver<ManagerEvent>, mut wanted: F) -> ManagerEvent
where
	F: FnMut(&ManagerEvent) -> bool,
{
	timeout(Duration::from_secs(3), async {
		loop {
			match events.recv().await {
				Ok(event) if wanted(&event) => return event,
				Ok(_) | Err(RecvError::Lagged(_)) => {}
				Err(RecvError::Closed) => panic!("event channel closed"),
			}
		}
	})
	.await
	.expect("timed out waiting for event")
}

#[derive(Default)]
struct Gate {
	open: Mutex<bool>,
	cv: Condvar,
}

impl Gate {
	fn open(&self) {
		*self.open.lock() = true;
		self.cv.notify_all();
	}

	fn wait(&self) {
		let mut open = self.open.lock();
		while !*open {
			self.cv.wait(&mut open);
		}
	}
}

struct Probe {
	id: &'static str,
	ignored: QueryKind,
	results: Vec<(&'static str, f64)>,
	syntax: Option<RunnerSyntax>,
	gate: Option<Arc<Gate>>,
	searches: AtomicUsize,
	prepared: AtomicUsize,
	torn_down: AtomicUsize,
	queries: Mutex<Vec<String>>,
	runs: Mutex<Vec<String>>,
}

impl Probe {
	fn new(id: &'static str) -> Self {
		Self {
			id,
			ignored: QueryKind::empty(),
			results: Vec::new(),
			syntax: None,
			gate: None,
			searches: AtomicUsize::new(0),
			prepared: AtomicUsize::new(0),
			torn_down: AtomicUsize::new(0),
			queries: Mutex::new(Vec::new()),
			runs: Mutex::new(Vec::new()),
		}
	}

	fn yielding(mut self, suffix: &'static str, relevance: f64) -> Self {
		self.results.push((suffix, relevance));
		self
	}

	fn gated(mut self, gate: &Arc<Gate>) -> Self {
		self.gate = Some(Arc::clone(gate));
		self
	}

	fn searches(&self) -> usize {
		self.searches.load(Ordering::SeqCst)
	}

	fn runs(&self) -> Vec<String> {
		self.runs.lock().clone()
	}
}

impl Runner for Probe {
	fn id(&self) -> &str {
		self.id
	}

	fn ignored_kinds(&self) -> QueryKind {
		self.ignored
	}

	fn syntaxes(&self) -> Vec<RunnerSyntax> {
		self.syntax.iter().cloned().collect()
	}

	fn prepare(&self) {
		self.prepared.fetch_add(1, Ordering::SeqCst);
	}

	fn teardown(&self) {
		self.torn_down.fetch_add(1, Ordering::SeqCst);
	}

	fn find_matches(&self, ctx: &MatchContext<'_>) {
		self.queries.lock().push(ctx.query());
		self.searches.fetch_add(1, Ordering::SeqCst);
		if let Some(gate) = &self.gate {
			gate.wait();
		}
		let matches = self
			.results
			.iter()
			.map(|(suffix, relevance)| ctx.new_match().with_id(suffix).with_text(*suffix).with_relevance(*relevance))
			.collect::<Vec<_>>();
		if !matches.is_empty() {
			ctx.add_matches(matches);
		}
	}

	fn run(&self, _session: &QuerySession, m: &Match) {
		self.runs.lock().push(m.id().to_string());
	}

	fn actions_for_match(&self, m: &Match) -> Vec<MatchAction> {
		vec![MatchAction::new("copy", format!("Copy {}", m.text()))]
	}
}

fn fast_store() -> Arc<MemoryStore> {
	let mut group = Table::new();
	group.insert("slow_run_delay_ms".into(), Value::Integer(40));
	group.insert("match_debounce_ms".into(), Value::Integer(10));
	let mut root = Table::new();
	root.insert(MANAGER_GROUP.into(), Value::Table(group));
	Arc::new(MemoryStore::from_table(root))
}

fn manager_for(registry: StaticRegistry, store: &Arc<MemoryStore>) -> RunnerManager {
	let store: Arc<dyn ConfigStore> = store.clone();
	RunnerManager::new(Arc::new(registry), store)
}

fn registry_of(probes: &[&Arc<Probe>]) -> StaticRegistry {
	probes.iter().fold(StaticRegistry::new(), |registry, probe| {
		let runner: RunnerRef = Arc::clone(*probe) as RunnerRef;
		registry.with_runner(runner)
	})
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn launch_fans_out_and_collects() {
	let _ = tracing_subscriber::fmt::try_init();
	let a = Arc::new(Probe::new("a").yielding("one", 0.4));
	let b = Arc::new(Probe::new("b").yielding("two", 0.9));
	let manager = manager_for(registry_of(&[&a, &b]), &fast_store());

	manager.launch_query("zzqx fan out", None);
	wait_until("both matches", || manager.matches().len() == 2).await;
	let ids: Vec<String> = manager.matches().iter().map(|m| m.id().to_string()).collect();
	assert_eq!(ids, ["b_two", "a_one"]);
	wait_until("jobs drained", || manager.search_job_count() == 0).await;
	assert_eq!(manager.query(), "zzqx fan out");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relaunching_same_term_is_noop() {
	let a = Arc::new(Probe::new("a").yielding("x", 0.5));
	let manager = manager_for(registry_of(&[&a]), &fast_store());

	manager.launch_query("zzqx same", None);
	wait_until("first search", || a.searches() == 1).await;
	let generation = manager.session().generation();

	manager.launch_query("  zzqx same ", None);
	sleep(Duration::from_millis(60)).await;
	assert_eq!(a.searches(), 1);
	assert_eq!(manager.session().generation(), generation);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ignored_kinds_apply_outside_single_mode_only() {
	let a = Arc::new(Probe::new("a"));
	let picky = Arc::new(Probe {
		ignored: QueryKind::UNKNOWN,
		..Probe::new("picky")
	});
	let manager = manager_for(registry_of(&[&a, &picky]), &fast_store());

	manager.launch_query("zzqx unknown", None);
	wait_until("a searched", || a.searches() == 1).await;
	wait_until("jobs drained", || manager.search_job_count() == 0).await;
	assert_eq!(picky.searches(), 0);

	manager.launch_query("zzqx unknown again", Some("picky"));
	wait_until("picky searched", || picky.searches() == 1).await;
	assert_eq!(a.searches(), 1);
	assert!(manager.single_mode());
	assert!(manager.session().single_runner_query_mode());

	manager.launch_query("zzqx back to all", None);
	assert!(!manager.single_mode());
	assert!(manager.single_mode_runner().is_none());
	wait_until("a searched again", || a.searches() == 2).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn suspended_runner_is_skipped() {
	let a = Arc::new(Probe::new("a"));
	let b = Arc::new(Probe::new("b"));
	let manager = manager_for(registry_of(&[&a, &b]), &fast_store());

	assert!(manager.runner("b").is_some());
	assert!(manager.set_runner_suspended("b", true));
	assert!(manager.is_runner_suspended("b"));
	assert!(!manager.set_runner_suspended("missing", true));

	manager.launch_query("zzqx suspended", None);
	wait_until("a searched", || a.searches() == 1).await;
	wait_until("jobs drained", || manager.search_job_count() == 0).await;
	assert_eq!(b.searches(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn run_is_deferred_until_runner_job_finishes() {
	let gate = Arc::new(Gate::default());
	let busy = Arc::new(Probe::new("busy").gated(&gate));
	let manager = manager_for(registry_of(&[&busy]), &fast_store());

	manager.launch_query("zzqx defer", None);
	wait_until("search started", || busy.searches() == 1).await;

	let runner = manager.runner("busy").expect("loaded");
	manager.run(&Match::new(&runner).with_id("first"));
	manager.run(&Match::new(&runner).with_id("second"));
	assert!(busy.runs().is_empty());

	gate.open();
	wait_until("deferred run", || !busy.runs().is_empty()).await;
	sleep(Duration::from_millis(40)).await;
	assert_eq!(busy.runs(), ["busy_second"]);
	assert_eq!(manager.launch_counts().count("busy_second"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn disabled_match_never_runs() {
	let a = Arc::new(Probe::new("a"));
	let manager = manager_for(registry_of(&[&a]), &fast_store());
	let runner = manager.runner("a").expect("loaded");

	let mut m = Match::new(&runner).with_id("off");
	m.set_enabled(false);
	manager.run(&m);
	manager.run(&Match::detached());
	assert!(a.runs().is_empty());

	manager.run(&Match::new(&runner).with_id("on"));
	assert_eq!(a.runs(), ["a_on"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_runs_deferred_match_and_retires_jobs() {
	let gate = Arc::new(Gate::default());
	let busy = Arc::new(Probe::new("busy").gated(&gate).yielding("late", 0.5));
	let manager = manager_for(registry_of(&[&busy]), &fast_store());

	manager.launch_query("zzqx reset", None);
	wait_until("search started", || busy.searches() == 1).await;
	let session = manager.session();
	let runner = manager.runner("busy").expect("loaded");
	manager.run(&Match::new(&runner).with_id("pending"));

	manager.reset();
	assert_eq!(busy.runs(), ["busy_pending"]);
	assert!(!session.is_valid());
	assert_eq!(manager.search_job_count(), 0);
	assert_eq!(manager.old_job_count(), 1);
	assert_eq!(manager.query(), "");

	gate.open();
	wait_until("old job finished", || manager.old_job_count() == 0).await;
	assert!(session.is_empty());
	assert!(manager.matches().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn teardown_waits_for_outstanding_jobs() {
	let gate = Arc::new(Gate::default());
	let busy = Arc::new(Probe::new("busy").gated(&gate));
	let manager = manager_for(registry_of(&[&busy]), &fast_store());
	let mut events = manager.subscribe();

	manager.setup_match_session();
	manager.setup_match_session();
	assert_eq!(busy.prepared.load(Ordering::SeqCst), 1);

	manager.launch_query("zzqx teardown", None);
	wait_until("search started", || busy.searches() == 1).await;
	manager.match_session_complete();
	sleep(Duration::from_millis(20)).await;
	assert_eq!(busy.torn_down.load(Ordering::SeqCst), 0);

	gate.open();
	next_event(&mut events, |event| matches!(event, ManagerEvent::QueryFinished)).await;
	assert_eq!(busy.torn_down.load(Ordering::SeqCst), 1);

	manager.setup_match_session();
	assert_eq!(busy.prepared.load(Ordering::SeqCst), 2);
	manager.match_session_complete();
	assert_eq!(busy.torn_down.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_single_mode_query_uses_default_syntax() {
	let dict = Arc::new(Probe {
		syntax: Some(RunnerSyntax::new("define :q:", "Looks up a word")),
		..Probe::new("dict")
	});
	let manager = manager_for(registry_of(&[&dict]), &fast_store());

	manager.launch_query("", Some("dict"));
	assert_eq!(manager.query(), "define");
	wait_until("seeded search", || dict.searches() == 1).await;
	assert_eq!(*dict.queries.lock(), ["define"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_query_resets_session() {
	let a = Arc::new(Probe::new("a").yielding("x", 0.5));
	let manager = manager_for(registry_of(&[&a]), &fast_store());

	manager.launch_query("zzqx something", None);
	wait_until("match", || !manager.matches().is_empty()).await;
	let session = manager.session();

	manager.launch_query("   ", None);
	assert!(!session.is_valid());
	assert_eq!(manager.query(), "");
	assert!(manager.matches().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_single_runner_resets() {
	let a = Arc::new(Probe::new("a"));
	let manager = manager_for(registry_of(&[&a]), &fast_store());

	manager.launch_query("zzqx lonely", Some("nobody"));
	assert!(!manager.single_mode());
	assert_eq!(manager.query(), "");
	sleep(Duration::from_millis(20)).await;
	assert_eq!(a.searches(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_single_runner_resets_even_for_current_term() {
	let a = Arc::new(Probe::new("a").yielding("hit", 0.5));
	let manager = manager_for(registry_of(&[&a]), &fast_store());

	manager.launch_query("zzqx same", None);
	wait_until("all-runner result", || manager.matches().len() == 1).await;

	manager.launch_query("zzqx same", Some("nobody"));
	assert_eq!(manager.query(), "");
	assert!(manager.matches().is_empty());
	assert_eq!(a.searches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exec_query_searches_synchronously() {
	let a = Arc::new(Probe::new("a").yielding("now", 0.5));
	let picky = Arc::new(Probe {
		ignored: QueryKind::UNKNOWN,
		..Probe::new("picky")
	});
	let manager = manager_for(registry_of(&[&a, &picky]), &fast_store());

	assert!(manager.exec_query("zzqx sync", "a"));
	assert_eq!(manager.matches().len(), 1);
	assert!(!manager.exec_query("zzqx sync", "a"));
	assert!(!manager.exec_query("zzqx other", "missing"));
	assert!(!manager.exec_query("zzqx third", "picky"));
	assert_eq!(picky.searches(), 0);
	assert!(!manager.exec_query("  ", "a"));
	assert_eq!(a.searches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn launch_counts_persist_and_boost() {
	let store = fast_store();
	let a = Arc::new(Probe::new("a").yielding("hit", 0.5));
	{
		let manager = manager_for(registry_of(&[&a]), &store);
		manager.launch_query("zzqx learn", None);
		wait_until("match", || manager.session().match_by_id("a_hit").is_some()).await;
		wait_until("jobs drained", || manager.search_job_count() == 0).await;
		assert!(manager.run_id("a_hit"));
		assert!(!manager.run_id("a_missing"));
		assert_eq!(a.runs(), ["a_hit"]);
	}
	assert_eq!(store.read_list(MANAGER_GROUP, learning::LAUNCH_COUNTS_KEY), ["1 a_hit"]);

	let manager = manager_for(registry_of(&[&a]), &store);
	assert_eq!(manager.launch_counts().count("a_hit"), 1);
	manager.launch_query("zzqx learn", None);
	wait_until("boosted match", || manager.session().match_by_id("a_hit").is_some()).await;
	let relevance = manager.session().match_by_id("a_hit").expect("match").relevance();
	assert!((relevance - (0.5 + learning::bulk_boost(1))).abs() < 1e-9);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loading_honours_selection_rules() {
	let _ = tracing_subscriber::fmt::try_init();
	let store = fast_store();
	store
		.write_entry(MANAGER_GROUP, "plugins", Value::Table(Table::from_iter([("optin".to_string(), Value::Boolean(true))])))
		.expect("write");

	let probe = |id: &'static str| -> RunnerRef { Arc::new(Probe::new(id)) };
	let registry = StaticRegistry::new()
		.with_runner(probe("plain"))
		.with_factory(
			RunnerOffer {
				enabled_by_default: false,
				..RunnerOffer::new("optin")
			},
			move || Ok(probe("optin")),
		)
		.with_factory(
			RunnerOffer {
				enabled_by_default: false,
				..RunnerOffer::new("off")
			},
			move || Ok(probe("off")),
		)
		.with_factory(
			RunnerOffer {
				try_exec: Some("zzqx-definitely-not-installed".into()),
				..RunnerOffer::new("needs_exe")
			},
			move || Ok(probe("needs_exe")),
		)
		.with_factory(RunnerOffer::new("broken"), || {
			Err(RunnerLoadError::Instantiation {
				id: "broken".into(),
				reason: "boom".into(),
			})
		})
		.with_factory(
			RunnerOffer {
				name: "Dictionary".into(),
				advertises_single_runner: true,
				..RunnerOffer::new("dict")
			},
			move || Ok(probe("dict")),
		);
	let manager = manager_for(registry, &store);

	let mut ids: Vec<String> = manager.runners().iter().map(|r| r.id().to_string()).collect();
	ids.sort();
	assert_eq!(ids, ["dict", "optin", "plain"]);
	assert_eq!(manager.single_mode_advertised_runner_ids(), ["dict"]);
	assert_eq!(manager.runner_name("dict").as_deref(), Some("dict"));
	assert_eq!(manager.runner_name("off").as_deref(), Some("off"));
	assert_eq!(manager.runner_name("nope"), None);

	manager.set_allowed_runners(&["plain".to_string()]);
	assert_eq!(manager.allowed_runners(), ["plain"]);
	assert_eq!(store.read_list(MANAGER_GROUP, "allowed_runners"), ["plain"]);
	let ids: Vec<String> = manager.runners().iter().map(|r| r.id().to_string()).collect();
	assert_eq!(ids, ["plain"]);

	store.write_list(MANAGER_GROUP, "allowed_runners", &[]).expect("write");
	manager.reload_configuration();
	assert_eq!(manager.runners().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn matches_changed_is_published_after_debounce() {
	let a = Arc::new(Probe::new("a").yielding("pub", 0.5));
	let manager = manager_for(registry_of(&[&a]), &fast_store());
	let mut events = manager.subscribe();

	manager.launch_query("zzqx publish", None);
	let event = next_event(&mut events, |event| matches!(event, ManagerEvent::MatchesChanged(list) if !list.is_empty())).await;
	let ManagerEvent::MatchesChanged(list) = event else {
		unreachable!()
	};
	assert_eq!(list[0].id(), "a_pub");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fruitless_query_publishes_empty_list() {
	let quiet = Arc::new(Probe::new("quiet"));
	let manager = manager_for(registry_of(&[&quiet]), &fast_store());
	let mut events = manager.subscribe();

	manager.launch_query("zzqx nothing", None);
	next_event(&mut events, |event| matches!(event, ManagerEvent::MatchesChanged(list) if list.is_empty())).await;
	assert_eq!(quiet.searches(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn actions_come_from_the_owning_runner() {
	let a = Arc::new(Probe::new("a"));
	let manager = manager_for(registry_of(&[&a]), &fast_store());
	let runner = manager.runner("a").expect("loaded");

	let actions = manager.actions_for_match(&Match::new(&runner).with_text("hello"));
	assert_eq!(actions, [MatchAction::new("copy", "Copy hello")]);
	assert!(manager.actions_for_match(&Match::detached()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_manager_with_running_job_does_not_block() {
	let gate = Arc::new(Gate::default());
	let busy = Arc::new(Probe::new("busy").gated(&gate));
	let manager = manager_for(registry_of(&[&busy]), &fast_store());
	let pool = manager.pool().clone();

	manager.launch_query("zzqx drop", None);
	wait_until("search started", || busy.searches() == 1).await;
	drop(manager);
	assert!(!pool.is_idle());

	gate.open();
	timeout(Duration::from_secs(3), pool.wait_idle()).await.expect("pool drains");
}
