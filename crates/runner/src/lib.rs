//! Query dispatch engine for quarry.
//!
//! A user types a query; every loaded [`Runner`] gets a chance to produce
//! [`Match`]es for it concurrently, and the results are merged into one
//! ranked list that updates while runners are still working.
//!
//! # Pieces
//!
//! - [`RunnerManager`]: owns runners and the current [`QuerySession`],
//!   fans queries out as [`FindMatchesJob`]s and publishes [`ManagerEvent`]s.
//! - [`QuerySession`]: shared, resettable holder of the query term, its
//!   [`QueryKind`] and the match list. Resetting invalidates every clone
//!   that still points at the old instance.
//! - [`AdmissionController`]: per-runner rate cap for normal runners and a
//!   shared start delay for slow ones.
//! - [`RunnerRegistry`]: discovers and instantiates runners.
//! - [`LaunchCounts`]: remembers which matches were run and boosts them.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use quarry_config::MemoryStore;
//! use quarry_runner::{MatchContext, Runner, RunnerManager, StaticRegistry};
//!
//! struct Echo;
//!
//! impl Runner for Echo {
//! 	fn id(&self) -> &str {
//! 		"echo"
//! 	}
//!
//! 	fn find_matches(&self, ctx: &MatchContext<'_>) {
//! 		let query = ctx.query();
//! 		ctx.add_match(ctx.new_match().with_id(&query).with_text(query.clone()));
//! 	}
//! }
//!
//! let registry = StaticRegistry::new().with_runner(Arc::new(Echo));
//! let manager = RunnerManager::new(Arc::new(registry), Arc::new(MemoryStore::new()));
//! let mut events = manager.subscribe();
//! manager.launch_query("hello", None);
//! # drop(events.try_recv());
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod kind;
pub mod learning;
mod manager;
pub mod query_match;
pub mod registry;
pub mod runner;
pub mod session;

pub use config::{MANAGER_GROUP, ManagerConfig};
pub use error::RunnerLoadError;
pub use jobs::{AdmissionController, DelayPolicy, FindMatchesJob, RateCapPolicy};
pub use kind::{Classification, QueryKind, classify, correct_path_case};
pub use learning::LaunchCounts;
pub use manager::{ManagerEvent, RunnerManager};
pub use query_match::{Match, MatchAction, MatchType, compare_rank, sort_matches};
pub use registry::{RunnerOffer, RunnerRegistry, StaticRegistry};
pub use runner::{QUERY_PLACEHOLDER, Runner, RunnerPriority, RunnerRef, RunnerSpeed, RunnerSyntax, same_runner};
pub use session::{MatchContext, QuerySession};
