pub mod bootstrap;
pub mod engine;
pub mod executor;
pub mod filter;
pub mod hasher;
pub mod path_mapper;
pub mod planner;
pub mod remote_index;
pub mod report;
pub mod scanner;

pub use bootstrap::ContainerBootstrap;
pub use engine::{RunOptions, SyncEngine, SyncReport};
pub use executor::{ActionKind, ActionOutcome, ExecMode, Executor, HeaderSet};
pub use filter::FilterSet;
pub use hasher::{ContentHasher, Md5Hasher};
pub use path_mapper::{base_path_from_url, PathMapper};
pub use planner::{PlanOptions, SkipReason, SyncDecision, SyncPlanner};
pub use remote_index::RemoteIndex;
pub use report::{Reporter, RunCounters};
pub use scanner::{LocalFile, LocalScanner};
