//! 探针模块
//!
//! 提供探针注册、带超时的执行和周期调度功能

pub mod executor;
pub mod handlers;
pub mod registry;
pub mod result;
pub mod scheduler;
pub mod scratch;

// 重新导出主要类型
pub use executor::ProbeExecutor;
pub use handlers::{FailingProbe, ImagePullProbe, ProbeHandler, RepoCloneProbe, SlowProbe};
pub use registry::{prepare_probes, ActiveProbe, ProbeRegistry, Resolution};
pub use result::{ProbeOutcome, ProbeResult, ProbeSpec};
pub use scheduler::{pacing_delay, IterationScheduler, SchedulerStatus};
pub use scratch::ScratchSpace;
