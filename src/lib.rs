//! Probe Exporter - 可编程的可用性探测器
//!
//! 周期性并发执行一组互相独立的探针，对每个探针强制超时，
//! 并将最近一次的开始时间、成功状态和耗时导出为 Prometheus 指标：
//! - 显式的探针注册表和内置探针
//! - 带超时和异常捕获的探针执行
//! - 固定节奏的周期调度
//! - Prometheus 拉取端点
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod shutdown;
pub mod web;

// 重新导出主要类型
pub use config::{Config, GlobalConfig, ProbeConfig};
pub use error::ProbeExporterError;
pub use probe::{ProbeOutcome, ProbeResult, ProbeSpec};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
