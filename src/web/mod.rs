//! 指标导出模块
//!
//! 提供指标接收器和Prometheus拉取端点

pub mod metrics;
pub mod server;

// 重新导出主要类型
pub use metrics::{MetricsSink, ProbeGauges};
pub use server::MetricsServer;
