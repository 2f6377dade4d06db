//! 探针执行器实现
//!
//! 在超时限制下执行单个探针，并把所有结果（包括错误和panic）归类为 [`ProbeResult`]

use crate::error::ProbeError;
use crate::probe::registry::ActiveProbe;
use crate::probe::result::{ProbeOutcome, ProbeResult};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info};

/// 探针执行器
///
/// 超时后处理器的 future 会被直接丢弃，不会再有机会报告结果；
/// 处理器启动的外部命令连同其进程组随之终止。
#[derive(Debug, Clone, Default)]
pub struct ProbeExecutor;

impl ProbeExecutor {
    /// 创建探针执行器
    pub fn new() -> Self {
        Self
    }

    /// 执行一次探针
    ///
    /// # 参数
    /// * `probe` - 已解析的探针
    /// * `cycle` - 当前周期编号
    ///
    /// # 返回
    /// * `ProbeResult` - 执行结果，本方法不会返回错误
    pub async fn execute(&self, probe: &ActiveProbe, cycle: u64) -> ProbeResult {
        let spec = &probe.spec;
        debug!("开始执行探针 {}({})，周期 {}", spec.name, spec.argument, cycle);

        let started_at = Utc::now();
        let start = Instant::now();

        let run = AssertUnwindSafe(probe.handler.run(&spec.argument)).catch_unwind();
        let mut attempt = Box::pin(timeout(spec.timeout, run));
        let completed = (&mut attempt).await;

        // 耗时在丢弃处理器状态之前确定，析构开销不计入
        let duration = start.elapsed();
        drop(attempt);

        let outcome = match completed {
            Ok(Ok(Ok(()))) => ProbeOutcome::Success,
            Ok(Ok(Err(e))) => ProbeOutcome::Failure(e.to_string()),
            Ok(Err(panic)) => {
                ProbeOutcome::Failure(ProbeError::Panicked(panic_message(panic.as_ref())).to_string())
            }
            Err(_) => ProbeOutcome::Timeout,
        };

        match &outcome {
            ProbeOutcome::Success => info!("探针 {} 通过", spec.name),
            ProbeOutcome::Failure(detail) => error!("探针 {} 执行失败: {}", spec.name, detail),
            ProbeOutcome::Timeout => error!(
                "探针 {} 在 {} 秒后超时",
                spec.name,
                spec.timeout.as_secs_f64()
            ),
        }
        info!("探针 {} 耗时 {:.2} 秒", spec.name, duration.as_secs_f64());

        ProbeResult::new(spec, cycle, started_at, duration, outcome)
    }
}

/// 提取panic信息
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::handlers::{FailingProbe, ProbeHandler, SlowProbe};
    use crate::probe::result::ProbeSpec;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct PanickingProbe;

    #[async_trait]
    impl ProbeHandler for PanickingProbe {
        async fn run(&self, _argument: &str) -> Result<(), ProbeError> {
            panic!("handler exploded");
        }
    }

    /// 析构时阻塞当前线程的值
    struct SlowTeardown;

    impl Drop for SlowTeardown {
        fn drop(&mut self) {
            std::thread::sleep(Duration::from_millis(300));
        }
    }

    /// 持有析构缓慢的状态并一直挂起
    struct StuckWithState;

    #[async_trait]
    impl ProbeHandler for StuckWithState {
        async fn run(&self, _argument: &str) -> Result<(), ProbeError> {
            let _state = SlowTeardown;
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn active(name: &str, timeout: Duration, handler: Arc<dyn ProbeHandler>) -> ActiveProbe {
        ActiveProbe::new(ProbeSpec::new(name, "arg", timeout), handler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_within_timeout() {
        let probe = active(
            "probe_fast",
            Duration::from_secs(5),
            Arc::new(SlowProbe::new(Duration::from_secs(1))),
        );

        let result = ProbeExecutor::new().execute(&probe, 1).await;
        assert_eq!(result.outcome, ProbeOutcome::Success);
        assert!(result.duration >= Duration::from_secs(1));
        assert!(result.duration <= Duration::from_secs(5));
        assert_eq!(result.argument, "arg");
        assert_eq!(result.cycle, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let probe = active(
            "probe_slow",
            Duration::from_secs(5),
            Arc::new(SlowProbe::new(Duration::from_secs(20))),
        );

        let result = ProbeExecutor::new().execute(&probe, 1).await;
        assert_eq!(result.outcome, ProbeOutcome::Timeout);
        assert!(result.duration >= Duration::from_secs(5));
        assert!(result.duration < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_carries_message() {
        let probe = active(
            "probe_exception",
            Duration::from_secs(10),
            Arc::new(FailingProbe::new("registry unreachable")),
        );

        let result = ProbeExecutor::new().execute(&probe, 1).await;
        match &result.outcome {
            ProbeOutcome::Failure(detail) => assert!(detail.contains("registry unreachable")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(result.duration < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let probe = active("probe_panic", Duration::from_secs(10), Arc::new(PanickingProbe));

        let result = ProbeExecutor::new().execute(&probe, 1).await;
        match &result.outcome {
            ProbeOutcome::Failure(detail) => assert!(detail.contains("handler exploded")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_panic_message_fallback() {
        let payload: Box<dyn Any + Send> = Box::new(42_u32);
        assert_eq!(panic_message(payload.as_ref()), "未知panic");
    }

    #[tokio::test]
    async fn test_timeout_duration_excludes_teardown() {
        let stuck = active(
            "stuck_handler",
            Duration::from_millis(100),
            Arc::new(StuckWithState),
        );

        let wall = std::time::Instant::now();
        let result = ProbeExecutor::new().execute(&stuck, 1).await;

        assert_eq!(result.outcome, ProbeOutcome::Timeout);
        assert!(
            result.duration < Duration::from_millis(250),
            "记录的耗时 {:?} 包含了析构时间",
            result.duration
        );
        // 析构确实发生在 execute 返回之前
        assert!(wall.elapsed() >= Duration::from_millis(400));
    }
}
