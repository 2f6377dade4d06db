//! 周期调度器模块
//!
//! 每个周期并发执行全部探针，等待所有结果后按固定周期节奏进入下一轮

use crate::probe::executor::ProbeExecutor;
use crate::probe::registry::ActiveProbe;
use crate::probe::result::{ProbeOutcome, ProbeResult};
use crate::web::MetricsSink;
use chrono::Utc;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// 计算距离下一周期开始还需等待的时间
///
/// 下一周期应在本周期开始后 `interval` 时刻开始；超时则立即开始。
pub fn pacing_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// 调度器状态
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    /// 已完成的周期数
    pub cycles_completed: u64,
    /// 最近一个周期的耗时
    pub last_cycle_duration: Option<Duration>,
    /// 最近一个周期中失败或超时的探针数
    pub last_cycle_failures: usize,
    /// 活动探针数量
    pub active_probes: usize,
}

/// 周期调度器
pub struct IterationScheduler {
    /// 活动探针
    probes: Vec<ActiveProbe>,
    /// 探针执行器
    executor: ProbeExecutor,
    /// 指标接收器
    sink: Arc<MetricsSink>,
    /// 探测周期
    interval: Duration,
    /// 调度器状态
    status: RwLock<SchedulerStatus>,
}

impl IterationScheduler {
    /// 创建新的周期调度器
    ///
    /// # 参数
    /// * `probes` - 活动探针列表
    /// * `sink` - 指标接收器
    /// * `interval` - 探测周期
    pub fn new(probes: Vec<ActiveProbe>, sink: Arc<MetricsSink>, interval: Duration) -> Self {
        let status = SchedulerStatus {
            active_probes: probes.len(),
            ..Default::default()
        };

        Self {
            probes,
            executor: ProbeExecutor::new(),
            sink,
            interval,
            status: RwLock::new(status),
        }
    }

    /// 活动探针列表
    pub fn probes(&self) -> &[ActiveProbe] {
        &self.probes
    }

    /// 获取调度器状态
    pub fn status(&self) -> SchedulerStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 执行一个周期
    ///
    /// 所有探针同时启动，每个探针在各自的任务中执行并在完成时立即写入指标。
    /// 返回时每个探针恰好产生一个结果，顺序与探针列表一致。
    pub async fn run_cycle(&self, cycle: u64) -> Vec<ProbeResult> {
        let handles: Vec<_> = self
            .probes
            .iter()
            .cloned()
            .map(|probe| {
                let executor = self.executor.clone();
                let sink = Arc::clone(&self.sink);
                tokio::spawn(async move {
                    let result = executor.execute(&probe, cycle).await;
                    sink.record(&result);
                    result
                })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        let mut results = Vec::with_capacity(joined.len());
        for (probe, joined) in self.probes.iter().zip(joined) {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("探针 {} 的执行任务异常结束: {}", probe.spec.name, e);
                    let result = ProbeResult::new(
                        &probe.spec,
                        cycle,
                        Utc::now(),
                        Duration::ZERO,
                        ProbeOutcome::Failure(format!("执行任务异常结束: {e}")),
                    );
                    self.sink.record(&result);
                    result
                }
            };
            results.push(result);
        }

        results
    }

    /// 运行探测循环，直到收到关闭信号
    ///
    /// 关闭信号在周期执行中和周期间等待时都会被响应。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "开始探测循环，探针数量: {}，周期: {} 秒",
            self.probes.len(),
            self.interval.as_secs_f64()
        );

        let mut cycle: u64 = 0;
        loop {
            cycle += 1;
            let start = Instant::now();

            let results = tokio::select! {
                results = self.run_cycle(cycle) => results,
                _ = shutdown_rx.recv() => {
                    info!("探测循环在周期 {} 中被中断", cycle);
                    return;
                }
            };

            let elapsed = start.elapsed();
            self.update_status(&results, elapsed);

            let wait_time = pacing_delay(self.interval, elapsed);
            if wait_time.is_zero() {
                warn!(
                    "周期 {} 耗时 {:.2} 秒，超过探测周期，立即开始下一周期",
                    cycle,
                    elapsed.as_secs_f64()
                );
            }
            debug!("等待 {:.2} 秒后开始下一周期", wait_time.as_secs_f64());

            tokio::select! {
                _ = tokio::time::sleep(wait_time) => {}
                _ = shutdown_rx.recv() => {
                    info!("探测循环已停止");
                    return;
                }
            }
        }
    }

    /// 更新调度器状态
    fn update_status(&self, results: &[ProbeResult], elapsed: Duration) {
        let failures = results.iter().filter(|r| !r.is_success()).count();
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        status.cycles_completed += 1;
        status.last_cycle_duration = Some(elapsed);
        status.last_cycle_failures = failures;
    }
}
