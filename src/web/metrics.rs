//! Prometheus指标模块
//!
//! 把探针执行结果写入三个带标签的计量器，并导出Prometheus文本格式

use crate::probe::ProbeResult;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// 最近一次开始时间指标名称
pub const METRIC_LAST_START: &str = "progexp_probe_last_start";
/// 成功状态指标名称
pub const METRIC_SUCCESS: &str = "progexp_probe_success";
/// 执行耗时指标名称
pub const METRIC_DURATION: &str = "progexp_probe_duration";

/// 指标标签：探针名称和参数
const LABELS: [&str; 2] = ["name", "args"];

type ProbeKey = (String, String);

/// 单个探针当前的三项指标值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeGauges {
    /// 最近一次开始时间（unix时间戳，秒）
    pub last_start: f64,
    /// 成功状态（1=通过，0=失败）
    pub success: f64,
    /// 执行耗时（秒）
    pub duration_seconds: f64,
}

/// 指标接收器
///
/// 同一探针的三项指标在写锁内一起更新，采集在读锁内进行，
/// 因此抓取时不会看到来自不同执行的指标组合。
pub struct MetricsSink {
    /// 注册表
    registry: Registry,
    /// 最近一次开始时间
    last_start: GaugeVec,
    /// 成功状态
    success: GaugeVec,
    /// 执行耗时
    duration: GaugeVec,
    /// 每个探针最近一次写入的周期编号
    cycles: RwLock<HashMap<ProbeKey, u64>>,
}

impl MetricsSink {
    /// 创建新的指标接收器
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let last_start = GaugeVec::new(
            Opts::new(
                METRIC_LAST_START,
                "When was the probe last started, as unix timestamp",
            ),
            &LABELS,
        )?;

        let success = GaugeVec::new(
            Opts::new(
                METRIC_SUCCESS,
                "Was the last probe execution successful? 1 for pass, 0 for fail or timeout",
            ),
            &LABELS,
        )?;

        let duration = GaugeVec::new(
            Opts::new(
                METRIC_DURATION,
                "How long the last probe execution took in seconds",
            ),
            &LABELS,
        )?;

        registry.register(Box::new(last_start.clone()))?;
        registry.register(Box::new(success.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            last_start,
            success,
            duration,
            cycles: RwLock::new(HashMap::new()),
        })
    }

    /// 记录一次探针执行结果
    ///
    /// 结果所属周期早于该探针已记录的周期时直接丢弃。
    ///
    /// # 返回
    /// * `bool` - 是否写入了指标
    pub fn record(&self, result: &ProbeResult) -> bool {
        let key = (result.name.clone(), result.argument.clone());
        let labels = [result.name.as_str(), result.argument.as_str()];

        let mut cycles = self.cycles.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(&latest) = cycles.get(&key) {
            if result.cycle < latest {
                debug!(
                    "丢弃过期结果: {} 周期 {} < {}",
                    result.name, result.cycle, latest
                );
                return false;
            }
        }

        self.last_start
            .with_label_values(&labels)
            .set(result.started_at_unix());
        self.success
            .with_label_values(&labels)
            .set(result.outcome.success_value());
        self.duration
            .with_label_values(&labels)
            .set(result.duration_seconds());
        cycles.insert(key, result.cycle);

        true
    }

    /// 读取某个探针当前的指标值
    pub fn gauges(&self, name: &str, args: &str) -> Option<ProbeGauges> {
        let cycles = self.cycles.read().unwrap_or_else(PoisonError::into_inner);
        if !cycles.contains_key(&(name.to_string(), args.to_string())) {
            return None;
        }

        let labels = [name, args];
        Some(ProbeGauges {
            last_start: self.last_start.with_label_values(&labels).get(),
            success: self.success.with_label_values(&labels).get(),
            duration_seconds: self.duration.with_label_values(&labels).get(),
        })
    }

    /// 已记录结果的探针数量
    pub fn tracked_probes(&self) -> usize {
        self.cycles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 获取Prometheus格式的指标
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let metric_families = {
            let _cycles = self.cycles.read().unwrap_or_else(PoisonError::into_inner);
            self.registry.gather()
        };

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeOutcome, ProbeSpec};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Duration;

    fn result(name: &str, cycle: u64, duration_ms: u64, outcome: ProbeOutcome) -> ProbeResult {
        let spec = ProbeSpec::new(name, "quay.io/prometheus/busybox", Duration::from_secs(60));
        ProbeResult::new(&spec, cycle, Utc::now(), Duration::from_millis(duration_ms), outcome)
    }

    #[test]
    fn test_metrics_sink_creation() {
        assert!(MetricsSink::new().is_ok());
    }

    #[test]
    fn test_record_success() {
        let sink = MetricsSink::new().unwrap();
        let r = result("probe_quay", 1, 1500, ProbeOutcome::Success);
        assert!(sink.record(&r));

        let gauges = sink.gauges("probe_quay", "quay.io/prometheus/busybox").unwrap();
        assert_eq!(gauges.success, 1.0);
        assert_eq!(gauges.duration_seconds, 1.5);
        assert_eq!(gauges.last_start, r.started_at_unix());
    }

    #[test]
    fn test_failure_and_timeout_are_failing() {
        let sink = MetricsSink::new().unwrap();
        sink.record(&result("probe_a", 1, 10, ProbeOutcome::Failure("x".to_string())));
        sink.record(&result("probe_b", 1, 5000, ProbeOutcome::Timeout));

        let args = "quay.io/prometheus/busybox";
        assert_eq!(sink.gauges("probe_a", args).unwrap().success, 0.0);
        assert_eq!(sink.gauges("probe_b", args).unwrap().success, 0.0);
        assert_eq!(sink.tracked_probes(), 2);
    }

    #[test]
    fn test_stale_cycle_is_discarded() {
        let sink = MetricsSink::new().unwrap();
        assert!(sink.record(&result("probe_quay", 5, 100, ProbeOutcome::Timeout)));
        assert!(!sink.record(&result("probe_quay", 4, 200, ProbeOutcome::Success)));

        let gauges = sink.gauges("probe_quay", "quay.io/prometheus/busybox").unwrap();
        assert_eq!(gauges.success, 0.0);
        assert_eq!(gauges.duration_seconds, 0.1);
    }

    #[test]
    fn test_unknown_probe_has_no_gauges() {
        let sink = MetricsSink::new().unwrap();
        assert!(sink.gauges("probe_missing", "").is_none());
        assert_eq!(sink.tracked_probes(), 0);
    }

    #[test]
    fn test_gather_metrics() {
        let sink = MetricsSink::new().unwrap();
        sink.record(&result("probe_quay", 1, 250, ProbeOutcome::Success));

        let metrics = sink.gather_metrics().unwrap();
        assert!(metrics.contains(METRIC_LAST_START));
        assert!(metrics.contains(METRIC_SUCCESS));
        assert!(metrics.contains(METRIC_DURATION));
        assert!(metrics.contains(r#"name="probe_quay""#));
        assert!(metrics.contains(r#"args="quay.io/prometheus/busybox""#));
    }

    #[test]
    fn test_concurrent_records_keep_triples() {
        let sink = Arc::new(MetricsSink::new().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for cycle in 1..=50 {
                        let name = format!("probe_{i}");
                        let outcome = if cycle % 2 == 0 {
                            ProbeOutcome::Success
                        } else {
                            ProbeOutcome::Timeout
                        };
                        sink.record(&result(&name, cycle, cycle * 10, outcome));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for i in 0..8 {
            let gauges = sink
                .gauges(&format!("probe_{i}"), "quay.io/prometheus/busybox")
                .unwrap();
            assert_eq!(gauges.success, 1.0);
            assert_eq!(gauges.duration_seconds, 0.5);
        }
    }

    /// 解析文本格式中某个指标的值，按 name 标签分组
    fn scraped_values(text: &str, metric: &str) -> std::collections::HashMap<String, f64> {
        let prefix = format!("{metric}{{");
        text.lines()
            .filter(|line| line.starts_with(&prefix))
            .filter_map(|line| {
                let (labels, value) = line.rsplit_once(' ')?;
                let start = labels.find("name=\"")? + "name=\"".len();
                let end = start + labels[start..].find('"')?;
                Some((labels[start..end].to_string(), value.parse().ok()?))
            })
            .collect()
    }

    #[test]
    fn test_scrapes_never_mix_cycles() {
        let sink = Arc::new(MetricsSink::new().unwrap());
        let writing = Arc::new(std::sync::atomic::AtomicBool::new(true));

        // 偶数周期成功，耗时为周期号的十毫秒倍数，由耗时即可还原周期号
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    let name = format!("worker_{i}");
                    for cycle in 1..=400 {
                        let outcome = if cycle % 2 == 0 {
                            ProbeOutcome::Success
                        } else {
                            ProbeOutcome::Failure("exit status: 1".to_string())
                        };
                        sink.record(&result(&name, cycle, cycle * 10, outcome));
                    }
                })
            })
            .collect();

        let reader = {
            let sink = Arc::clone(&sink);
            let writing = Arc::clone(&writing);
            std::thread::spawn(move || {
                let mut scrapes = 0;
                while writing.load(std::sync::atomic::Ordering::Relaxed) || scrapes == 0 {
                    let text = sink.gather_metrics().unwrap();
                    let success = scraped_values(&text, METRIC_SUCCESS);
                    let duration = scraped_values(&text, METRIC_DURATION);
                    assert_eq!(success.len(), duration.len());

                    for (name, passed) in &success {
                        let cycle = (duration[name] * 100.0).round() as u64;
                        assert_eq!(
                            *passed == 1.0,
                            cycle % 2 == 0,
                            "{name}: 成功值 {passed} 与周期 {cycle} 的耗时不属于同一结果"
                        );
                    }
                    scrapes += 1;
                }
                scrapes
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        writing.store(false, std::sync::atomic::Ordering::Relaxed);
        assert!(reader.join().unwrap() > 0);
    }
}
