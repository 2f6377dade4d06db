//! 探针数据结构
//!
//! 定义探针声明、执行结果和结果状态枚举

use crate::config::ProbeConfig;
use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// 探针声明，启动时由配置生成，进程生命周期内不变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    /// 探针名称，对应注册表中的处理器
    pub name: String,
    /// 传给处理器的参数
    pub argument: String,
    /// 单次执行的超时时间
    pub timeout: Duration,
}

impl ProbeSpec {
    /// 创建新的探针声明
    pub fn new(name: impl Into<String>, argument: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            argument: argument.into(),
            timeout,
        }
    }
}

impl TryFrom<&ProbeConfig> for ProbeSpec {
    type Error = ConfigError;

    fn try_from(config: &ProbeConfig) -> Result<Self, Self::Error> {
        let section = config.settings()?;
        let timeout = section.timeout();
        Ok(Self::new(config.name.clone(), section.args, timeout))
    }
}

/// 探针执行结果状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum ProbeOutcome {
    /// 在超时前成功完成
    Success,
    /// 在超时前返回错误，携带错误详情
    Failure(String),
    /// 超时，执行被放弃
    Timeout,
}

impl std::fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeOutcome::Success => write!(f, "通过"),
            ProbeOutcome::Failure(_) => write!(f, "失败"),
            ProbeOutcome::Timeout => write!(f, "超时"),
        }
    }
}

impl ProbeOutcome {
    /// 判断是否成功
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }

    /// 成功指标的取值：1 表示通过，0 表示失败或超时
    pub fn success_value(&self) -> f64 {
        if self.is_success() {
            1.0
        } else {
            0.0
        }
    }

    /// 失败详情（如果有）
    pub fn detail(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Failure(detail) => Some(detail),
            _ => None,
        }
    }
}

/// 单次探针执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    /// 执行ID，用于日志关联
    pub id: Uuid,
    /// 所属周期编号
    pub cycle: u64,
    /// 探针名称
    pub name: String,
    /// 探针参数
    pub argument: String,
    /// 开始时间
    pub started_at: DateTime<Utc>,
    /// 执行耗时
    #[serde(rename = "duration_ms", with = "duration_serde")]
    pub duration: Duration,
    /// 执行结果
    pub outcome: ProbeOutcome,
}

impl ProbeResult {
    /// 创建新的执行结果
    pub fn new(
        spec: &ProbeSpec,
        cycle: u64,
        started_at: DateTime<Utc>,
        duration: Duration,
        outcome: ProbeOutcome,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cycle,
            name: spec.name.clone(),
            argument: spec.argument.clone(),
            started_at,
            duration,
            outcome,
        }
    }

    /// 判断是否成功
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// 耗时（秒）
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// 开始时间的unix时间戳（秒，含小数部分）
    pub fn started_at_unix(&self) -> f64 {
        self.started_at.timestamp_micros() as f64 / 1_000_000.0
    }

    /// 转换为JSON字符串
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Duration序列化模块
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ProbeSpec {
        ProbeSpec::new("probe_quay", "quay.io/prometheus/busybox", Duration::from_secs(60))
    }

    #[test]
    fn test_success_polarity() {
        assert_eq!(ProbeOutcome::Success.success_value(), 1.0);
        assert_eq!(ProbeOutcome::Failure("boom".to_string()).success_value(), 0.0);
        assert_eq!(ProbeOutcome::Timeout.success_value(), 0.0);
    }

    #[test]
    fn test_outcome_detail() {
        assert_eq!(ProbeOutcome::Failure("boom".to_string()).detail(), Some("boom"));
        assert_eq!(ProbeOutcome::Timeout.detail(), None);
    }

    #[test]
    fn test_result_from_spec() {
        let started_at = Utc::now();
        let result = ProbeResult::new(
            &spec(),
            3,
            started_at,
            Duration::from_millis(1500),
            ProbeOutcome::Success,
        );

        assert_eq!(result.name, "probe_quay");
        assert_eq!(result.argument, "quay.io/prometheus/busybox");
        assert_eq!(result.cycle, 3);
        assert!(result.is_success());
        assert_eq!(result.duration_seconds(), 1.5);
        assert!((result.started_at_unix() - started_at.timestamp() as f64).abs() < 1.0);
    }

    #[test]
    fn test_result_json_shape() {
        let result = ProbeResult::new(
            &spec(),
            1,
            Utc::now(),
            Duration::from_millis(250),
            ProbeOutcome::Failure("exit status: 1".to_string()),
        );

        let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(value["duration_ms"], 250);
        assert_eq!(value["outcome"]["status"], "failure");
        assert_eq!(value["outcome"]["detail"], "exit status: 1");
    }

    #[test]
    fn test_spec_from_config() {
        let section = toml::from_str("timeout = 5").unwrap();
        let config = ProbeConfig::new("probe_slow", section);
        let spec = ProbeSpec::try_from(&config).unwrap();
        assert_eq!(spec.timeout, Duration::from_secs(5));
        assert_eq!(spec.argument, "");

        let section = toml::from_str(r#"args = "x""#).unwrap();
        let config = ProbeConfig::new("probe_slow", section);
        assert!(ProbeSpec::try_from(&config).is_err());
    }
}
