//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 全局配置段名称，其余所有顶层表都被视为探针配置段
pub const GLOBAL_SECTION: &str = "config";

/// 主配置结构，包含全局配置和探针列表
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// 全局配置项
    pub global: GlobalConfig,
    /// 探针配置列表（按名称排序）
    pub probes: Vec<ProbeConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_logging_level")]
    pub logging_level: String,
    /// 指标端点监听端口
    pub port: u16,
    /// 探测周期（秒）
    pub interval: u64,
    /// 指标端点绑定地址
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// 探针临时目录根路径
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    /// 日志文件路径，未配置时输出到标准输出
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// 单个探针配置段的内容
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeSection {
    /// 超时时间（秒）
    pub timeout: u64,
    /// 探针参数
    #[serde(default)]
    pub args: String,
}

/// 探针配置，名称取自配置段名
///
/// 配置段内容原样保留，只有注册表识别的探针才会被解析为 [`ProbeSection`]，
/// 因此未知探针的配置段即使不完整也不会影响启动。
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeConfig {
    /// 探针名称
    pub name: String,
    /// 原始配置段
    pub section: toml::Table,
}

impl ProbeConfig {
    /// 由配置段名和原始配置段创建
    pub fn new(name: impl Into<String>, section: toml::Table) -> Self {
        Self {
            name: name.into(),
            section,
        }
    }

    /// 由已解析的配置段创建
    pub fn from_section(name: impl Into<String>, section: ProbeSection) -> Self {
        let mut table = toml::Table::new();
        table.insert(
            "timeout".to_string(),
            toml::Value::Integer(i64::try_from(section.timeout).unwrap_or(i64::MAX)),
        );
        table.insert("args".to_string(), toml::Value::String(section.args));
        Self::new(name, table)
    }

    /// 解析并验证配置段
    pub fn settings(&self) -> Result<ProbeSection, ConfigError> {
        let section: ProbeSection = toml::Value::Table(self.section.clone())
            .try_into()
            .map_err(|e| ConfigError::ParseError(format!("[{}] 配置段无效: {}", self.name, e)))?;

        if section.timeout == 0 {
            return Err(ConfigError::ValidationError(format!(
                "探针 {} 的超时时间不能为0",
                self.name
            )));
        }

        Ok(section)
    }
}

impl ProbeSection {
    /// 超时时间
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl GlobalConfig {
    /// 探测周期
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// 临时目录根路径，未配置时使用系统临时目录
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(crate::APP_NAME))
    }
}

// 默认值函数
fn default_logging_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// 配置验证函数
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证全局配置
    if config.global.interval == 0 {
        return Err("探测周期不能为0".to_string());
    }

    if config.global.port == 0 {
        return Err("监听端口不能为0".to_string());
    }

    if config.global.bind_address.trim().is_empty() {
        return Err("绑定地址不能为空".to_string());
    }

    // 验证日志级别
    let valid_log_levels = ["debug", "info", "warn", "warning", "error"];
    if !valid_log_levels.contains(&config.global.logging_level.to_lowercase().as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.logging_level, valid_log_levels
        ));
    }

    // 验证探针配置
    for probe in &config.probes {
        if probe.name.trim().is_empty() {
            return Err("探针名称不能为空".to_string());
        }
    }

    Ok(())
}
