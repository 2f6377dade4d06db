//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Probe Exporter 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum ProbeExporterError {
    /// 配置相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探针注册表相关错误
    #[error("探针注册错误: {0}")]
    Registry(#[from] RegistryError),

    /// 探针执行相关错误
    #[error("探针执行错误: {0}")]
    Probe(#[from] ProbeError),

    /// 指标相关错误
    #[error("指标错误: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置错误类型，全部为启动期致命错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 探针注册表错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// 配置中的探针名称没有对应的实现
    #[error("未知探针: {name}")]
    UnknownProbe { name: String },

    /// 没有任何可用的探针
    #[error("没有可用的探针（配置了 {configured} 个，全部无法解析）")]
    NoActiveProbes { configured: usize },

    /// 重复注册同名探针
    #[error("探针重复注册: {name}")]
    DuplicateHandler { name: String },
}

/// 探针执行失败的详细信息
#[derive(Error, Debug)]
pub enum ProbeError {
    /// 外部命令无法启动
    #[error("无法启动命令 {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// 外部命令以非零状态退出
    #[error("命令 {program} 执行失败 ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// 临时目录准备失败
    #[error("临时目录准备失败: {0}")]
    Scratch(#[source] std::io::Error),

    /// 探针自身报告的失败
    #[error("{0}")]
    Failed(String),

    /// 探针执行过程中发生panic
    #[error("探针panic: {0}")]
    Panicked(String),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ProbeExporterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message_contains_status_and_stderr() {
        let err = ProbeError::CommandFailed {
            program: "git".to_string(),
            status: "exit status: 128".to_string(),
            stderr: "fatal: repository not found".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("git"));
        assert!(message.contains("128"));
        assert!(message.contains("repository not found"));
    }

    #[test]
    fn test_registry_error_converts_to_top_level() {
        let err: ProbeExporterError = RegistryError::UnknownProbe {
            name: "probe_missing".to_string(),
        }
        .into();
        assert!(matches!(err, ProbeExporterError::Registry(_)));
        assert!(err.to_string().contains("probe_missing"));
    }
}
