//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Probe Exporter - 周期性探测并导出探针指标
#[derive(Parser, Debug, Clone)]
#[command(
    name = "probe-exporter",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "CONFIG_FILE"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，优先于配置文件中的 logging_level
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "PROBE_EXPORTER_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 是否输出JSON格式日志
    #[arg(long, help = "输出JSON格式日志")]
    pub json_logs: bool,

    /// 日志文件路径，优先于配置文件中的 log_file
    #[arg(
        long,
        value_name = "FILE",
        help = "日志写入文件而不是标准输出",
        env = "PROBE_EXPORTER_LOG_FILE"
    )]
    pub log_file: Option<PathBuf>,

    /// 子命令，省略时等同于 run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum LogLevel {
    /// 调试级别
    Debug,
    /// 信息级别
    Info,
    /// 警告级别
    Warn,
    /// 错误级别
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// 启动指标端点并持续执行探测循环
    Run {
        /// 探测周期（秒），覆盖配置文件
        #[arg(
            short,
            long,
            value_name = "SECONDS",
            help = "探测周期（秒）",
            env = "PROBE_EXPORTER_INTERVAL"
        )]
        interval: Option<u64>,

        /// 指标端点端口，覆盖配置文件
        #[arg(
            short,
            long,
            value_name = "PORT",
            help = "指标端点端口",
            env = "PROBE_EXPORTER_PORT"
        )]
        port: Option<u16>,
    },

    /// 验证配置文件并显示可用探针
    Validate {
        /// 是否显示详细信息
        #[arg(short, long, help = "显示详细信息")]
        verbose: bool,
    },

    /// 执行一个探测周期并输出结果
    Check {
        /// 只执行指定探针
        #[arg(short, long, value_name = "NAME", help = "探针名称")]
        probe: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },

    /// 列出所有内置探针
    List,

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run {
            interval: None,
            port: None,
        }
    }
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 要执行的子命令
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::get_default_config_path)
    }
}
