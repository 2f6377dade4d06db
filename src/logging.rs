//! 日志系统模块
//!
//! 提供结构化日志配置和管理功能

use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter, Layer, Registry};

/// 输出层类型
type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 全局日志初始化状态
#[derive(Debug, Default)]
struct GlobalLoggingState {
    /// 初始化结果，未初始化时为 None
    init_result: Option<Result<(), String>>,
}

/// 全局日志状态管理器
static GLOBAL_LOGGING_STATE: OnceLock<Mutex<GlobalLoggingState>> = OnceLock::new();

/// 日志配置结构
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志级别
    pub level: LevelFilter,
    /// 是否使用JSON格式
    pub json_format: bool,
    /// 日志文件路径，设置后日志写入文件而不是标准输出
    pub file_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            json_format: false,
            file_path: None,
        }
    }
}

/// 解析配置文件中的日志级别
///
/// 大小写不敏感，`warning` 与 `warn` 等价。
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    match level.to_lowercase().as_str() {
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        "trace" => Some(LevelFilter::Trace),
        "off" => Some(LevelFilter::Off),
        _ => None,
    }
}

/// 日志系统管理器
#[derive(Debug)]
pub struct LoggingSystem {
    /// 配置
    config: LogConfig,
}

impl LoggingSystem {
    /// 初始化日志系统
    ///
    /// 进程内只会真正初始化一次，之后的调用沿用第一次的结果。
    pub fn setup_logging(config: LogConfig) -> anyhow::Result<Self> {
        let state_mutex =
            GLOBAL_LOGGING_STATE.get_or_init(|| Mutex::new(GlobalLoggingState::default()));
        let mut state = state_mutex.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = &state.init_result {
            return match previous {
                Ok(()) => Ok(Self { config }),
                Err(e) => Err(anyhow::anyhow!("日志系统之前初始化失败: {}", e)),
            };
        }

        let init_result = Self::perform_initialization(&config);
        state.init_result = Some(init_result.as_ref().map(|_| ()).map_err(|e| e.to_string()));

        init_result?;
        Ok(Self { config })
    }

    /// 当前句柄使用的配置
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    fn perform_initialization(config: &LogConfig) -> anyhow::Result<()> {
        // log crate 到 tracing 的桥接
        Self::init_log_tracer()?;

        let env_filter = EnvFilter::from_default_env()
            .add_directive(Self::convert_level_to_directive(config.level));
        let layer = Self::build_layer(config)?;

        match registry().with(layer).with(env_filter).try_init() {
            Ok(()) => {
                tracing::debug!("日志配置: {:?}", config);
                Ok(())
            }
            Err(e) => {
                let error_msg = e.to_string();
                if error_msg.contains(
                    "attempted to set a logger after the logging system was already initialized",
                ) || error_msg.contains("a global default trace dispatcher has already been set")
                {
                    // LogTracer 已由上面的桥接安装
                    tracing::debug!("日志系统已经初始化过了");
                    Ok(())
                } else {
                    Err(anyhow::anyhow!("tracing subscriber初始化失败: {}", error_msg))
                }
            }
        }
    }

    /// 初始化 LogTracer
    fn init_log_tracer() -> anyhow::Result<()> {
        use tracing_log::LogTracer;

        static LOG_TRACER_INIT: OnceLock<Result<(), String>> = OnceLock::new();

        let result = LOG_TRACER_INIT.get_or_init(|| LogTracer::init().map_err(|e| e.to_string()));

        result
            .as_ref()
            .map_err(|e| anyhow::anyhow!("LogTracer初始化失败: {}", e))?;
        Ok(())
    }

    /// 根据配置构建输出层
    ///
    /// 文件输出不带 ANSI 颜色，并记录源码位置。
    fn build_layer(config: &LogConfig) -> anyhow::Result<BoxedLayer> {
        let timer = fmt::time::ChronoUtc::rfc_3339();

        let layer = match (&config.file_path, config.json_format) {
            (Some(path), true) => fmt::layer()
                .json()
                .with_writer(open_log_file(path)?)
                .with_timer(timer)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            (Some(path), false) => fmt::layer()
                .with_writer(open_log_file(path)?)
                .with_ansi(false)
                .with_timer(timer)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            (None, true) => fmt::layer()
                .json()
                .with_timer(timer)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            (None, false) => fmt::layer()
                .with_timer(timer)
                .with_ansi(true)
                .with_target(true)
                .with_thread_ids(true)
                .boxed(),
        };

        Ok(layer)
    }

    /// 将 log::LevelFilter 转换为 tracing 的指令
    fn convert_level_to_directive(level: LevelFilter) -> tracing_subscriber::filter::Directive {
        use tracing_subscriber::filter::LevelFilter as TracingLevel;
        let level = match level {
            LevelFilter::Off => TracingLevel::OFF,
            LevelFilter::Error => TracingLevel::ERROR,
            LevelFilter::Warn => TracingLevel::WARN,
            LevelFilter::Info => TracingLevel::INFO,
            LevelFilter::Debug => TracingLevel::DEBUG,
            LevelFilter::Trace => TracingLevel::TRACE,
        };
        level.into()
    }

    /// 重置日志系统状态（主要用于测试）
    #[cfg(test)]
    pub fn reset_for_testing() {
        if let Some(state_mutex) = GLOBAL_LOGGING_STATE.get() {
            let mut state = state_mutex.lock().unwrap_or_else(PoisonError::into_inner);
            state.init_result = None;
        }
    }
}

/// 以追加方式打开日志文件，必要时创建父目录
fn open_log_file(path: &Path) -> anyhow::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| anyhow::anyhow!("创建日志目录 {} 失败: {}", parent.display(), e))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| anyhow::anyhow!("打开日志文件 {} 失败: {}", path.display(), e))
}
