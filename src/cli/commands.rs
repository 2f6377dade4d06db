//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader};
use crate::error::{ConfigError, ProbeError, Result};
use crate::logging::{parse_level, LogConfig, LoggingSystem};
use crate::probe::{prepare_probes, IterationScheduler, ProbeRegistry, ProbeResult};
use crate::shutdown::setup_signal_handlers;
use crate::web::{MetricsServer, MetricsSink};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 生成日志配置
///
/// 级别优先级：命令行 > 配置文件 > info，日志文件同样命令行优先。
pub fn log_config(args: &Args, config: Option<&Config>) -> LogConfig {
    let level = args
        .log_level
        .clone()
        .map(Into::into)
        .or_else(|| config.and_then(|c| parse_level(&c.global.logging_level)))
        .unwrap_or(log::LevelFilter::Info);

    let file_path = args
        .log_file
        .clone()
        .or_else(|| config.and_then(|c| c.global.log_file.clone()));

    LogConfig {
        level,
        json_format: args.json_logs,
        file_path,
    }
}

/// 加载命令行指定（或默认位置）的配置文件
async fn load_config(args: &Args) -> Result<Config> {
    let loader = TomlConfigLoader::new(true);
    loader.load_from_file(args.get_config_path()).await
}

/// 一次性命令只在命令行指定时输出日志，避免干扰命令输出
fn init_command_logging(args: &Args) -> Result<()> {
    let config = LogConfig {
        level: args
            .log_level
            .clone()
            .map(Into::into)
            .unwrap_or(log::LevelFilter::Warn),
        json_format: args.json_logs,
        file_path: args.log_file.clone(),
    };
    LoggingSystem::setup_logging(config)?;
    Ok(())
}

/// 运行命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let (interval, port) = match args.command() {
            Commands::Run { interval, port } => (interval, port),
            _ => (None, None),
        };

        let mut config = load_config(args).await?;
        if let Some(interval) = interval {
            config.global.interval = interval;
        }
        if let Some(port) = port {
            config.global.port = port;
        }
        TomlConfigLoader::default().validate(&config)?;

        LoggingSystem::setup_logging(log_config(args, Some(&config)))?;
        info!("{} v{} 启动", crate::APP_NAME, crate::VERSION);

        self.run(config).await
    }
}

impl RunCommand {
    /// 启动指标端点和探测循环，直到收到关闭信号
    async fn run(&self, config: Config) -> Result<()> {
        let registry = ProbeRegistry::with_builtin_probes(config.global.scratch_root());
        let resolution = registry.resolve_required(&config.probes)?;
        prepare_probes(&resolution.active).await;

        let sink = Arc::new(MetricsSink::new()?);
        let server = MetricsServer::new(
            &config.global.bind_address,
            config.global.port,
            Arc::clone(&sink),
        )?;
        let (_addr, server_handle) = server.spawn().await?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        setup_signal_handlers(shutdown_tx).await?;

        let scheduler = IterationScheduler::new(resolution.active, sink, config.global.interval());
        scheduler.run(shutdown_rx).await;

        let status = scheduler.status();
        info!(
            "正在关闭 {}，共完成 {} 个周期，最近周期 {} 个探针失败",
            crate::APP_NAME,
            status.cycles_completed,
            status.last_cycle_failures
        );
        server_handle.abort();
        info!("{} 已关闭", crate::APP_NAME);

        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let verbose = matches!(args.command(), Commands::Validate { verbose: true });
        init_command_logging(args)?;

        let config_path = args.get_config_path();
        println!("验证配置文件: {}", config_path.display());

        let config = load_config(args).await?;
        let registry = ProbeRegistry::with_builtin_probes(config.global.scratch_root());
        let resolution = registry.resolve_required(&config.probes)?;

        println!("✓ 配置文件验证通过");
        println!("✓ 可用探针 {} 个", resolution.active.len());
        for name in &resolution.excluded {
            println!("✗ 未知探针已排除: {name}");
        }

        if verbose {
            println!("全局配置:");
            println!("  探测周期: {}秒", config.global.interval);
            println!("  日志级别: {}", config.global.logging_level);
            println!(
                "  监听地址: {}:{}",
                config.global.bind_address, config.global.port
            );
            println!("  临时目录: {}", config.global.scratch_root().display());

            println!("探针配置:");
            for (i, probe) in resolution.active.iter().enumerate() {
                println!("  {}. {}", i + 1, probe.spec.name);
                println!("     参数: {}", probe.spec.argument);
                println!("     超时: {}秒", probe.spec.timeout.as_secs());
            }
        }

        Ok(())
    }
}

/// 检测命令：执行一个探测周期，不启动指标端点
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let (probe, format) = match args.command() {
            Commands::Check { probe, format } => (probe, format),
            _ => (None, OutputFormat::Text),
        };
        init_command_logging(args)?;

        let config = load_config(args).await?;
        let results = self.run_once(&config, probe.as_deref()).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            OutputFormat::Text => print_text_results(&results),
        }

        let failures = results.iter().filter(|r| !r.is_success()).count();
        if failures > 0 {
            return Err(ProbeError::Failed(format!(
                "{} / {} 个探针未通过",
                failures,
                results.len()
            ))
            .into());
        }

        Ok(())
    }
}

impl CheckCommand {
    /// 执行一个周期并返回全部结果
    pub async fn run_once(
        &self,
        config: &Config,
        probe: Option<&str>,
    ) -> Result<Vec<ProbeResult>> {
        let probes: Vec<_> = config
            .probes
            .iter()
            .filter(|p| probe.map_or(true, |name| p.name == name))
            .cloned()
            .collect();

        if let Some(name) = probe {
            if probes.is_empty() {
                return Err(ConfigError::ValidationError(format!("配置中没有探针 {name}")).into());
            }
        }

        let registry = ProbeRegistry::with_builtin_probes(config.global.scratch_root());
        let resolution = registry.resolve_required(&probes)?;
        prepare_probes(&resolution.active).await;

        let sink = Arc::new(MetricsSink::new()?);
        let scheduler = IterationScheduler::new(resolution.active, sink, config.global.interval());
        Ok(scheduler.run_cycle(1).await)
    }
}

/// 打印文本格式结果
fn print_text_results(results: &[ProbeResult]) {
    for result in results {
        let status_icon = if result.is_success() { "✓" } else { "✗" };
        println!(
            "{} {} ({}) - {} - {}ms",
            status_icon,
            result.name,
            result.argument,
            result.outcome,
            result.duration.as_millis()
        );

        if let Some(detail) = result.outcome.detail() {
            println!("  错误: {detail}");
        }
    }
}

/// 列出内置探针
pub struct ListCommand;

#[async_trait]
impl Command for ListCommand {
    async fn execute(&self, _args: &Args) -> Result<()> {
        let registry = ProbeRegistry::with_builtin_probes(std::env::temp_dir());
        for name in registry.names() {
            println!("{name}");
        }
        Ok(())
    }
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = args.command() {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                OutputFormat::Text => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 按子命令分派执行
pub async fn execute_command(args: &Args) -> Result<()> {
    let command: Box<dyn Command> = match args.command() {
        Commands::Run { .. } => Box::new(RunCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::List => Box::new(ListCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    };

    let result = command.execute(args).await;
    if let Err(e) = &result {
        error!("命令执行失败: {}", e);
    }
    result
}
