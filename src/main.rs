//! Probe Exporter 主程序入口
//!
//! 周期性执行探针并导出 Prometheus 指标

use anyhow::Context;
use probe_exporter::cli::{execute_command, Args};

// 探针在同一线程上协作式调度，阻塞工作交给 spawn_blocking 线程池
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse_args();

    // 启动失败和 check 命令中的探针失败都以状态码 1 退出
    if let Err(e) = execute_command(&args).await.context("命令执行失败") {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}
