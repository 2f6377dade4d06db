//! 信号处理模块
//!
//! 将 SIGINT/SIGTERM 转换为广播关闭信号，探测循环和指标端点据此优雅退出

use crate::error::Result;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[cfg(unix)]
use signal_hook::consts::{SIGINT, SIGTERM};
#[cfg(unix)]
use signal_hook_tokio::Signals;

/// 设置信号处理器
///
/// 收到第一个终止信号后通过 `shutdown_tx` 广播一次关闭信号。
pub async fn setup_signal_handlers(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    #[cfg(unix)]
    {
        setup_unix_signals(shutdown_tx).await
    }
    #[cfg(not(unix))]
    {
        setup_ctrl_c(shutdown_tx);
        Ok(())
    }
}

/// Unix/Linux系统信号处理
#[cfg(unix)]
async fn setup_unix_signals(shutdown_tx: broadcast::Sender<()>) -> Result<()> {
    use futures::stream::StreamExt;

    let signals = Signals::new([SIGINT, SIGTERM])?;
    let handle = signals.handle();

    tokio::spawn(async move {
        let mut signals = signals;
        if let Some(signal) = signals.next().await {
            match signal {
                SIGINT => info!("接收到 SIGINT 信号，开始优雅关闭..."),
                SIGTERM => info!("接收到 SIGTERM 信号，开始优雅关闭..."),
                _ => warn!("接收到未处理的信号: {signal}"),
            }
            notify_shutdown(&shutdown_tx);
        }
        handle.close();
    });

    Ok(())
}

/// 非Unix系统只监听 Ctrl+C
#[cfg(not(unix))]
fn setup_ctrl_c(shutdown_tx: broadcast::Sender<()>) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("接收到 Ctrl+C，开始优雅关闭...");
                notify_shutdown(&shutdown_tx);
            }
            Err(e) => error!("监听 Ctrl+C 失败: {e}"),
        }
    });
}

fn notify_shutdown(shutdown_tx: &broadcast::Sender<()>) {
    if let Err(e) = shutdown_tx.send(()) {
        error!("发送关闭信号失败: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::time::Duration;

    #[tokio::test]
    async fn test_notify_without_receivers_does_not_panic() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        drop(shutdown_rx);
        notify_shutdown(&shutdown_tx);
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial]
    async fn test_sigterm_broadcasts_shutdown() {
        use nix::sys::signal::{raise, Signal};

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        setup_signal_handlers(shutdown_tx).await.unwrap();

        raise(Signal::SIGTERM).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), shutdown_rx.recv()).await;
        assert!(matches!(received, Ok(Ok(()))));
    }
}
