//! 停机信号：Unix 下监听 SIGINT / SIGTERM，其他平台监听 Ctrl-C。

use tracing::{info, warn};

/// 收到停机信号后返回。信号处理器安装失败时永不返回。
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(err) => {
                warn!(target: "plcgw.lifecycle", "install SIGTERM handler failed: {}", err);
                return wait_for_ctrl_c().await;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(sigint) => sigint,
            Err(err) => {
                warn!(target: "plcgw.lifecycle", "install SIGINT handler failed: {}", err);
                return wait_for_ctrl_c().await;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => {
                info!(target: "plcgw.lifecycle", signal = "SIGTERM", "signal_received");
            }
            _ = sigint.recv() => {
                info!(target: "plcgw.lifecycle", signal = "SIGINT", "signal_received");
            }
        }
    }

    #[cfg(not(unix))]
    wait_for_ctrl_c().await;
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target: "plcgw.lifecycle", signal = "ctrl_c", "signal_received"),
        Err(err) => {
            warn!(target: "plcgw.lifecycle", "install ctrl_c handler failed: {}", err);
            std::future::pending::<()>().await;
        }
    }
}
