//! 完整性校验失败后的自重启：以相同参数重新拉起当前可执行文件。

use std::ffi::OsString;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// 启动当前可执行文件的新实例（继承标准输入输出），不等待其退出。
pub fn respawn_self() -> std::io::Result<u32> {
    let exe = std::env::current_exe()?;
    let args: Vec<OsString> = std::env::args_os().skip(1).collect();
    let child = Command::new(&exe)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()?;
    let pid = child.id().unwrap_or_default();
    info!(
        target: "plcgw.lifecycle",
        exe = %exe.display(),
        pid,
        "process_respawned"
    );
    Ok(pid)
}
