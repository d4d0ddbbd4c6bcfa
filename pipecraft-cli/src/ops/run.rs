use anyhow::Context;
use pipecraft_core::{with_fifo_dir, with_stdio, with_terminal, Config, Creator};
use std::fs::{File, OpenOptions};
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// 启动 `command`，其 stdio 绑定到新建 fifo 的另一端，再由 attach 转发到当前终端。
///
/// 返回子进程的退出码（被信号终止时为 128 + 信号值）。
pub async fn run_command(
    dir: Option<&Path>,
    id: &str,
    terminal: bool,
    command: &[String],
) -> anyhow::Result<i32> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("missing command"))?;

    let mut creator = Creator::new().with(with_stdio());
    if let Some(dir) = dir {
        creator = creator.with(with_fifo_dir(dir));
    }
    if terminal {
        creator = creator.with(with_terminal());
    }
    let io = creator.create(id)?;

    // 启动器一侧按相反方向打开，与 attach 的打开配对
    let config = io.config().clone();
    let (stdin, stdout, stderr) = tokio::task::spawn_blocking(move || bind_peer(&config))
        .await?
        .context("failed to bind fifos for child")?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(stdin)
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .with_context(|| format!("failed to spawn {}", program))?;
    tracing::debug!(pid = child.id(), program = %program, "child started");

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, killing child");
            child.kill().await?;
            child.wait().await?
        }
    };

    // 进程退出后先排空输出，再放弃仍在等终端输入的 stdin
    if let Err(e) = io.wait_output().await {
        tracing::warn!("output forwarding failed: {}", e);
    }
    io.cancel();
    io.close().await?;

    Ok(exit_code(status))
}

fn bind_peer(config: &Config) -> std::io::Result<(Stdio, Stdio, Stdio)> {
    let stdin = File::open(&config.stdin)?;
    let stdout = OpenOptions::new().write(true).open(&config.stdout)?;
    let stderr = OpenOptions::new().write(true).open(&config.stderr)?;
    Ok((stdin.into(), stdout.into(), stderr.into()))
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_maps_signals() {
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        // SIGKILL
        assert_eq!(exit_code(ExitStatus::from_raw(9)), 137);
    }
}
