use pipecraft_core::{attach, with_stdio, Config, FifoSet};
use std::path::Path;

/// 把当前终端接到 `<dir>/<id>-*` 上。
///
/// 对端关闭 stdout 和 stderr 后自动断开；Ctrl+C 主动断开。fifo 文件留给创建者删除。
pub async fn attach_fifos(dir: &Path, id: &str) -> anyhow::Result<()> {
    let config = Config::new(dir, id, false);
    for path in [&config.stdin, &config.stdout, &config.stderr] {
        if !path.exists() {
            anyhow::bail!("fifo not found: {}", path.display());
        }
    }

    let fifos = FifoSet::from_config(config);
    let io = attach(&fifos, with_stdio())?;
    tracing::info!(id, "attached; Ctrl+C detaches");

    let forwarded = tokio::select! {
        res = io.wait_output() => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(id, "detaching");
            Ok(())
        }
    };
    io.cancel();
    io.close().await?;
    forwarded?;
    Ok(())
}
