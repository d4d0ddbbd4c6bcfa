use super::output::{print_config, OutputFormat};
use pipecraft_core::FifoSet;
use std::path::Path;

/// 建好 fifo 后一直持有，直到 Ctrl+C；退出前删除。
pub async fn create_fifos(
    dir: Option<&Path>,
    id: &str,
    terminal: bool,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let fifos = FifoSet::create(dir.unwrap_or(Path::new("")), id, terminal)?;
    print_config(fifos.config(), output)?;
    tracing::info!(id, dir = %fifos.dir().display(), "fifo set ready; Ctrl+C removes it");

    tokio::signal::ctrl_c().await?;
    fifos.close()?;
    tracing::info!(id, "fifo set removed");
    Ok(())
}
