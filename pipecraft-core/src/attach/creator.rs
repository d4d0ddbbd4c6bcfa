use super::*;

type StreamOpt = Box<dyn FnOnce(&mut Streams) + Send>;

/// 先建 fifo 集合再 attach；返回的句柄拥有这个集合，close 时删除 fifo。
///
/// ```no_run
/// # async fn demo() -> pipecraft_core::Result<()> {
/// use pipecraft_core::{with_stdio, with_terminal, Creator};
///
/// let io = Creator::new().with(with_stdio()).with(with_terminal()).create("web-1")?;
/// println!("stdin fifo: {}", io.config().stdin.display());
/// io.wait().await?;
/// io.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Creator {
    opts: Vec<StreamOpt>,
}

impl Creator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个端点配置，按添加顺序应用。
    pub fn with(mut self, opt: impl FnOnce(&mut Streams) + Send + 'static) -> Self {
        self.opts.push(Box::new(opt));
        self
    }

    /// `fifo_dir` 未设置时使用私有临时目录。
    #[instrument(skip(self))]
    pub fn create(self, id: &str) -> Result<Attachment> {
        let mut streams = Streams::default();
        for opt in self.opts {
            opt(&mut streams);
        }
        let dir = streams.fifo_dir.take().unwrap_or_default();
        let set = FifoSet::create(&dir, id, streams.terminal)?;
        Attachment::spawn(set, streams, true)
    }
}

impl std::fmt::Debug for Creator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Creator")
            .field("opts", &self.opts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn creator_owns_fifo_set() {
        let root = TempDir::new().unwrap();
        let (out_near, mut out_far) = duplex(256);
        let io = Creator::new()
            .with(with_fifo_dir(root.path()))
            .with(with_terminal())
            .with(with_streams(None, Some(Box::new(out_near)), None))
            .create("owned")
            .unwrap();

        let cfg = io.config().clone();
        assert!(cfg.terminal);
        assert!(cfg.stdout.starts_with(root.path()));
        assert_eq!(cfg.stdout.file_name().unwrap(), "owned-stdout");
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);

        let writer = std::thread::spawn(move || {
            let mut out = OpenOptions::new().write(true).open(&cfg.stdout).unwrap();
            out.write_all(b"ready").unwrap();
        });
        tokio::time::timeout(Duration::from_secs(10), io.wait())
            .await
            .unwrap()
            .unwrap();
        writer.join().unwrap();

        io.close().await.unwrap();
        // 目录是调用方给的，只删其中的私有子目录
        assert!(root.path().exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);

        drop(io.take_streams().await);
        let mut got = String::new();
        out_far.read_to_string(&mut got).await.unwrap();
        assert_eq!(got, "ready");
    }

    fn creator_in(dir: &Path) -> Creator {
        Creator::new().with(with_fifo_dir(dir))
    }

    #[tokio::test]
    async fn fifo_dir_accepts_borrowed_path() {
        let root = TempDir::new().unwrap();
        let io = creator_in(root.path()).create("borrowed").unwrap();
        assert!(io.config().stdin.starts_with(root.path()));
        io.close().await.unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn creator_without_dir_uses_private_dir() {
        let io = Creator::new().create("private").unwrap();
        let dir = io.config().stdin.parent().unwrap().to_path_buf();
        assert!(dir.exists());
        io.close().await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn dropped_attachment_releases_owned_set() {
        let (_in_far, in_near) = duplex(16);
        let io = Creator::new()
            .with(with_streams(Some(Box::new(in_near)), None, None))
            .create("dropped")
            .unwrap();
        let dir = io.config().stdin.parent().unwrap().to_path_buf();
        drop(io);

        // 最后一个方向任务结束后集合才被删除
        tokio::time::timeout(Duration::from_secs(10), async {
            while dir.exists() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
