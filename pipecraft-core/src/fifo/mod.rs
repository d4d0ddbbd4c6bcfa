//! fifo 集合：为一个进程标识管理 stdin/stdout/stderr 三个命名管道的创建与删除。

use crate::error::{FifoError, Result};
use crate::models::{Config, Stream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod cleanup;
mod create;

/// 三个命名管道的路径与所有权。
///
/// attach 出去的句柄与方向任务共享同一份状态：文件在 `close` 或最后一个持有者释放时删除，
/// 所以临时的集合不会在打开途中被删掉。
#[derive(Debug)]
pub struct FifoSet {
    inner: Arc<Inner>,
}

/// - `owns_dir`: 目录由本集合创建，close 时一并删除
/// - `owns_pipes`: fifo 由本集合创建，close 时删除；`from_config` 接管的集合两者都为 false
#[derive(Debug)]
struct Inner {
    config: Config,
    dir: PathBuf,
    owns_dir: bool,
    owns_pipes: bool,
    closed: AtomicBool,
}

impl FifoSet {
    fn from_parts(config: Config, dir: PathBuf, owns_dir: bool, owns_pipes: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                dir,
                owns_dir,
                owns_pipes,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// 接管别处创建的 fifo（例如另一个进程的 `create`）；close 不删除任何文件。
    pub fn from_config(config: Config) -> Self {
        let dir = config
            .stdin
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_parts(config, dir, false, false)
    }

    /// 同一集合的另一个持有者，供 attach 的方向任务使用。
    pub(crate) fn share(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn owns_dir(&self) -> bool {
        self.inner.owns_dir
    }

    pub fn terminal(&self) -> bool {
        self.inner.config.terminal
    }

    pub fn path(&self, stream: Stream) -> &Path {
        self.inner.config.path(stream)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// 删除 fifo 文件与自有目录；只执行一次，之后的调用直接返回 Ok。
    ///
    /// 对所有持有者生效，调用前应先 close 掉 attach 出去的句柄。
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }
}

impl Inner {
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let mut errors = Vec::new();
        if self.owns_pipes {
            for stream in Stream::ALL {
                if let Err(e) = cleanup::remove_fifo(self.config.path(stream)) {
                    errors.push(e);
                }
            }
        }
        if self.owns_dir {
            if let Err(e) = cleanup::remove_dir(&self.dir) {
                errors.push(e);
            }
        }
        FifoError::aggregate(errors)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(dir = %self.dir.display(), "failed to clean up fifo set: {}", e);
        }
    }
}
