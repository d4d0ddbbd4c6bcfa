use super::*;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use tracing::instrument;
use uuid::Uuid;

/// fifo 与私有临时目录的权限：仅当前用户可读写。
const FIFO_MODE: u32 = 0o700;

impl FifoSet {
    /// 在新建的私有目录里创建 `<id>-stdin` / `<id>-stdout` / `<id>-stderr` 三个 fifo。
    ///
    /// 私有目录（`pipecraft-<uuid>`，0700）建在 `dir` 下，`dir` 为空时建在系统临时目录下。
    /// 私有目录归本集合所有，close 时删除；`dir` 本身可能被多个进程共享，从不删除。
    /// 任一 fifo 创建失败都会回滚已创建的文件与私有目录。
    #[instrument(skip(dir), fields(dir = %dir.as_ref().display()))]
    pub fn create(dir: impl AsRef<Path>, id: &str, terminal: bool) -> Result<Self> {
        let base = dir.as_ref();
        let base = if base.as_os_str().is_empty() {
            std::env::temp_dir()
        } else {
            std::fs::create_dir_all(base).map_err(|e| FifoError::create(base, e))?;
            base.to_path_buf()
        };
        let dir = create_private_dir(&base)?;

        let config = Config::new(&dir, id, terminal);

        let mut created: Vec<&Path> = Vec::with_capacity(3);
        for stream in Stream::ALL {
            let path = config.path(stream);
            if let Err(e) = make_fifo(path) {
                rollback(&created, &dir);
                return Err(e);
            }
            created.push(path);
        }
        tracing::debug!(id, dir = %dir.display(), "fifo set created");

        Ok(Self::from_parts(config, dir, true, true))
    }
}

/// `base` 下的 `pipecraft-<uuid>`，权限 0700。
fn create_private_dir(base: &Path) -> Result<PathBuf> {
    let dir = base.join(format!("pipecraft-{}", Uuid::new_v4()));
    DirBuilder::new()
        .mode(FIFO_MODE)
        .create(&dir)
        .map_err(|e| FifoError::create(&dir, e))?;
    Ok(dir)
}

fn make_fifo(path: &Path) -> Result<()> {
    mkfifo(path, Mode::from_bits_truncate(FIFO_MODE))
        .map_err(|errno| FifoError::create(path, std::io::Error::from(errno)))
}

/// 创建失败时的回滚，尽力而为。
fn rollback(created: &[&Path], dir: &Path) {
    for path in created {
        if let Err(e) = cleanup::remove_fifo(path) {
            tracing::warn!("rollback failed: {}", e);
        }
    }
    if let Err(e) = cleanup::remove_dir(dir) {
        tracing::warn!("rollback failed: {}", e);
    }
}
