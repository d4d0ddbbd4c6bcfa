use crate::error::{FifoError, Result};
use std::io::ErrorKind;
use std::path::Path;

/// 删除单个 fifo；文件已不存在视为成功。
pub(super) fn remove_fifo(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FifoError::remove(path, e)),
    }
}

/// 删除自建目录。目录里若还有别人放进来的文件，也一并清掉。
pub(super) fn remove_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FifoError::remove(dir, e)),
    }
}
