//! fifo 的阻塞式打开：读端要等写端出现，写端要等读端出现。
//!
//! 打开放在独立线程里做，调用方通过 oneshot 等结果；取消时从对端以非阻塞方式
//! 临时打开一次，让阻塞中的 open 返回。

use crate::error::{FifoError, Result};
use crate::models::Stream;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// 取消后重试唤醒的间隔：打开线程可能还没进入 open(2)。
const UNBLOCK_RETRY: Duration = Duration::from_millis(10);

/// 以进程一侧的方向打开 fifo：stdin 只写，stdout/stderr 只读。
pub(crate) async fn open_fifo(
    stream: Stream,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<File> {
    if cancel.is_cancelled() {
        return Err(FifoError::Cancelled(stream));
    }

    let mut opening = spawn_open(stream, path.to_path_buf())?;
    tokio::select! {
        biased;
        joined = &mut opening => return settle(stream, path, joined),
        _ = cancel.cancelled() => {}
    }

    tracing::debug!(%stream, path = %path.display(), "open cancelled, unblocking");
    loop {
        match unblock(stream, path) {
            Ok(()) => {}
            // 读端还没进入 open，对端非阻塞写打开会得到 ENXIO，稍后重试
            Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {}
            Err(e) => {
                // 无法从对端打开（通常是 fifo 已被删除），打开线程只能留给进程退出时回收
                tracing::warn!(%stream, path = %path.display(), "cannot unblock pending open: {}", e);
                return Err(FifoError::Cancelled(stream));
            }
        }
        if let Ok(joined) = tokio::time::timeout(UNBLOCK_RETRY, &mut opening).await {
            // 拿到的是临时对端配对出来的句柄，直接丢弃
            drop(joined);
            return Err(FifoError::Cancelled(stream));
        }
    }
}

/// 独立线程里执行阻塞 open。线程不进 tokio 的 blocking 池，
/// 即使永远等不到对端也不会拖住 runtime 的关闭。
fn spawn_open(stream: Stream, path: PathBuf) -> Result<oneshot::Receiver<io::Result<File>>> {
    let (tx, rx) = oneshot::channel();
    let err_path = path.clone();
    std::thread::Builder::new()
        .name(format!("fifo-open-{}", stream))
        .spawn(move || {
            let _ = tx.send(open_blocking(stream, &path));
        })
        .map_err(|e| FifoError::open(stream, err_path, e))?;
    Ok(rx)
}

fn open_blocking(stream: Stream, path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    if stream.reads_fifo() {
        options.read(true);
    } else {
        options.write(true);
    }
    options.open(path)
}

/// 从反方向非阻塞打开后立即关闭，唤醒阻塞在 open 上的一端。
fn unblock(stream: Stream, path: &Path) -> io::Result<()> {
    let mut options = OpenOptions::new();
    if stream.reads_fifo() {
        options.write(true);
    } else {
        options.read(true);
    }
    options.custom_flags(OFlag::O_NONBLOCK.bits()).open(path)?;
    Ok(())
}

fn settle(
    stream: Stream,
    path: &Path,
    joined: std::result::Result<io::Result<File>, oneshot::error::RecvError>,
) -> Result<File> {
    match joined {
        Ok(Ok(file)) => {
            tracing::debug!(%stream, path = %path.display(), "fifo opened");
            Ok(file)
        }
        Ok(Err(e)) => Err(FifoError::open(stream, path, e)),
        Err(_) => Err(FifoError::Task(stream, "open thread exited".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fifo::FifoSet;
    use std::io::{Read, Write};

    #[tokio::test]
    async fn open_waits_for_peer() {
        let fifos = FifoSet::create("", "open", false).unwrap();
        let path = fifos.path(Stream::Stdout).to_path_buf();
        let cancel = CancellationToken::new();

        let peer_path = path.clone();
        let peer = std::thread::spawn(move || {
            let mut writer = OpenOptions::new().write(true).open(peer_path).unwrap();
            writer.write_all(b"hello").unwrap();
        });

        let mut file = open_fifo(Stream::Stdout, &path, &cancel).await.unwrap();
        peer.join().unwrap();
        let mut got = String::new();
        file.read_to_string(&mut got).unwrap();
        assert_eq!(got, "hello");
    }

    #[tokio::test]
    async fn cancel_unblocks_reader_and_writer() {
        let fifos = FifoSet::create("", "stuck", false).unwrap();
        let cancel = CancellationToken::new();

        let reader = open_fifo(Stream::Stderr, fifos.path(Stream::Stderr), &cancel);
        let writer = open_fifo(Stream::Stdin, fifos.path(Stream::Stdin), &cancel);
        let trigger = async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        };

        let (reader, writer, _) = tokio::time::timeout(Duration::from_secs(5), async {
            tokio::join!(reader, writer, trigger)
        })
        .await
        .expect("cancel must unblock pending opens");
        assert!(matches!(reader, Err(FifoError::Cancelled(Stream::Stderr))));
        assert!(matches!(writer, Err(FifoError::Cancelled(Stream::Stdin))));
    }

    #[tokio::test]
    async fn missing_fifo_is_open_error() {
        let cancel = CancellationToken::new();
        let err = open_fifo(Stream::Stdout, Path::new("/nonexistent/x-stdout"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FifoError::Open { stream: Stream::Stdout, .. }));
    }

    #[tokio::test]
    async fn already_cancelled_skips_open() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = open_fifo(Stream::Stdin, Path::new("/nonexistent/x-stdin"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
