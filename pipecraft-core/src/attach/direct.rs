//! 直接把进程一侧的 fifo 句柄交给调用方，不启动拷贝任务。

use super::copy::close_fd;
use super::open::open_fifo;
use super::*;
use tokio::net::unix::pipe;

/// 三个已打开的 fifo 句柄：写 `stdin` 即进程的输入，读 `stdout`/`stderr` 即进程的输出。
#[derive(Debug)]
pub struct DirectIo {
    pub stdin: Option<pipe::Sender>,
    pub stdout: Option<pipe::Receiver>,
    pub stderr: Option<pipe::Receiver>,
    set: FifoSet,
}

impl DirectIo {
    /// 并发打开三个 fifo，等对端全部就位后返回。
    ///
    /// 任一方向失败时其余仍在等待的打开会被取消；`cancel` 可以从外部放弃整个打开过程。
    #[instrument(skip_all, fields(dir = %set.dir().display()))]
    pub async fn open(set: FifoSet, cancel: &CancellationToken) -> Result<Self> {
        let abort = cancel.child_token();
        let open_one = |stream: Stream| {
            let abort = abort.clone();
            let path = set.path(stream).to_path_buf();
            async move {
                let opened = open_fifo(stream, &path, &abort).await;
                if opened.is_err() {
                    abort.cancel();
                }
                opened
            }
        };
        let (stdin, stdout, stderr) = tokio::join!(
            open_one(Stream::Stdin),
            open_one(Stream::Stdout),
            open_one(Stream::Stderr)
        );

        let (stdin, stdout, stderr) = match (stdin, stdout, stderr) {
            (Ok(stdin), Ok(stdout), Ok(stderr)) => (stdin, stdout, stderr),
            (stdin, stdout, stderr) => {
                // 只报真正的失败；被连带取消的方向不算
                let errors: Vec<FifoError> = [stdin.err(), stdout.err(), stderr.err()]
                    .into_iter()
                    .flatten()
                    .collect();
                let (cancelled, failed): (Vec<_>, Vec<_>) =
                    errors.into_iter().partition(FifoError::is_cancelled);
                return Err(if failed.is_empty() {
                    FifoError::combine(cancelled)
                } else {
                    FifoError::combine(failed)
                });
            }
        };

        let wrap = |stream: Stream, e: std::io::Error| FifoError::open(stream, set.path(stream), e);
        let stdin = pipe::Sender::from_file(stdin).map_err(|e| wrap(Stream::Stdin, e))?;
        let stdout = pipe::Receiver::from_file(stdout).map_err(|e| wrap(Stream::Stdout, e))?;
        let stderr = pipe::Receiver::from_file(stderr).map_err(|e| wrap(Stream::Stderr, e))?;
        tracing::debug!("direct io opened");

        Ok(Self {
            stdin: Some(stdin),
            stdout: Some(stdout),
            stderr: Some(stderr),
            set,
        })
    }

    pub fn config(&self) -> &Config {
        self.set.config()
    }

    /// 释放仍持有的句柄并关闭 fifo 集合。
    pub fn close(mut self) -> Result<()> {
        let mut errors = Vec::new();
        let released = [
            self.stdin
                .take()
                .map(|p| p.into_nonblocking_fd().map_err(|e| FifoError::close(Stream::Stdin, e))),
            self.stdout
                .take()
                .map(|p| p.into_nonblocking_fd().map_err(|e| FifoError::close(Stream::Stdout, e))),
            self.stderr
                .take()
                .map(|p| p.into_nonblocking_fd().map_err(|e| FifoError::close(Stream::Stderr, e))),
        ];
        for (stream, fd) in Stream::ALL.into_iter().zip(released) {
            match fd {
                Some(Ok(fd)) => {
                    if let Err(e) = close_fd(stream, fd) {
                        errors.push(e);
                    }
                }
                Some(Err(e)) => errors.push(e),
                None => {}
            }
        }
        if let Err(e) = self.set.close() {
            errors.push(e);
        }
        FifoError::aggregate(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{File, OpenOptions};
    use std::io::{Read, Write};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn direct_io_hands_out_pipes() {
        let set = FifoSet::create("", "direct", false).unwrap();
        let cfg = set.config().clone();
        let dir = set.dir().to_path_buf();
        let peer = std::thread::spawn(move || -> std::io::Result<Vec<u8>> {
            let mut stdin = File::open(&cfg.stdin)?;
            let mut out = OpenOptions::new().write(true).open(&cfg.stdout)?;
            let err = OpenOptions::new().write(true).open(&cfg.stderr)?;
            drop(err);
            out.write_all(b"pong")?;
            drop(out);
            let mut got = Vec::new();
            stdin.read_to_end(&mut got)?;
            Ok(got)
        });

        let cancel = CancellationToken::new();
        let mut io = tokio::time::timeout(Duration::from_secs(10), DirectIo::open(set, &cancel))
            .await
            .unwrap()
            .unwrap();

        let mut stdin = io.stdin.take().unwrap();
        stdin.write_all(b"ping").await.unwrap();
        drop(stdin);

        let mut out = String::new();
        io.stdout.as_mut().unwrap().read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "pong");
        assert_eq!(peer.join().unwrap().unwrap(), b"ping");

        io.close().unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn direct_io_open_can_be_cancelled() {
        let set = FifoSet::create("", "direct-cancel", false).unwrap();
        let dir = set.dir().to_path_buf();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = tokio::time::timeout(Duration::from_secs(10), DirectIo::open(set, &cancel))
            .await
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
        // 打开失败时集合随之释放
        assert!(!dir.exists());
    }
}
