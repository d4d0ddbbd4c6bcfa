use super::open::open_fifo;
use super::*;
use std::os::fd::{IntoRawFd, OwnedFd};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::unix::pipe;

/// 单次拷贝的缓冲大小。
const COPY_BUF_SIZE: usize = 32 * 1024;

/// 调用方端点：stdin 方向是 Source，stdout/stderr 方向是 Sink。
pub(super) enum Endpoint {
    Source(Source),
    Sink(Sink),
}

/// 单个方向任务的最终结果。
pub(super) struct Finished {
    /// 打开或拷贝的结果（成功时为转发的字节数）
    pub result: Result<u64>,
    /// 释放 fifo 描述符的结果
    pub release: Result<()>,
    pub endpoint: Endpoint,
}

/// 单方向任务：打开 fifo → 拷贝 → 释放描述符。
///
/// `keep_alive` 是 fifo 集合的一份引用，任务结束前文件不会因持有者释放而被删除。
pub(super) async fn run_direction(
    stream: Stream,
    path: PathBuf,
    endpoint: Endpoint,
    cancel: CancellationToken,
    progress: Arc<Progress>,
    keep_alive: FifoSet,
) -> Finished {
    let opened = open_fifo(stream, &path, &cancel).await;
    progress.opening.fetch_sub(1, Ordering::AcqRel);

    let finished = match opened {
        Err(e) => {
            if !e.is_cancelled() {
                tracing::warn!(%stream, "fifo open failed: {}", e);
            }
            Finished {
                result: Err(e),
                release: Ok(()),
                endpoint,
            }
        }
        Ok(file) => {
            progress.copying.fetch_add(1, Ordering::AcqRel);
            let finished = match endpoint {
                Endpoint::Source(mut input) => {
                    let (result, release) = forward_input(stream, &path, file, &mut input, &cancel).await;
                    Finished {
                        result,
                        release,
                        endpoint: Endpoint::Source(input),
                    }
                }
                Endpoint::Sink(mut output) => {
                    let (result, release) = forward_output(stream, &path, file, &mut output, &cancel).await;
                    Finished {
                        result,
                        release,
                        endpoint: Endpoint::Sink(output),
                    }
                }
            };
            progress.copying.fetch_sub(1, Ordering::AcqRel);
            finished
        }
    };

    match &finished.result {
        Ok(bytes) => tracing::debug!(%stream, bytes, "direction finished"),
        Err(e) if !e.is_cancelled() => tracing::warn!(%stream, "direction failed: {}", e),
        Err(_) => {}
    }
    progress.finished.fetch_add(1, Ordering::AcqRel);
    drop(keep_alive);
    finished
}

/// 调用方输入 → stdin fifo。输入读到 EOF 后关闭写端，进程一侧随之看到 EOF。
async fn forward_input(
    stream: Stream,
    path: &Path,
    file: std::fs::File,
    input: &mut Source,
    cancel: &CancellationToken,
) -> (Result<u64>, Result<()>) {
    let mut pipe = match pipe::Sender::from_file(file) {
        Ok(pipe) => pipe,
        Err(e) => return (Err(FifoError::open(stream, path, e)), Ok(())),
    };
    let result = copy_stream(stream, input, &mut pipe, cancel).await;
    let release = pipe
        .into_nonblocking_fd()
        .map_err(|e| FifoError::close(stream, e))
        .and_then(|fd| close_fd(stream, fd));
    (result, release)
}

/// stdout/stderr fifo → 调用方输出。只 flush，不 shutdown 调用方的 sink。
async fn forward_output(
    stream: Stream,
    path: &Path,
    file: std::fs::File,
    output: &mut Sink,
    cancel: &CancellationToken,
) -> (Result<u64>, Result<()>) {
    let mut pipe = match pipe::Receiver::from_file(file) {
        Ok(pipe) => pipe,
        Err(e) => return (Err(FifoError::open(stream, path, e)), Ok(())),
    };
    let result = copy_stream(stream, &mut pipe, output, cancel).await;
    let release = pipe
        .into_nonblocking_fd()
        .map_err(|e| FifoError::close(stream, e))
        .and_then(|fd| close_fd(stream, fd));
    (result, release)
}

/// 顺序拷贝直到源端 EOF；每次读写都可以被 cancel 打断，已转发的字节不回滚。
async fn copy_stream<R, W>(
    stream: Stream,
    src: &mut R,
    dst: &mut W,
    cancel: &CancellationToken,
) -> Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = src.read(&mut buf) => read.map_err(|e| FifoError::copy(stream, e))?,
        };
        if n == 0 {
            tracing::debug!(%stream, total, "eof");
            return Ok(total);
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            written = write_chunk(dst, &buf[..n]) => written.map_err(|e| FifoError::copy(stream, e))?,
        }
        total += n as u64;
    }
    tracing::debug!(%stream, total, "copy cancelled");
    Ok(total)
}

async fn write_chunk<W: AsyncWrite + Unpin + ?Sized>(dst: &mut W, chunk: &[u8]) -> std::io::Result<()> {
    dst.write_all(chunk).await?;
    dst.flush().await
}

/// 显式 close(2)，以便拿到错误；drop 会吞掉它。
pub(super) fn close_fd(stream: Stream, fd: OwnedFd) -> Result<()> {
    nix::unistd::close(fd.into_raw_fd()).map_err(|errno| FifoError::close(stream, errno.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn copy_stream_preserves_order() {
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut src: &[u8] = &payload;
        let mut dst: Vec<u8> = Vec::new();
        let cancel = CancellationToken::new();

        let copied = copy_stream(Stream::Stdout, &mut src, &mut dst, &cancel).await.unwrap();
        assert_eq!(copied, payload.len() as u64);
        assert_eq!(dst, payload);
    }

    #[tokio::test]
    async fn copy_stream_stops_on_cancel() {
        // 读端永远不会 EOF
        let (_keep, mut src) = duplex(64);
        let mut dst: Vec<u8> = Vec::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let copied = copy_stream(Stream::Stdin, &mut src, &mut dst, &cancel).await.unwrap();
        assert_eq!(copied, 0);
    }
}
