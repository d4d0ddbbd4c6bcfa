use std::fmt;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

/// 进程输入的来源（由调用方持有）。
pub type Source = Box<dyn AsyncRead + Send + Unpin>;
/// 进程输出的去向（由调用方持有）。
pub type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// 调用方提供的三个端点，外加 `Creator` 使用的 fifo 目录与终端标记。
///
/// attach 只会 flush sink，从不 shutdown；方向结束后端点通过
/// `Attachment::take_streams` 交还给调用方。
#[derive(Default)]
pub struct Streams {
    pub stdin: Option<Source>,
    pub stdout: Option<Sink>,
    pub stderr: Option<Sink>,
    pub terminal: bool,
    pub fifo_dir: Option<PathBuf>,
}

impl Streams {
    /// 没有任何端点，attach 后不会启动任务。
    pub fn is_empty(&self) -> bool {
        self.stdin.is_none() && self.stdout.is_none() && self.stderr.is_none()
    }
}

impl fmt::Debug for Streams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Streams")
            .field("stdin", &self.stdin.is_some())
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .field("terminal", &self.terminal)
            .field("fifo_dir", &self.fifo_dir)
            .finish()
    }
}

/// 使用给定端点；`None` 表示该方向不转发。
pub fn with_streams(
    stdin: Option<Source>,
    stdout: Option<Sink>,
    stderr: Option<Sink>,
) -> impl FnOnce(&mut Streams) + Send {
    move |streams: &mut Streams| {
        streams.stdin = stdin;
        streams.stdout = stdout;
        streams.stderr = stderr;
    }
}

/// 转发当前进程自己的 stdin/stdout/stderr。
pub fn with_stdio() -> impl FnOnce(&mut Streams) + Send {
    |streams: &mut Streams| {
        streams.stdin = Some(Box::new(tokio::io::stdin()));
        streams.stdout = Some(Box::new(tokio::io::stdout()));
        streams.stderr = Some(Box::new(tokio::io::stderr()));
    }
}

pub fn with_terminal() -> impl FnOnce(&mut Streams) + Send {
    |streams: &mut Streams| streams.terminal = true
}

/// fifo 的私有目录建在 `dir` 下（`dir` 本身不归 fifo 集合所有）。
pub fn with_fifo_dir(dir: impl Into<PathBuf>) -> impl FnOnce(&mut Streams) + Send + 'static {
    let dir = dir.into();
    move |streams: &mut Streams| streams.fifo_dir = Some(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fill_streams() {
        let mut streams = Streams::default();
        assert!(streams.is_empty());

        with_terminal()(&mut streams);
        with_fifo_dir("/run/pipes")(&mut streams);
        with_streams(None, Some(Box::new(Vec::<u8>::new())), None)(&mut streams);

        assert!(streams.terminal);
        assert_eq!(streams.fifo_dir, Some(PathBuf::from("/run/pipes")));
        assert!(streams.stdin.is_none());
        assert!(streams.stdout.is_some());
        assert!(!streams.is_empty());
        assert!(format!("{:?}", streams).contains("stdout: true"));
    }
}
