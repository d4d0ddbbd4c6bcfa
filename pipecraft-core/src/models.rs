use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One of the three standard streams of the supervised process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl Stream {
    pub const ALL: [Stream; 3] = [Stream::Stdin, Stream::Stdout, Stream::Stderr];

    pub fn as_str(self) -> &'static str {
        match self {
            Stream::Stdin => "stdin",
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }

    /// 槽位下标，与 `ALL` 的顺序一致。
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// 进程一侧是否以只读方式打开该 fifo（stdout/stderr 由我们读取）。
    pub(crate) fn reads_fifo(self) -> bool {
        !matches!(self, Stream::Stdin)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the three pipes live. Read-only view for launchers that bind the other side.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub stdin: PathBuf,
    pub stdout: PathBuf,
    pub stderr: PathBuf,
    #[serde(default)]
    pub terminal: bool,
}

impl Config {
    /// `<dir>/<id>-stdin` 等三个路径，不触碰文件系统。
    pub fn new(dir: impl AsRef<Path>, id: &str, terminal: bool) -> Self {
        let dir = dir.as_ref();
        let path = |stream: Stream| dir.join(format!("{}-{}", id, stream));
        Self {
            stdin: path(Stream::Stdin),
            stdout: path(Stream::Stdout),
            stderr: path(Stream::Stderr),
            terminal,
        }
    }

    /// 空路径表示该流没有对应的 fifo。
    pub fn path(&self, stream: Stream) -> &PathBuf {
        match stream {
            Stream::Stdin => &self.stdin,
            Stream::Stdout => &self.stdout,
            Stream::Stderr => &self.stderr,
        }
    }
}

/// Attachment lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttachState {
    Created,
    Opening,
    Running,
    Draining,
    Closed,
}
