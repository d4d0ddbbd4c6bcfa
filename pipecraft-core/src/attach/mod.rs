//! attach：把 fifo 集合的三个管道接到调用方提供的端点上，并通过 `Attachment` 控制等待、取消与关闭。

use crate::error::{FifoError, Result};
use crate::fifo::FifoSet;
use crate::models::{AttachState, Config, Stream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

mod copy;
mod creator;
mod direct;
mod open;
mod streams;

use copy::{Endpoint, Finished};

pub use creator::Creator;
pub use direct::DirectIo;
pub use streams::{with_fifo_dir, with_stdio, with_streams, with_terminal, Sink, Source, Streams};

/// 把 `set` 的 fifo 接到 `configure` 填充的端点上。
///
/// `configure` 在打开任何管道之前同步调用且只调用一次。每个存在的端点对应一个后台任务，
/// 打开与拷贝都不阻塞调用方。
///
/// 句柄与方向任务各持有 `set` 的一份引用：调用方先丢掉 `set` 时，fifo 文件保留到最后一个
/// 持有者释放为止。`Attachment::close` 不删除文件；显式调用 `set.close()` 之前应先 close 句柄。
#[instrument(skip_all, fields(stdin = %set.path(Stream::Stdin).display()))]
pub fn attach(set: &FifoSet, configure: impl FnOnce(&mut Streams)) -> Result<Attachment> {
    let mut streams = Streams::default();
    configure(&mut streams);
    Attachment::spawn(set.share(), streams, false)
}

/// 各方向的进度计数，用于推导 `AttachState`。
#[derive(Debug, Default)]
pub(super) struct Progress {
    opening: AtomicUsize,
    copying: AtomicUsize,
    finished: AtomicUsize,
}

/// 单个方向的结果槽位；各方向互不覆盖，只在 wait / close 时汇总。
enum Slot {
    Idle,
    Pending(JoinHandle<Finished>),
    Done {
        result: Result<()>,
        release: Result<()>,
    },
}

struct Slots {
    slots: [Slot; 3],
    returned: Streams,
}

impl Slots {
    /// 等待该方向任务结束并记录结果；可被中途取消（句柄留在槽位里）。
    async fn settle(&mut self, stream: Stream) {
        let slot = &mut self.slots[stream.index()];
        let Slot::Pending(handle) = slot else {
            return;
        };
        let (result, release) = match handle.await {
            Ok(Finished {
                result,
                release,
                endpoint,
            }) => {
                match endpoint {
                    Endpoint::Source(source) => self.returned.stdin = Some(source),
                    Endpoint::Sink(sink) if stream == Stream::Stdout => {
                        self.returned.stdout = Some(sink)
                    }
                    Endpoint::Sink(sink) => self.returned.stderr = Some(sink),
                }
                (result.map(|_| ()), release)
            }
            Err(e) => (Err(FifoError::Task(stream, e.to_string())), Ok(())),
        };
        *slot = Slot::Done { result, release };
    }
}

/// 一次 attach 的句柄。
///
/// 状态：`Created → Opening → Running → Draining → Closed`，只有 `close` 能进入 `Closed`。
pub struct Attachment {
    config: Config,
    cancel: CancellationToken,
    progress: Arc<Progress>,
    tasks: Mutex<Slots>,
    closed: AtomicBool,
    set: Option<FifoSet>,
    /// Creator 自建的集合：close 时一并删除
    owns_set: bool,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Attachment {
    /// 为每个存在的端点启动一个方向任务。
    pub(super) fn spawn(set: FifoSet, mut streams: Streams, owns_set: bool) -> Result<Self> {
        let config = set.config().clone();
        let cancel = CancellationToken::new();
        let progress = Arc::new(Progress::default());
        let mut slots = [Slot::Idle, Slot::Idle, Slot::Idle];

        let endpoints = [
            streams.stdin.take().map(Endpoint::Source),
            streams.stdout.take().map(Endpoint::Sink),
            streams.stderr.take().map(Endpoint::Sink),
        ];
        if endpoints.iter().any(Option::is_some) {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| FifoError::NoRuntime(e.to_string()))?;
            for (stream, endpoint) in Stream::ALL.into_iter().zip(endpoints) {
                let Some(endpoint) = endpoint else {
                    continue;
                };
                progress.opening.fetch_add(1, Ordering::AcqRel);
                let handle = runtime.spawn(copy::run_direction(
                    stream,
                    config.path(stream).clone(),
                    endpoint,
                    cancel.clone(),
                    progress.clone(),
                    set.share(),
                ));
                slots[stream.index()] = Slot::Pending(handle);
            }
        }
        tracing::debug!(
            tasks = progress.opening.load(Ordering::Acquire),
            "attachment started"
        );

        Ok(Self {
            config,
            cancel,
            progress,
            tasks: Mutex::new(Slots { slots, returned: streams }),
            closed: AtomicBool::new(false),
            set: Some(set),
            owns_set,
        })
    }

    /// 不转发任何流、config 为空的句柄。
    pub fn null() -> Self {
        Self::idle(Config::default())
    }

    /// 进程直接把 stdout/stderr 写到 `path`，不需要 fifo 也不需要拷贝任务。
    pub fn log_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::idle(Config {
            stdin: PathBuf::new(),
            stdout: path.clone(),
            stderr: path,
            terminal: false,
        })
    }

    fn idle(config: Config) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            progress: Arc::new(Progress::default()),
            tasks: Mutex::new(Slots {
                slots: [Slot::Idle, Slot::Idle, Slot::Idle],
                returned: Streams::default(),
            }),
            closed: AtomicBool::new(false),
            set: None,
            owns_set: false,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> AttachState {
        if self.closed.load(Ordering::Acquire) {
            return AttachState::Closed;
        }
        if self.cancel.is_cancelled() || self.progress.finished.load(Ordering::Acquire) > 0 {
            return AttachState::Draining;
        }
        if self.progress.opening.load(Ordering::Acquire) > 0 {
            return AttachState::Opening;
        }
        if self.progress.copying.load(Ordering::Acquire) > 0 {
            return AttachState::Running;
        }
        AttachState::Created
    }

    /// 等待所有已启动的方向结束（包括 stdin），不取消任何东西。
    ///
    /// 返回各方向记录的打开/拷贝错误；重复调用返回相同结果。
    pub async fn wait(&self) -> Result<()> {
        self.join(&Stream::ALL).await
    }

    /// 只等 stdout/stderr：进程退出后先排空输出，再 cancel 掉还在等输入的 stdin。
    pub async fn wait_output(&self) -> Result<()> {
        self.join(&[Stream::Stdout, Stream::Stderr]).await
    }

    async fn join(&self, streams: &[Stream]) -> Result<()> {
        let mut tasks = self.tasks.lock().await;
        let mut errors = Vec::new();
        for &stream in streams {
            tasks.settle(stream).await;
            if let Slot::Done { result: Err(e), .. } = &tasks.slots[stream.index()] {
                errors.push(e.clone());
            }
        }
        FifoError::aggregate(errors)
    }

    /// 通知所有打开和拷贝尽快停止；幂等。
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("attachment cancelled");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 停止全部方向、等待任务结束并释放进程一侧的 fifo 描述符。
    ///
    /// 返回描述符释放失败的汇总；第二次及以后的调用不做任何事。
    /// 只有 Creator 创建的句柄会在这里删除 fifo 文件。
    pub async fn close(&self) -> Result<()> {
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        for stream in Stream::ALL {
            tasks.settle(stream).await;
        }
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut errors: Vec<FifoError> = tasks
            .slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Done { release: Err(e), .. } => Some(e.clone()),
                _ => None,
            })
            .collect();
        if let Some(set) = self.set.as_ref().filter(|_| self.owns_set) {
            if let Err(e) = set.close() {
                errors.push(e);
            }
        }
        tracing::debug!(errors = errors.len(), "attachment closed");
        FifoError::aggregate(errors)
    }

    /// 取回已经结束的方向的端点。
    pub async fn take_streams(&self) -> Streams {
        std::mem::take(&mut self.tasks.lock().await.returned)
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        // 没有 close 就丢弃：让后台任务自行收尾，fifo 集合（若自有）随最后一个任务释放
        if !self.closed.load(Ordering::Acquire) {
            self.cancel.cancel();
        }
    }
}
