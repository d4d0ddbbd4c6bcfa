//! Core library for attaching process stdio through named pipes: fifo sets, the attach engine, and its handle.

mod attach;
mod error;
mod fifo;
mod models;

pub use attach::{
    attach, with_fifo_dir, with_stdio, with_streams, with_terminal, Attachment, Creator,
    DirectIo, Sink, Source, Streams,
};
pub use error::{FifoError, Result};
pub use fifo::FifoSet;
pub use models::{AttachState, Config, Stream};
