//! Chunked, time-bounded output buffer
//!
//! Groups processed messages into acknowledgement batches: the handler
//! fires when a chunk fills or the flush timeout elapses since the chunk's
//! first message. Publishing, retry and the cumulative ack happen inside
//! the product's chunk handler; this type only does the batching.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{DispatcherError, Result};
use crate::message::Message;

/// Receives each flushed batch
pub type ChunkHandler =
    Arc<dyn Fn(Vec<Box<Message>>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Buffer sizing and flush bound
#[derive(Debug, Clone, Copy)]
pub struct OutputBufferConfig {
    /// Messages per acknowledgement batch
    pub chunk_size: usize,

    /// Chunks worth of backlog the buffer absorbs before push blocks
    pub chunk_count: usize,

    /// Flush deadline counted from a chunk's first message
    pub timeout: Duration,
}

impl Default for OutputBufferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            chunk_count: 1000,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Chunked buffer in front of the publisher
pub struct OutputBuffer {
    tx: parking_lot::Mutex<Option<mpsc::Sender<Box<Message>>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl OutputBuffer {
    /// Create the buffer and start its flush loop
    pub fn new(config: OutputBufferConfig, handler: ChunkHandler) -> Self {
        let chunk_size = config.chunk_size.max(1);
        let capacity = chunk_size.saturating_mul(config.chunk_count.max(1));
        let (tx, rx) = mpsc::channel(capacity);

        let task = tokio::spawn(flush_loop(rx, chunk_size, config.timeout, handler));

        Self {
            tx: parking_lot::Mutex::new(Some(tx)),
            task: tokio::sync::Mutex::new(Some(task)),
        }
    }

    /// Enqueue a message; blocks while the buffer is full
    pub async fn push(&self, msg: Box<Message>) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .clone()
            .ok_or(DispatcherError::BufferClosed)?;

        tx.send(msg).await.map_err(|_| DispatcherError::BufferClosed)
    }

    /// Flush what is buffered and stop the loop
    pub async fn close(&self) {
        drop(self.tx.lock().take());
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

async fn flush_loop(
    mut rx: mpsc::Receiver<Box<Message>>,
    chunk_size: usize,
    timeout: Duration,
    handler: ChunkHandler,
) {
    loop {
        // A chunk opens with its first message; the flush timer runs from
        // here, not from the last push
        let Some(first) = rx.recv().await else {
            break;
        };

        let mut chunk = Vec::with_capacity(chunk_size);
        chunk.push(first);
        let mut closed = false;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        while chunk.len() < chunk_size {
            tokio::select! {
                _ = &mut deadline => break,
                msg = rx.recv() => match msg {
                    Some(msg) => chunk.push(msg),
                    None => {
                        closed = true;
                        break;
                    }
                }
            }
        }

        handler(chunk).await;

        if closed {
            break;
        }
    }
}

#[cfg(test)]
#[path = "output_buffer_test.rs"]
mod output_buffer_test;
