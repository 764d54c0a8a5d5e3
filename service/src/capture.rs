//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Append-only capture log
//!
//! Sessions submit [`CaptureRecord`]s through cheap, cloneable
//! [`CaptureLog`] handles. A single writer task drains the queue into a
//! [`CaptureSink`], so records never interleave and each session's records
//! keep their submission order. Submitting never blocks and never fails the
//! session; write failures are logged and counted.
//!
//! ```no_run
//! use decoy_service::{CaptureLog, WriterSink};
//!
//! # async fn example() -> std::io::Result<()> {
//! let sink = WriterSink::append_file("capture.log").await?;
//! let (log, writer) = CaptureLog::spawn(sink);
//! // hand `log.clone()` to listeners ...
//! log.close();
//! let summary = writer.finish().await;
//! println!("{} records written", summary.records_written);
//! # Ok(())
//! # }
//! ```

use crate::types::CaptureRecord;
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Destination for capture records
#[async_trait]
pub trait CaptureSink: Send + 'static {
    /// Persist one record
    async fn write_record(&mut self, record: &CaptureRecord) -> io::Result<()>;

    /// Flush anything buffered
    async fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes one text line per record to an [`AsyncWrite`]
#[derive(Debug)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<tokio::fs::File> {
    /// Open `path` for appending, creating it if needed
    pub async fn append_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self::new(file))
    }
}

impl WriterSink<tokio::io::Stdout> {
    /// Write records to standard output
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> CaptureSink for WriterSink<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn write_record(&mut self, record: &CaptureRecord) -> io::Result<()> {
        let line = format!("{record}\n");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

/// Keeps records in a shared vector
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<CaptureRecord>>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record written so far
    pub fn records(&self) -> Vec<CaptureRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of records written so far
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CaptureSink for MemorySink {
    async fn write_record(&mut self, record: &CaptureRecord) -> io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
struct CaptureStats {
    submitted: AtomicU64,
    written: AtomicU64,
    failures: AtomicU64,
}

impl CaptureStats {
    fn summary(&self) -> CaptureSummary {
        CaptureSummary {
            records_submitted: self.submitted.load(Ordering::Relaxed),
            records_written: self.written.load(Ordering::Relaxed),
            write_failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Handle for submitting capture records
#[derive(Debug, Clone)]
pub struct CaptureLog {
    sender: mpsc::UnboundedSender<CaptureRecord>,
    closing: CancellationToken,
    stats: Arc<CaptureStats>,
}

impl CaptureLog {
    /// Start a writer task draining into `sink`
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S: CaptureSink>(sink: S) -> (CaptureLog, CaptureWriter) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let closing = CancellationToken::new();
        let stats = Arc::new(CaptureStats::default());
        let handle = tokio::spawn(write_loop(sink, receiver, closing.clone(), stats.clone()));
        let log = CaptureLog {
            sender,
            closing: closing.clone(),
            stats: stats.clone(),
        };
        (
            log,
            CaptureWriter {
                handle,
                closing,
                stats,
            },
        )
    }

    /// Queue a record for writing
    pub fn record(&self, record: CaptureRecord) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        if let Err(mpsc::error::SendError(record)) = self.sender.send(record) {
            self.stats.failures.fetch_add(1, Ordering::Relaxed);
            error!(
                connection_id = %record.connection,
                "Capture log closed, dropping record: {record}"
            );
        }
    }

    /// Stop accepting records; those already queued are still written
    pub fn close(&self) {
        self.closing.cancel();
    }

    /// Whether [`close()`](CaptureLog::close) has been called
    pub fn is_closed(&self) -> bool {
        self.closing.is_cancelled()
    }

    /// Records written so far
    pub fn records_written(&self) -> u64 {
        self.stats.written.load(Ordering::Relaxed)
    }

    /// Records that could not be written
    pub fn write_failures(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }

    /// Current counters
    pub fn summary(&self) -> CaptureSummary {
        self.stats.summary()
    }
}

/// Owner of the writer task
#[derive(Debug)]
pub struct CaptureWriter {
    handle: JoinHandle<()>,
    closing: CancellationToken,
    stats: Arc<CaptureStats>,
}

impl CaptureWriter {
    /// Close the log, drain the queue and flush the sink
    pub async fn finish(self) -> CaptureSummary {
        self.closing.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Capture writer task failed");
        }
        self.stats.summary()
    }
}

/// Capture log counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureSummary {
    /// Records handed to the log
    pub records_submitted: u64,
    /// Records persisted by the sink
    pub records_written: u64,
    /// Records lost to sink errors or a closed log
    pub write_failures: u64,
}

async fn write_loop<S: CaptureSink>(
    mut sink: S,
    mut receiver: mpsc::UnboundedReceiver<CaptureRecord>,
    closing: CancellationToken,
    stats: Arc<CaptureStats>,
) {
    let mut draining = false;
    loop {
        let record = tokio::select! {
            biased;
            record = receiver.recv() => record,
            () = closing.cancelled(), if !draining => {
                draining = true;
                receiver.close();
                continue;
            }
        };
        let Some(record) = record else {
            break;
        };
        match sink.write_record(&record).await {
            Ok(()) => {
                stats.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    error = %e,
                    connection_id = %record.connection,
                    "Failed to write capture record: {record}"
                );
            }
        }
    }
    if let Err(e) = sink.flush().await {
        error!(error = %e, "Failed to flush capture sink");
    }
    debug!("Capture writer finished");
}
