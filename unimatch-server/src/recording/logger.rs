//! JSONL sink for recorded traffic.
//!
//! The file is opened up front so a bad path fails at startup. Events go
//! through a bounded queue to a writer task; when the writer falls behind,
//! new events are dropped and counted rather than blocking request handling.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

use super::RecordedEvent;

/// Events buffered between request handlers and the writer.
const QUEUE_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct RecordingLogger {
    queue: mpsc::Sender<RecordedEvent>,
    dropped: Arc<AtomicU64>,
}

impl RecordingLogger {
    /// Open (or create) the log file and start the writer task.
    /// Must be called inside a tokio runtime.
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open recording file {}", path.display()))?;

        let (queue, events) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(write_events(BufWriter::new(File::from_std(file)), events));

        Ok(Self {
            queue,
            dropped: Arc::default(),
        })
    }

    /// Queue an event without waiting.
    pub fn record(&self, event: RecordedEvent) {
        match self.queue.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    warn!("Recording queue full; {} events dropped so far", dropped);
                }
            }
            Err(TrySendError::Closed(_)) => {
                error!("Recording writer has stopped; event discarded");
            }
        }
    }

    /// Events discarded because the writer could not keep up.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Write whatever is queued, then flush once per batch.
async fn write_events(mut out: BufWriter<File>, mut events: mpsc::Receiver<RecordedEvent>) {
    while let Some(first) = events.recv().await {
        let mut batch = vec![first];
        while let Ok(event) = events.try_recv() {
            batch.push(event);
        }

        for event in &batch {
            match serde_json::to_vec(event) {
                Ok(mut line) => {
                    line.push(b'\n');
                    if let Err(e) = out.write_all(&line).await {
                        error!("Failed to write recorded event: {}", e);
                    }
                }
                Err(e) => error!("Failed to serialize recorded event: {}", e),
            }
        }
        if let Err(e) = out.flush().await {
            error!("Failed to flush recording file: {}", e);
        }
    }
    debug!("Recording writer stopped");
}
