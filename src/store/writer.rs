//! Non-blocking writes with a guaranteed drain on shutdown.
//!
//! Callers enqueue operations and continue immediately. A single writer thread
//! applies them in FIFO order. Failures are abandoned (never retried), logged
//! and published on a failure channel. Dropping or shutting down the writer
//! waits until every queued operation has completed or failed.

use super::{LogStore, StoreError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug)]
enum WriteOp {
    Append { name: String, content: String },
    Overwrite { name: String, content: String },
    Move { from: String, to: String },
}

impl WriteOp {
    fn apply(&self, store: &LogStore) -> Result<(), StoreError> {
        match self {
            WriteOp::Append { name, content } => store.append(name, content),
            WriteOp::Overwrite { name, content } => store.overwrite(name, content),
            WriteOp::Move { from, to } => store.move_file(from, to),
        }
    }
}

/// Outcome of a writer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterReport {
    pub completed: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    pending: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Background writer for a [`LogStore`].
pub struct AsyncWriter {
    sender: Option<Sender<WriteOp>>,
    failure_tx: Sender<StoreError>,
    failure_rx: Receiver<StoreError>,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl AsyncWriter {
    /// Start the writer thread.
    pub fn spawn(store: LogStore) -> Self {
        let (sender, receiver) = unbounded::<WriteOp>();
        let (failure_tx, failure_rx) = unbounded::<StoreError>();
        let counters = Arc::new(Counters::default());

        let thread_counters = counters.clone();
        let thread_failures = failure_tx.clone();
        let handle = thread::spawn(move || {
            // Ends once every sender is dropped and the queue is empty
            for op in receiver {
                match op.apply(&store) {
                    Ok(()) => {
                        thread_counters.completed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "write abandoned");
                        thread_counters.failed.fetch_add(1, Ordering::Relaxed);
                        let _ = thread_failures.send(e);
                    }
                }
                thread_counters.pending.fetch_sub(1, Ordering::SeqCst);
            }
        });

        Self {
            sender: Some(sender),
            failure_tx,
            failure_rx,
            counters,
            handle: Some(handle),
        }
    }

    /// Queue an append.
    pub fn append(&self, name: impl Into<String>, content: impl Into<String>) {
        self.submit(WriteOp::Append {
            name: name.into(),
            content: content.into(),
        });
    }

    /// Queue a full replacement of a file.
    pub fn overwrite(&self, name: impl Into<String>, content: impl Into<String>) {
        self.submit(WriteOp::Overwrite {
            name: name.into(),
            content: content.into(),
        });
    }

    /// Queue a rename. Ordered after every previously queued write.
    pub fn move_file(&self, from: impl Into<String>, to: impl Into<String>) {
        self.submit(WriteOp::Move {
            from: from.into(),
            to: to.into(),
        });
    }

    /// Operations queued or in flight.
    pub fn pending(&self) -> usize {
        self.counters.pending.load(Ordering::SeqCst)
    }

    /// Failures reported so far. Each failure is delivered once.
    pub fn failures(&self) -> &Receiver<StoreError> {
        &self.failure_rx
    }

    /// Wait for every queued operation, then stop the thread.
    pub fn shutdown(mut self) -> WriterReport {
        self.drain();
        self.report()
    }

    fn report(&self) -> WriterReport {
        WriterReport {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    fn submit(&self, op: WriteOp) {
        let Some(sender) = &self.sender else {
            return;
        };
        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = sender.send(op) {
            // Writer thread is gone; report instead of losing silently
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            let name = match &e.0 {
                WriteOp::Append { name, .. } | WriteOp::Overwrite { name, .. } => name.clone(),
                WriteOp::Move { from, .. } => from.clone(),
            };
            tracing::error!(name = %name, "writer thread unavailable; write abandoned");
            let _ = self.failure_tx.send(StoreError::Io {
                name,
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "writer stopped"),
            });
        }
    }

    fn drain(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("writer thread panicked; queued writes may be lost");
            }
        }
    }
}

impl Drop for AsyncWriter {
    fn drop(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shutdown_drains_queue() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        let writer = AsyncWriter::spawn(store.clone());

        for i in 0..200 {
            writer.append("active/k.jsonl", format!("{i}\n"));
        }
        let report = writer.shutdown();

        assert_eq!(report.completed, 200);
        assert_eq!(report.failed, 0);
        let content = store.read_all("active/k.jsonl");
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 200);
        // FIFO
        assert_eq!(lines[0], "0");
        assert_eq!(lines[199], "199");
    }

    #[test]
    fn test_failures_are_reported() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        let writer = AsyncWriter::spawn(store);

        writer.move_file("active/missing.jsonl", "pending/missing.jsonl");
        writer.append("ok.txt", "fine");
        let failures = writer.failures().clone();
        let report = writer.shutdown();

        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert!(matches!(failures.try_recv(), Ok(StoreError::NotFound(_))));
    }

    #[test]
    fn test_move_ordered_after_appends() {
        let dir = TempDir::new().unwrap();
        let store = LogStore::open(dir.path()).unwrap();
        let writer = AsyncWriter::spawn(store.clone());

        writer.append("active/s.jsonl", "a\n");
        writer.append("active/s.jsonl", "b\n");
        writer.move_file("active/s.jsonl", "pending/s.jsonl");
        drop(writer);

        assert!(!store.exists("active/s.jsonl"));
        assert_eq!(store.read_all("pending/s.jsonl"), "a\nb\n");
    }
}
