//! Growing-file chunk source
//!
//! Follows a WebM file while an external encoder appends to it, and feeds
//! the bytes into the shared chunk buffer, one chunk per Cluster. Runs in
//! its own thread so the encoder's cadence never depends on the network.

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::buffer::{ClusterSplitter, Piece, SharedChunkBuffer};
use crate::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_READ_SIZE};
use crate::control::{Component, ComponentState, Configure, Lifecycle};
use crate::error::{BufferError, SourceError};

/// File source configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// WebM file written by the encoder
    pub path: PathBuf,

    /// Maximum bytes read per read call
    pub read_size: usize,

    /// Delay between checks for new data
    pub poll_interval_ms: u64,

    /// Split chunks at WebM Cluster boundaries. When disabled every read
    /// becomes its own chunk.
    pub split_clusters: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            read_size: DEFAULT_READ_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            split_clusters: true,
        }
    }
}

impl SourceSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Producer feeding a [`crate::buffer::ChunkBuffer`] from a growing file
pub struct FileChunkSource {
    lifecycle: Lifecycle,
    settings: Option<SourceSettings>,
    output_buffer: SharedChunkBuffer,
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    error_rx: Option<Receiver<SourceError>>,
    bytes_read: Arc<AtomicU64>,
    chunks_written: Arc<AtomicU64>,
    start_time: Option<Instant>,
    /// Duration frozen at stop
    final_duration: Option<Duration>,
}

impl FileChunkSource {
    pub fn new(output_buffer: SharedChunkBuffer) -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            settings: None,
            output_buffer,
            running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            error_rx: None,
            bytes_read: Arc::new(AtomicU64::new(0)),
            chunks_written: Arc::new(AtomicU64::new(0)),
            start_time: None,
            final_duration: None,
        }
    }

    pub fn init(&mut self, settings: SourceSettings) -> Result<(), SourceError> {
        self.lifecycle.check_init()?;

        if settings.path.as_os_str().is_empty() {
            return Err(SourceError::InvalidArgument("source path is empty".into()));
        }
        if settings.read_size == 0 {
            return Err(SourceError::InvalidArgument(
                "read size must be greater than zero".into(),
            ));
        }
        if settings.poll_interval_ms == 0 {
            return Err(SourceError::InvalidArgument(
                "poll interval must be greater than zero".into(),
            ));
        }

        self.settings = Some(settings);
        self.lifecycle.initialized();
        Ok(())
    }

    /// Start following the file
    pub fn run(&mut self) -> Result<(), SourceError> {
        self.lifecycle.check_run()?;
        let settings = self.settings.clone().ok_or(SourceError::NotInitialized)?;

        let (error_tx, error_rx) = bounded::<SourceError>(16);
        self.error_rx = Some(error_rx);

        let worker = SourceWorker {
            splitter: settings.split_clusters.then(ClusterSplitter::new),
            read_buf: vec![0u8; settings.read_size],
            settings,
            buffer: self.output_buffer.clone(),
            running: self.running.clone(),
            bytes_read: self.bytes_read.clone(),
            chunks_written: self.chunks_written.clone(),
            errors: error_tx,
            backlog: VecDeque::new(),
        };

        self.running.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("file-source".into())
            .spawn(move || worker.run())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                SourceError::Spawn(e.to_string())
            })?;

        self.thread_handle = Some(handle);
        self.start_time = Some(Instant::now());
        self.lifecycle.started();
        Ok(())
    }

    /// Stop the worker, flushing the trailing partial chunk
    pub fn stop(&mut self) -> Result<(), SourceError> {
        if !self.lifecycle.stop() {
            return Ok(());
        }

        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                tracing::error!("File source worker panicked");
            }
        }
        self.final_duration = self.start_time.map(|start| start.elapsed());
        Ok(())
    }

    /// Whether the worker is alive
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ComponentState {
        self.lifecycle.state()
    }

    /// Total bytes read from the file
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Chunks completed into the buffer
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written.load(Ordering::Relaxed)
    }

    /// Time spent streaming
    pub fn duration(&self) -> Duration {
        match (self.final_duration, self.start_time) {
            (Some(duration), _) => duration,
            (None, Some(start)) => start.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }

    /// Check for errors reported by the worker
    pub fn check_errors(&self) -> Option<SourceError> {
        self.error_rx.as_ref().and_then(|rx| rx.try_recv().ok())
    }
}

impl Drop for FileChunkSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl Configure for FileChunkSource {
    type Config = SourceSettings;

    fn init(&mut self, config: SourceSettings) -> crate::Result<()> {
        Ok(FileChunkSource::init(self, config)?)
    }
}

impl Component for FileChunkSource {
    fn name(&self) -> &'static str {
        "file source"
    }

    fn state(&self) -> ComponentState {
        self.lifecycle.state()
    }

    fn run(&mut self) -> crate::Result<()> {
        Ok(FileChunkSource::run(self)?)
    }

    fn stop(&mut self) -> crate::Result<()> {
        Ok(FileChunkSource::stop(self)?)
    }
}

struct SourceWorker {
    settings: SourceSettings,
    buffer: SharedChunkBuffer,
    running: Arc<AtomicBool>,
    bytes_read: Arc<AtomicU64>,
    chunks_written: Arc<AtomicU64>,
    errors: Sender<SourceError>,
    splitter: Option<ClusterSplitter>,
    /// Pieces not yet accepted by the buffer, in stream order
    backlog: VecDeque<Piece>,
    read_buf: Vec<u8>,
}

impl SourceWorker {
    fn run(mut self) {
        let Some(mut file) = self.open() else {
            return;
        };
        tracing::info!("Following {}", self.settings.path.display());

        let poll_interval = self.settings.poll_interval();
        while self.running.load(Ordering::Relaxed) {
            if let Err(e) = self.pump(&mut file) {
                tracing::error!("File source failed: {}", e);
                let _ = self.errors.try_send(e);
                self.running.store(false, Ordering::SeqCst);
                return;
            }
            thread::sleep(poll_interval);
        }

        self.finish(&mut file);
    }

    /// Wait for the encoder to create the file
    fn open(&self) -> Option<File> {
        let mut logged = false;
        loop {
            match File::open(&self.settings.path) {
                Ok(file) => return Some(file),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if !logged {
                        tracing::info!("Waiting for {}", self.settings.path.display());
                        logged = true;
                    }
                }
                Err(e) => {
                    tracing::error!("Cannot open {}: {}", self.settings.path.display(), e);
                    let _ = self.errors.try_send(e.into());
                    self.running.store(false, Ordering::SeqCst);
                    return None;
                }
            }
            if !self.running.load(Ordering::Relaxed) {
                return None;
            }
            thread::sleep(self.settings.poll_interval());
        }
    }

    /// Read what the encoder appended since the last tick
    fn pump(&mut self, file: &mut File) -> Result<(), SourceError> {
        self.drain_backlog()?;

        while self.backlog.is_empty() {
            let n = file.read(&mut self.read_buf)?;
            if n == 0 {
                break;
            }
            self.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
            self.split(n);
            self.drain_backlog()?;
        }
        Ok(())
    }

    fn split(&mut self, n: usize) {
        let data = &self.read_buf[..n];
        match self.splitter.as_mut() {
            Some(splitter) => self.backlog.extend(splitter.feed(data)),
            None => {
                self.backlog.push_back(Piece::Data(Bytes::copy_from_slice(data)));
                self.backlog.push_back(Piece::Boundary);
            }
        }
    }

    /// Move backlog pieces into the buffer until it is empty or the buffer
    /// is full. Nothing is dropped on a full buffer; it is retried next tick.
    fn drain_backlog(&mut self) -> Result<(), SourceError> {
        while let Some(piece) = self.backlog.front() {
            match piece {
                Piece::Boundary => {
                    if let Some(sequence) = self.buffer.finish_chunk() {
                        self.chunks_written.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!("chunk {} ready", sequence);
                    }
                }
                Piece::Data(data) => match self.buffer.write(data) {
                    Ok(()) => {}
                    Err(BufferError::BufferFull { .. }) => return Ok(()),
                    Err(BufferError::ChunkTooLarge { capacity, .. }) => {
                        return Err(SourceError::ChunkTooLarge { capacity });
                    }
                    Err(e) => return Err(e.into()),
                },
            }
            self.backlog.pop_front();
        }
        Ok(())
    }

    /// Flush everything still held once stop was requested
    fn finish(&mut self, file: &mut File) {
        if let Err(e) = self.pump(file) {
            tracing::warn!("Final read failed: {}", e);
        }
        if let Some(rest) = self.splitter.as_mut().and_then(ClusterSplitter::finish) {
            self.backlog.push_back(Piece::Data(rest));
        }
        self.backlog.push_back(Piece::Boundary);

        if let Err(e) = self.drain_backlog() {
            tracing::warn!("Final flush failed: {}", e);
        }
        let unflushed: usize = self
            .backlog
            .iter()
            .map(|piece| match piece {
                Piece::Data(data) => data.len(),
                Piece::Boundary => 0,
            })
            .sum();
        if unflushed > 0 {
            tracing::warn!("Dropping {} bytes that did not fit in the chunk buffer", unflushed);
        }
    }
}
