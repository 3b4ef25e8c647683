//! HTTP chunk uploader
//!
//! Owns a background worker that uploads one chunk at a time. The worker is
//! a dedicated thread driving a current-thread tokio runtime, so network
//! I/O never runs on the caller's thread and `stop` can cancel a transfer
//! mid-flight.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::control::{Component, ComponentState, Configure, Lifecycle};
use crate::error::UploadError;
use crate::progress::ProgressReporter;
use crate::upload::settings::{UploadTarget, UploaderSettings};
use crate::upload::stats::{StatsTracker, TransferProgress, UploadStats};
use crate::upload::transport::{ChunkTransport, HttpTransport};

/// A chunk handed to the worker
struct UploadJob {
    id: u64,
    data: Bytes,
}

/// Chunk uploader with an Init/Run/Stop lifecycle
pub struct HttpUploader {
    lifecycle: Lifecycle,

    /// Resolved target, set by `init`
    target: Option<UploadTarget>,

    /// Transport override; the HTTP transport is built in `run` otherwise
    transport: Option<Arc<dyn ChunkTransport>>,

    stats: Arc<StatsTracker>,

    /// True while the worker can accept the next chunk
    idle: Arc<AtomicBool>,

    jobs: Option<mpsc::UnboundedSender<UploadJob>>,

    cancel: CancellationToken,

    worker: Option<JoinHandle<()>>,

    next_job: AtomicU64,
}

impl HttpUploader {
    pub fn new() -> Self {
        Self {
            lifecycle: Lifecycle::new(),
            target: None,
            transport: None,
            stats: Arc::new(StatsTracker::new()),
            idle: Arc::new(AtomicBool::new(false)),
            jobs: None,
            cancel: CancellationToken::new(),
            worker: None,
            next_job: AtomicU64::new(0),
        }
    }

    /// Create an uploader that sends chunks through `transport` instead of
    /// the default HTTP client
    pub fn with_transport(transport: Arc<dyn ChunkTransport>) -> Self {
        let mut uploader = Self::new();
        uploader.transport = Some(transport);
        uploader
    }

    /// Validate settings and resolve the target URL. No work is started.
    pub fn init(&mut self, settings: UploaderSettings) -> Result<(), UploadError> {
        self.lifecycle.check_init()?;

        let target = settings.resolve()?;
        tracing::info!(
            "Uploader target: {} ({:?} POST)",
            target.url,
            target.post_mode
        );

        self.target = Some(target);
        self.lifecycle.initialized();
        Ok(())
    }

    /// Start the upload worker. Returns as soon as the worker is idle and
    /// waiting for a chunk.
    pub fn run(&mut self) -> Result<(), UploadError> {
        self.lifecycle.check_run()?;
        let target = self.target.clone().ok_or(UploadError::NotInitialized)?;

        let transport: Arc<dyn ChunkTransport> = match &self.transport {
            Some(transport) => transport.clone(),
            None => Arc::new(HttpTransport::new(target)?),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| UploadError::TransportInitFailed(e.to_string()))?;

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let worker = UploadWorker {
            transport,
            jobs: jobs_rx,
            stats: self.stats.clone(),
            idle: self.idle.clone(),
            cancel: self.cancel.clone(),
        };

        self.idle.store(true, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name("http-uploader".into())
            .spawn(move || runtime.block_on(worker.run()))
            .map_err(|e| {
                self.idle.store(false, Ordering::SeqCst);
                UploadError::TransportInitFailed(e.to_string())
            })?;

        self.jobs = Some(jobs_tx);
        self.worker = Some(handle);
        self.lifecycle.started();
        tracing::info!("Uploader running");
        Ok(())
    }

    /// Hand one complete chunk to the worker. Never blocks on the network.
    pub fn upload_buffer(&self, data: &[u8]) -> Result<(), UploadError> {
        if !self.lifecycle.is_running() {
            return Err(UploadError::NotRunning);
        }
        if data.is_empty() {
            return Err(UploadError::InvalidArgument("empty buffer".into()));
        }
        let jobs = self.jobs.as_ref().ok_or(UploadError::NotRunning)?;

        if self
            .idle
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(UploadError::UploadInProgress);
        }

        let job = UploadJob {
            id: self.next_job.fetch_add(1, Ordering::Relaxed),
            data: Bytes::copy_from_slice(data),
        };
        tracing::debug!("queueing upload {} ({} bytes)", job.id, data.len());

        if jobs.send(job).is_err() {
            self.idle.store(true, Ordering::SeqCst);
            return Err(UploadError::NotRunning);
        }
        Ok(())
    }

    /// True when running and ready to accept the next chunk
    pub fn upload_complete(&self) -> bool {
        self.lifecycle.is_running() && self.idle.load(Ordering::SeqCst)
    }

    /// Snapshot of upload statistics
    pub fn stats(&self) -> Result<UploadStats, UploadError> {
        if self.lifecycle.state() == ComponentState::Idle {
            return Err(UploadError::NotInitialized);
        }
        self.stats.snapshot().ok_or(UploadError::StatsUnavailable)
    }

    /// Passive accessor over the same statistics, for display loops
    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter::new(self.stats.clone())
    }

    /// Resolved target URL, available after `init`
    pub fn target_url(&self) -> Option<&Url> {
        self.target.as_ref().map(|target| &target.url)
    }

    pub fn state(&self) -> ComponentState {
        self.lifecycle.state()
    }

    /// Cancel any transfer in flight and wait for the worker to exit.
    /// Calling it again, or before `run`, does nothing.
    pub fn stop(&mut self) -> Result<(), UploadError> {
        if !self.lifecycle.stop() {
            return Ok(());
        }

        self.cancel.cancel();
        self.jobs.take();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Upload worker panicked");
            }
        }
        self.stats.freeze();
        self.idle.store(false, Ordering::SeqCst);

        tracing::info!("Uploader stopped");
        Ok(())
    }
}

impl Default for HttpUploader {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HttpUploader {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl Configure for HttpUploader {
    type Config = UploaderSettings;

    fn init(&mut self, config: UploaderSettings) -> crate::Result<()> {
        Ok(HttpUploader::init(self, config)?)
    }
}

impl Component for HttpUploader {
    fn name(&self) -> &'static str {
        "uploader"
    }

    fn state(&self) -> ComponentState {
        self.lifecycle.state()
    }

    fn run(&mut self) -> crate::Result<()> {
        Ok(HttpUploader::run(self)?)
    }

    fn stop(&mut self) -> crate::Result<()> {
        Ok(HttpUploader::stop(self)?)
    }
}

/// State moved onto the worker thread
struct UploadWorker {
    transport: Arc<dyn ChunkTransport>,
    jobs: mpsc::UnboundedReceiver<UploadJob>,
    stats: Arc<StatsTracker>,
    idle: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl UploadWorker {
    async fn run(mut self) {
        loop {
            let job = tokio::select! {
                _ = self.cancel.cancelled() => break,
                job = self.jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            self.transfer(job).await;
            self.idle.store(true, Ordering::SeqCst);
        }
        tracing::debug!("upload worker exiting");
    }

    async fn transfer(&self, job: UploadJob) {
        let UploadJob { id, data } = job;
        let length = data.len() as u64;
        self.stats.begin_transfer();
        let progress = TransferProgress::new(self.stats.clone());

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                self.stats.cancel_transfer();
                tracing::warn!("Upload {} ({} bytes) cancelled, chunk discarded", id, length);
            }
            result = self.transport.send(data, progress) => match result {
                Ok(()) => {
                    self.stats.complete_transfer(length);
                    tracing::debug!("upload {} complete ({} bytes)", id, length);
                }
                Err(e) => {
                    self.stats.fail_transfer(&e);
                    tracing::warn!(
                        "Upload {} ({} bytes) failed, skipping chunk: {}",
                        id,
                        length,
                        e
                    );
                }
            },
        }
    }
}
