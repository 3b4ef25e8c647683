//! Live WebM Uploader
//!
//! Follows a WebM file written by a live encoder and uploads it chunk by
//! chunk to an HTTP server.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webmlive_uploader::{
    buffer::{create_shared_buffer, ChunkBuffer},
    config::{store_entries, AppConfig},
    constants::DEFAULT_POLL_INTERVAL_MS,
    control::{run_all, stop_all},
    pump::ChunkPump,
    source::FileChunkSource,
    upload::{HttpUploader, PostMode},
};

#[derive(Parser, Debug)]
#[command(name = "webmlive", version, about = "Upload a live WebM stream over HTTP")]
struct Args {
    /// WebM file written by the encoder
    #[arg(long)]
    file: Option<PathBuf>,

    /// Target for HTTP POSTs
    #[arg(long)]
    url: Option<String>,

    /// HTTP header sent with all POSTs
    #[arg(long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,

    /// Form variable sent with all form POSTs
    #[arg(long = "var", value_name = "NAME:VALUE")]
    vars: Vec<String>,

    /// Send chunks as file data in a multipart form
    #[arg(long)]
    form_post: bool,

    /// Stream ID for the POST query string
    #[arg(long)]
    stream_id: Option<String>,

    /// Stream name for the POST query string
    #[arg(long)]
    stream_name: Option<String>,

    /// Chunk buffer capacity in bytes
    #[arg(long)]
    buffer_capacity: Option<usize>,

    /// Treat every read as a chunk instead of splitting at WebM clusters
    #[arg(long)]
    no_split: bool,

    /// Print progress as JSON lines
    #[arg(long)]
    json: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the progress line
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    tracing::info!("file: {}", config.source.path.display());
    tracing::info!("url: {}", config.uploader.target_url);

    let buffer = create_shared_buffer(config.buffer.capacity_bytes)
        .context("can't create chunk buffer")?;

    let mut uploader = HttpUploader::new();
    uploader
        .init(config.uploader.clone())
        .context("uploader init failed")?;

    let mut source = FileChunkSource::new(buffer.clone());
    source
        .init(config.source.clone())
        .context("source init failed")?;

    // The uploader goes idle and waits for chunks before the source starts
    run_all(&mut [&mut uploader, &mut source]).context("failed to start streaming")?;

    let result = stream(&buffer, &source, &uploader, &args, config.buffer.read_buffer_size).await;

    tracing::info!("stopping...");
    stop_all(&mut [&mut uploader, &mut source])?;

    let pending = buffer.ready_chunks();
    if pending > 0 {
        tracing::warn!("{} chunks were not uploaded", pending);
        buffer.clear();
    }
    if let Ok(stats) = uploader.stats() {
        tracing::info!(
            "Uploaded {} bytes in {} chunks ({} failed, {} cancelled)",
            stats.total_bytes_uploaded,
            stats.chunks_uploaded,
            stats.chunks_failed,
            stats.chunks_cancelled
        );
    }
    println!("\nDone.");
    result
}

fn build_config(args: &Args) -> Result<AppConfig> {
    let mut config =
        AppConfig::load_or_default(args.config.as_deref()).context("cannot load config file")?;

    if let Some(file) = &args.file {
        config.source.path = file.clone();
    }
    if let Some(url) = &args.url {
        config.uploader.target_url = url.clone();
    }
    store_entries(&args.headers, &mut config.uploader.headers)
        .context("command line HTTP header parse failed")?;
    store_entries(&args.vars, &mut config.uploader.form_variables)
        .context("command line form variable parse failed")?;
    if args.form_post {
        config.uploader.post_mode = PostMode::Form;
    }
    if let Some(stream_id) = &args.stream_id {
        config.uploader.stream_id = stream_id.clone();
    }
    if let Some(stream_name) = &args.stream_name {
        config.uploader.stream_name = stream_name.clone();
    }
    if let Some(capacity) = args.buffer_capacity {
        config.buffer.capacity_bytes = capacity;
    }
    if args.no_split {
        config.source.split_clusters = false;
    }
    config.validate()?;

    if config.source.path.as_os_str().is_empty() {
        bail!("--file is required");
    }
    if config.uploader.target_url.is_empty() {
        bail!("--url is required");
    }
    Ok(config)
}

/// Poll loop: move chunks to the uploader and print progress until the
/// user quits or something fails
async fn stream(
    buffer: &ChunkBuffer,
    source: &FileChunkSource,
    uploader: &HttpUploader,
    args: &Args,
    read_buffer_size: usize,
) -> Result<()> {
    let mut pump = ChunkPump::with_capacity(read_buffer_size);
    let reporter = uploader.reporter();
    let mut ticker = tokio::time::interval(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));

    // A plain thread, so a pending stdin read never holds up shutdown
    let (enter_tx, mut enter_rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
            let _ = enter_tx.send(());
        }
    });
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdin_open = true;

    println!("\nPress Enter or Ctrl-C to quit...");
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            entered = &mut enter_rx, if stdin_open => match entered {
                Ok(()) => break,
                // stdin closed; only Ctrl-C can stop us now
                Err(_) => stdin_open = false,
            },
            _ = ticker.tick() => {}
        }

        if let Some(e) = source.check_errors() {
            return Err(e).context("chunk source failed");
        }
        pump.pump(buffer, uploader)
            .context("cannot hand chunk to uploader")?;

        if args.json {
            if let Some(line) = reporter.progress_json(source.duration()) {
                println!("{}", line);
            }
        } else if let Some(line) = reporter.progress_line(source.duration()) {
            print!("\r{}", line);
            std::io::stdout().flush()?;
        }
    }
    Ok(())
}
