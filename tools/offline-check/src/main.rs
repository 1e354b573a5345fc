//! Command-line harness for the Still Louder offline layer.
//!
//! ## Usage
//!
//! ```bash
//! # Which strategy serves a URL
//! offline-check classify https://stillouder.space/assets/css/style.css --destination style
//!
//! # Partition names and the precache manifest
//! offline-check manifest
//!
//! # Run an install against the live origin, one request per asset
//! offline-check precache --config site.json
//!
//! # Send a control message to a controller
//! offline-check message GET_VERSION
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use http::header::ACCEPT;
use http::{HeaderValue, Method};
use louder_core::{init_logging, CacheConfig, LogConfig, SiteConfig};
use louder_net::{Destination, Fetcher, HttpFetcher, LoaderConfig, NetError, Request, Response};
use louder_sw::{reply_channel, CacheController, CacheStorage, MessageOutcome, PartitionKind};
use tracing::debug;

#[derive(Parser)]
#[command(name = "offline-check")]
#[command(about = "Inspect and exercise the Still Louder offline layer")]
struct Cli {
    /// Site configuration (JSON). Built-in defaults when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the route a request would take
    Classify {
        url: String,
        /// Request destination (document, image, font, style, script, audio, ...)
        #[arg(short, long)]
        destination: Option<String>,
        /// Accept header
        #[arg(short, long)]
        accept: Option<String>,
        /// HTTP method
        #[arg(short, long, default_value = "GET")]
        method: String,
    },

    /// Print partition names and the precache manifest
    Manifest,

    /// Fetch the manifest from the live origin and run an install
    Precache,

    /// Post a control message (SKIP_WAITING, CLEAR_CACHE, GET_VERSION)
    Message {
        #[arg(value_name = "TYPE")]
        kind: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogConfig::default().verbose(cli.verbose));

    let site = SiteConfig::load_or_default(cli.config.as_deref())
        .context("Failed to load site configuration")?;
    debug!(version = %site.cache.version, "Site configuration ready");

    match cli.command {
        Commands::Classify {
            url,
            destination,
            accept,
            method,
        } => {
            let request = build_request(&url, destination.as_deref(), accept.as_deref(), &method)?;
            classify(&site.cache, &request)
        }
        Commands::Manifest => manifest(&site.cache),
        Commands::Precache => precache(site.cache).await,
        Commands::Message { kind } => message(site.cache, &kind).await,
    }
}

fn build_request(
    url: &str,
    destination: Option<&str>,
    accept: Option<&str>,
    method: &str,
) -> Result<Request> {
    let mut request = Request::parse(url)?;
    if let Some(destination) = destination {
        request = request.destination(destination.parse::<Destination>()?);
    }
    if let Some(accept) = accept {
        request = request.header(ACCEPT, HeaderValue::from_str(accept)?);
    }
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid method '{method}'"))?;
    Ok(request.method(method))
}

fn classify(config: &CacheConfig, request: &Request) -> Result<()> {
    let controller = offline_controller(config.clone())?;
    let rule = controller.router().rule_for(request);
    let partition = rule
        .route
        .partition()
        .map(|kind| controller.partitions().name(kind))
        .unwrap_or_else(|| "-".to_string());

    println!("URL:       {}", request.url);
    println!("Rule:      {}", rule.name);
    println!("Strategy:  {}", rule.route.strategy_name());
    println!("Partition: {}", partition);
    Ok(())
}

fn manifest(config: &CacheConfig) -> Result<()> {
    let controller = offline_controller(config.clone())?;

    println!("Version: {}", config.version);
    println!("Partitions:");
    for kind in PartitionKind::ALL {
        println!("  {:<9} {}", kind.to_string(), controller.partitions().name(kind));
    }
    println!("Precache manifest:");
    for url in config.precache_manifest()? {
        println!("  {}", url);
    }
    println!("Offline page: {}", config.offline_url()?);
    Ok(())
}

/// Passes requests through to the live network and remembers how each went.
struct RecordingFetcher<F> {
    inner: F,
    attempts: Mutex<Vec<(String, Result<(u16, usize), String>)>>,
}

impl<F> RecordingFetcher<F> {
    fn new(inner: F) -> Self {
        Self {
            inner,
            attempts: Mutex::new(Vec::new()),
        }
    }

    fn attempts(&self) -> Vec<(String, Result<(u16, usize), String>)> {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<F: Fetcher> Fetcher for RecordingFetcher<F> {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        let result = self.inner.fetch(request).await;
        let outcome = match &result {
            Ok(response) => Ok((response.status.as_u16(), response.body.len())),
            Err(e) => Err(e.to_string()),
        };
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((request.url.to_string(), outcome));
        result
    }
}

async fn precache(config: CacheConfig) -> Result<()> {
    install_and_report(config, HttpFetcher::new(LoaderConfig::default())?).await
}

async fn install_and_report<F: Fetcher>(config: CacheConfig, live: F) -> Result<()> {
    let manifest = config.precache_manifest()?;
    let network = Arc::new(RecordingFetcher::new(live));
    let controller =
        CacheController::new(config, Arc::new(CacheStorage::new()), Arc::clone(&network))?;

    println!("Installing {} manifest URLs...", manifest.len());
    let result = controller.install().await;

    let attempts = network.attempts();
    for (url, outcome) in &attempts {
        match outcome {
            Ok((status, bytes)) if (200..300).contains(status) => {
                println!("  ok   {} {} ({} bytes)", status, url, bytes)
            }
            Ok((status, _)) => println!("  FAIL {} {}", status, url),
            Err(e) => println!("  FAIL {} ({})", url, e),
        }
    }
    for url in manifest.iter().skip(attempts.len()) {
        println!("  skip {}", url);
    }

    match result {
        Ok(report) => {
            println!("Install succeeded: {} assets precached", report.precached);
            for name in controller.caches().keys().await {
                println!("  {:<28} {} entries", name, controller.caches().entry_count(&name).await);
            }
            Ok(())
        }
        Err(e) => bail!("Install failed: {}", e),
    }
}

async fn message(config: CacheConfig, kind: &str) -> Result<()> {
    let data = serde_json::json!({ "type": kind.to_ascii_uppercase() });
    println!("Message: {}", data);

    let controller = offline_controller(config)?;
    let (port, reply) = reply_channel();
    let outcome = controller.handle_message(&data, Some(port)).await;
    debug!(outcome = ?outcome, "Message handled");

    match outcome {
        MessageOutcome::Replied(_) => {
            let reply = reply.await.context("Reply channel closed")?;
            println!("Reply:   {}", serde_json::to_string(&reply)?);
        }
        MessageOutcome::SkipWaiting => println!("Worker asked to skip waiting"),
        MessageOutcome::CacheCleared(count) => println!("Deleted {} caches", count),
        MessageOutcome::Ignored => bail!("Unknown message type '{}'", kind),
    }
    Ok(())
}

/// Controller over empty storage, for commands that never hit the network.
fn offline_controller(config: CacheConfig) -> Result<CacheController<HttpFetcher>> {
    let network = Arc::new(HttpFetcher::new(LoaderConfig::default())?);
    Ok(CacheController::new(config, Arc::new(CacheStorage::new()), network)?)
}
