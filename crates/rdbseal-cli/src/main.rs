//! rdbseal: snapshot encryption CLI
//!
//! Commands:
//!   encrypt <input>      - seal a file (split/whole also write a manifest sidecar)
//!   decrypt <input>      - open a sealed file
//!   seal-text <text>     - seal a UTF-8 string into a JSON payload
//!   open-text <json>     - open a JSON payload produced by seal-text
//!   config show          - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rdbseal_core::config::RdbsealConfig;
use rdbseal_core::{Framing, LogFormat};
use rdbseal_crypto::{
    ChunkManifest, ChunkedStreamProcessor, CipherEngine, EncryptedTextPackagePayload,
    EncryptedTextPayload, StreamStats,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "rdbseal",
    version,
    about = "Seal Redis snapshots with AES-256-GCM",
    long_about = "rdbseal: encrypt and decrypt snapshot files and small text payloads"
)]
struct Cli {
    /// Path to rdbseal.toml configuration file
    #[arg(long, short = 'c', env = "RDBSEAL_CONFIG", default_value = "rdbseal.toml")]
    config: PathBuf,

    /// Base64-encoded 256-bit key (overrides crypto.encryption_key)
    #[arg(long, env = "RDBSEAL_ENCRYPTION_KEY", hide_env_values = true)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file
    Encrypt {
        /// Plaintext input file
        input: PathBuf,
        /// Output path (default: files.encrypted_file_name next to the input)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// whole | split | package | package-fitted (default: crypto.framing)
        #[arg(long, short = 'f')]
        framing: Option<Framing>,
        /// Chunk size in bytes (default: crypto.chunk_size)
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Decrypt a file
    ///
    /// Split and whole framings need the manifest sidecar written at encryption
    /// time; its chunk size takes precedence over flags, and a --framing that
    /// disagrees with it is an error.
    Decrypt {
        /// Encrypted input file
        input: PathBuf,
        /// Output path (default: files.decrypted_file_name next to the input)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Framing used at encryption time (must match the manifest, if any)
        #[arg(long, short = 'f')]
        framing: Option<Framing>,
        /// Chunk size used at encryption time
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Manifest sidecar (default: <input> + files.manifest_suffix)
        #[arg(long, short = 'm')]
        manifest: Option<PathBuf>,
    },

    /// Seal a UTF-8 string and print the JSON payload
    #[command(name = "seal-text")]
    SealText {
        text: String,
        /// Emit ciphertext, iv, and tag separately instead of one package
        #[arg(long)]
        detached: bool,
    },

    /// Open a JSON payload produced by seal-text
    #[command(name = "open-text")]
    OpenText {
        /// JSON payload (either shape)
        json: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RdbsealConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;
    init_logging(&config.logging.level, &config.logging.format);

    let key = resolve_key(cli.key.as_deref(), &config);

    match cli.command {
        Commands::Encrypt { input, output, framing, chunk_size } => {
            cmd_encrypt(&config, key, &input, output.as_deref(), framing, chunk_size).await
        }
        Commands::Decrypt { input, output, framing, chunk_size, manifest } => {
            cmd_decrypt(
                &config,
                key,
                &input,
                output.as_deref(),
                framing,
                chunk_size,
                manifest.as_deref(),
            )
            .await
        }
        Commands::SealText { text, detached } => cmd_seal_text(key, &text, detached),
        Commands::OpenText { json } => cmd_open_text(key, &json),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Key precedence: --key / RDBSEAL_ENCRYPTION_KEY > config > empty.
///
/// An empty key is passed through; the engine rejects it when an operation
/// starts.
fn resolve_key(flag: Option<&str>, config: &RdbsealConfig) -> SecretString {
    let key = flag
        .map(str::to_string)
        .or_else(|| config.crypto.encryption_key.clone())
        .unwrap_or_default();
    SecretString::from(key)
}

fn default_output(input: &Path, name: &str) -> PathBuf {
    input
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}"
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── Stream runner ─────────────────────────────────────────────────────────────

/// Run a blocking stream job with Ctrl-C wired to its cancellation token.
/// On any failure the partial output file is removed.
async fn run_stream_job<T, F>(output: &Path, cancel: CancellationToken, job: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(CancellationToken) -> Result<T> + Send + 'static,
{
    let interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current chunk");
            interrupt.cancel();
        }
    });

    let result = tokio::task::spawn_blocking(move || job(cancel))
        .await
        .context("stream worker panicked")
        .and_then(|r| r);
    watcher.abort();

    if result.is_err() && output.exists() {
        warn!(path = %output.display(), "removing partial output");
        if let Err(e) = std::fs::remove_file(output) {
            warn!(path = %output.display(), error = %e, "could not remove partial output");
        }
    }
    result
}

// ── `rdbseal encrypt` ─────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: &RdbsealConfig,
    key: SecretString,
    input: &Path,
    output: Option<&Path>,
    framing: Option<Framing>,
    chunk_size: Option<usize>,
) -> Result<()> {
    let framing = framing.unwrap_or(config.crypto.framing);
    let chunk_size = chunk_size.unwrap_or(config.crypto.chunk_size);
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input, &config.files.encrypted_file_name));
    let manifest_path = config.files.manifest_path_for(&output);

    let total = std::fs::metadata(input)
        .with_context(|| format!("reading {}", input.display()))?
        .len();
    remove_stale_manifest(&manifest_path)?;
    println!(
        "Encrypting {} → {} ({framing}, {} chunks)",
        input.display(),
        output.display(),
        fmt_bytes(chunk_size as u64),
    );

    let pb = make_progress_bar(total, "encrypt");
    let pb_job = pb.clone();
    let (src, dst) = (input.to_path_buf(), output.clone());

    let outcome = run_stream_job(&output, CancellationToken::new(), move |cancel| {
        let processor = ChunkedStreamProcessor::new(CipherEngine::new(key))
            .with_chunk_size(chunk_size)
            .with_cancellation(cancel)
            .with_progress(Box::new(move |_, bytes| pb_job.set_position(bytes)));

        let reader = BufReader::new(
            File::open(&src).with_context(|| format!("opening {}", src.display()))?,
        );
        let writer = BufWriter::new(
            File::create(&dst).with_context(|| format!("creating {}", dst.display()))?,
        );
        processor
            .encrypt(framing, reader, writer)
            .with_context(|| format!("encrypting {}", src.display()))
    })
    .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(e);
        }
    };
    pb.finish_with_message("done");

    if let Some(manifest) = &outcome.manifest {
        let bytes = manifest.to_bytes().context("serializing manifest")?;
        std::fs::write(&manifest_path, bytes)
            .with_context(|| format!("writing manifest {}", manifest_path.display()))?;
    }

    print_stats(&outcome.stats);
    if outcome.manifest.is_some() {
        println!("  manifest: {}", manifest_path.display());
    }
    info!(output = %output.display(), chunks = outcome.stats.chunks, "encryption complete");
    Ok(())
}

// ── `rdbseal decrypt` ─────────────────────────────────────────────────────────

async fn cmd_decrypt(
    config: &RdbsealConfig,
    key: SecretString,
    input: &Path,
    output: Option<&Path>,
    framing: Option<Framing>,
    chunk_size: Option<usize>,
    manifest_path: Option<&Path>,
) -> Result<()> {
    let manifest_path = manifest_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.files.manifest_path_for(input));
    let manifest = if manifest_path.exists() {
        let bytes = std::fs::read(&manifest_path)
            .with_context(|| format!("reading manifest {}", manifest_path.display()))?;
        Some(
            ChunkManifest::from_bytes(&bytes)
                .with_context(|| format!("parsing manifest {}", manifest_path.display()))?,
        )
    } else {
        None
    };

    let framing = match (&manifest, framing) {
        (Some(m), Some(flag)) if m.framing != flag => anyhow::bail!(
            "--framing {flag} conflicts with {} framing recorded in {}",
            m.framing,
            manifest_path.display()
        ),
        (Some(m), _) => m.framing,
        (None, Some(flag)) => flag,
        (None, None) => config.crypto.framing,
    };
    if framing.needs_manifest() && manifest.is_none() {
        anyhow::bail!(
            "{framing} framing needs a manifest; none found at {}",
            manifest_path.display()
        );
    }
    let chunk_size = manifest
        .as_ref()
        .and_then(|m| m.chunk_size)
        .or(chunk_size)
        .unwrap_or(config.crypto.chunk_size);

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output(input, &config.files.decrypted_file_name));
    let total = std::fs::metadata(input)
        .with_context(|| format!("reading {}", input.display()))?
        .len();
    println!("Decrypting {} → {} ({framing})", input.display(), output.display());

    let pb = make_progress_bar(total, "decrypt");
    let pb_job = pb.clone();
    let (src, dst) = (input.to_path_buf(), output.clone());

    let stats = run_stream_job(&output, CancellationToken::new(), move |cancel| {
        let processor = ChunkedStreamProcessor::new(CipherEngine::new(key))
            .with_chunk_size(chunk_size)
            .with_cancellation(cancel)
            .with_progress(Box::new(move |_, bytes| pb_job.set_position(bytes)));

        let reader = BufReader::new(
            File::open(&src).with_context(|| format!("opening {}", src.display()))?,
        );
        let writer = BufWriter::new(
            File::create(&dst).with_context(|| format!("creating {}", dst.display()))?,
        );
        processor
            .decrypt(framing, reader, writer, manifest.as_ref())
            .with_context(|| format!("decrypting {}", src.display()))
    })
    .await;

    let stats = match stats {
        Ok(stats) => stats,
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(e);
        }
    };
    pb.finish_with_message("done");

    print_stats(&stats);
    info!(output = %output.display(), chunks = stats.chunks, "decryption complete");
    Ok(())
}

/// A sidecar left by an earlier run no longer describes the output about to
/// be written.
fn remove_stale_manifest(manifest_path: &Path) -> Result<()> {
    if manifest_path.exists() {
        info!(path = %manifest_path.display(), "removing previous manifest");
        std::fs::remove_file(manifest_path)
            .with_context(|| format!("removing stale manifest {}", manifest_path.display()))?;
    }
    Ok(())
}

fn print_stats(stats: &StreamStats) {
    println!("  chunks:   {}", stats.chunks);
    println!("  read:     {}", fmt_bytes(stats.bytes_in));
    println!("  written:  {}", fmt_bytes(stats.bytes_out));
}

// ── `rdbseal seal-text` / `open-text` ─────────────────────────────────────────

fn cmd_seal_text(key: SecretString, text: &str, detached: bool) -> Result<()> {
    let engine = CipherEngine::new(key);
    let json = if detached {
        serde_json::to_string_pretty(&EncryptedTextPayload::seal(&engine, text)?)?
    } else {
        serde_json::to_string_pretty(&EncryptedTextPackagePayload::seal(&engine, text)?)?
    };
    println!("{json}");
    Ok(())
}

fn cmd_open_text(key: SecretString, json: &str) -> Result<()> {
    let engine = CipherEngine::new(key);
    let text = if let Ok(payload) = serde_json::from_str::<EncryptedTextPackagePayload>(json) {
        payload.open(&engine)?
    } else {
        serde_json::from_str::<EncryptedTextPayload>(json)
            .context("payload is neither a package nor a detached text payload")?
            .open(&engine)?
    };
    println!("{text}");
    Ok(())
}

// ── `rdbseal config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &RdbsealConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config)
        .context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
