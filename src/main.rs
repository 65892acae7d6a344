//! fscache - filesystem path cache
//!
//! Entry point for the daemon and its command-line clients.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use fscache::cli::{clean_prefix, find_root, relative_path};
use fscache::filter::{GlobalIgnore, IgnoreConfig};
use fscache::server::{init_tracing, Client, ListRequest, PidFile};
use fscache::{Config, FsCache, StoreMode};

/// fscache - keeps a live index of a directory tree and answers prefix queries
#[derive(Parser, Debug)]
#[command(name = "fscache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Socket the cache listens on [default: ~/.cache/fscache.socket]
    #[arg(long, global = true, env = "FSCACHE_SOCKET")]
    socket: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "FSCACHE_LOG_LEVEL", default_value = "error")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, global = true, env = "FSCACHE_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the cache in the foreground
    Run(RunArgs),
    /// Read entries from a running cache
    Read(ReadArgs),
    /// Stop a running cache
    Stop {
        /// Ask the cache to start again after stopping
        #[arg(long)]
        restart: bool,
    },
    /// Show the status of a running cache
    Status,
    /// Print the global ignore list
    ListIgnores(IgnoreArgs),
}

#[derive(Args, Debug)]
struct IgnoreArgs {
    /// Extra global ignore patterns
    #[arg(long = "ignore", env = "FSCACHE_EXTRA_IGNORES", value_delimiter = ',')]
    extra_ignores: Vec<String>,

    /// Do not ask the go tool for its cache directories
    #[arg(long, env = "FSCACHE_NO_GO_ENV")]
    no_go_env: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Directory to index [default: home directory]
    #[arg(short, long, env = "FSCACHE_ROOT")]
    root: Option<PathBuf>,

    /// Directory for the index database [default: ~/.cache/fscache]
    #[arg(long, env = "FSCACHE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Storage backend (sled, sqlite)
    #[arg(long, env = "FSCACHE_MODE", default_value_t = StoreMode::Sled)]
    mode: StoreMode,

    /// PID file [default: ~/.cache/fscache.pid]
    #[arg(long, env = "FSCACHE_PID_FILE")]
    pid_file: Option<PathBuf>,

    /// Milliseconds between index flushes
    #[arg(long, env = "FSCACHE_FLUSH_MS", default_value = "1000")]
    flush_ms: u64,

    /// Milliseconds over which filesystem events are batched
    #[arg(long, env = "FSCACHE_LATENCY_MS", default_value = "1000")]
    latency_ms: u64,

    /// Default entries per response batch
    #[arg(long, env = "FSCACHE_BATCH_SIZE", default_value = "10")]
    batch_size: usize,

    /// File names treated as per-directory ignore files
    #[arg(
        long,
        env = "FSCACHE_IGNORE_FILES",
        value_delimiter = ',',
        default_value = ".gitignore,.ignore"
    )]
    ignore_files: Vec<String>,

    /// Keep the persisted index instead of rebuilding it
    #[arg(long, env = "FSCACHE_KEEP_INDEX")]
    keep_index: bool,

    #[command(flatten)]
    ignores: IgnoreArgs,
}

#[derive(Args, Debug)]
struct ReadArgs {
    /// Prefix to limit paths returned
    #[arg(short, long)]
    prefix: Option<String>,

    /// Use the enclosing repository root as the prefix
    #[arg(short, long)]
    root: bool,

    /// Number of items to return, 0 for all
    #[arg(short = 'n', long, default_value = "0")]
    limit: i64,

    /// Number of items to return per batch
    #[arg(short, long, default_value = "1000")]
    batch_size: i64,

    /// Only return directories
    #[arg(short, long, conflicts_with = "files_only")]
    dirs_only: bool,

    /// Only return files
    #[arg(short, long)]
    files_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let defaults = Config::default();
    let socket = cli.socket.clone().unwrap_or(defaults.socket_path);

    match cli.command {
        Command::Run(args) => {
            init_tracing(&cli.log_level, cli.log_json)?;
            let config = run_config(&cli.log_level, cli.log_json, socket, args)?;
            run(config).await
        }
        Command::Read(args) => read(&socket, args).await,
        Command::Stop { restart } => {
            let mut client = Client::connect(&socket)
                .await
                .context("Error connecting to fscache")?;
            client.shutdown(restart).await?;
            Ok(())
        }
        Command::Status => {
            let mut client = Client::connect(&socket)
                .await
                .context("Error connecting to fscache")?;
            let report = client.status().await?;
            println!("root:    {}", report.root);
            println!("state:   {}", report.state);
            println!("entries: {}", report.entries);
            print!("{}", report.metrics);
            Ok(())
        }
        Command::ListIgnores(args) => {
            let global = GlobalIgnore::new(&ignore_config(&args))?;
            let mut out = BufWriter::new(std::io::stdout().lock());
            for line in global.lines() {
                writeln!(out, "{line}")?;
            }
            out.flush()?;
            Ok(())
        }
    }
}

fn ignore_config(args: &IgnoreArgs) -> IgnoreConfig {
    IgnoreConfig {
        extra_patterns: args.extra_ignores.clone(),
        probe_go_env: !args.no_go_env,
    }
}

fn run_config(log_level: &str, log_json: bool, socket: PathBuf, args: RunArgs) -> anyhow::Result<Config> {
    let defaults = Config::default();
    let root = match args.root {
        Some(root) => std::fs::canonicalize(&root)
            .with_context(|| format!("Cannot resolve root {}", root.display()))?,
        None => defaults.root.clone(),
    };

    let config = Config {
        root,
        socket_path: socket,
        data_dir: args.data_dir.unwrap_or(defaults.data_dir.clone()),
        store_mode: args.mode,
        log_level: log_level.to_string(),
        log_json,
        pid_file: args.pid_file.unwrap_or(defaults.pid_file.clone()),
        flush_interval: Duration::from_millis(args.flush_ms),
        latency: Duration::from_millis(args.latency_ms),
        batch_size: args.batch_size,
        ignore_files: args.ignore_files,
        extra_ignores: args.ignores.extra_ignores.clone(),
        probe_go_env: !args.ignores.no_go_env,
        reset_on_start: !args.keep_index,
    };

    tracing::debug!(?config, "Configuration loaded");
    config.validate()?;
    Ok(config)
}

async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!("fscache v{} starting...", env!("CARGO_PKG_VERSION"));

    let pid = PidFile::acquire(&config.pid_file, &config.socket_path)?;
    let cache = FsCache::new(config).context("Error starting fscache")?;
    let restart = cache.run().await?;
    drop(pid);

    if restart {
        reexec()?;
    }
    Ok(())
}

/// Replace this process with a fresh copy of itself.
fn reexec() -> anyhow::Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("Cannot locate fscache executable")?;
    tracing::info!(exe = %exe.display(), "Restarting");
    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();
    bail!("Failed to restart {}: {err}", exe.display())
}

async fn read(socket: &Path, args: ReadArgs) -> anyhow::Result<()> {
    let cwd = std::env::current_dir().context("Error finding cwd")?;

    let mut prefix = args.prefix.unwrap_or_default();
    if args.root && prefix.is_empty() {
        prefix = find_root(&cwd).display().to_string();
    }
    let prefix = clean_prefix(&prefix);

    let request = ListRequest {
        prefix: (!prefix.is_empty()).then_some(prefix),
        limit: args.limit,
        dirs_only: args.dirs_only,
        files_only: args.files_only,
        batch_size: args.batch_size,
        current_dir: Some(clean_prefix(&cwd.display().to_string())),
    };

    let mut client = Client::connect(socket)
        .await
        .context("Error connecting to fscache")?;

    let mut out = BufWriter::new(std::io::stdout().lock());
    let mut write_error = None;
    client
        .list(request, |files| {
            if write_error.is_some() {
                return;
            }
            for file in files {
                let name = relative_path(&cwd, Path::new(&file.name));
                if let Err(e) = writeln!(out, "{}", name.display()) {
                    write_error = Some(e);
                    return;
                }
            }
        })
        .await
        .context("Error fetching results")?;

    if let Some(e) = write_error {
        if e.kind() == std::io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(e.into());
    }
    out.flush()?;
    Ok(())
}
