//! gowasm CLI
//!
//! Runs a Go `js/wasm` module from the command line.

use clap::{Parser, Subcommand};
use gowasm::host::imports;
use gowasm::{Bridge, BridgeConfig, CancellationToken, Error, VERSION};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gowasm")]
#[command(author, version, about = "Run Go js/wasm modules without a JavaScript engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a module to completion and exit with its exit code
    Run {
        /// The module to run
        file: PathBuf,

        /// JSON bridge configuration
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Limit guest linear memory to this many bytes
        #[arg(long, value_name = "BYTES")]
        memory_limit: Option<usize>,

        /// Cancel the run after this many milliseconds
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,

        /// Environment entry for the guest (repeatable)
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Failed property and index lookups yield undefined instead of aborting
        #[arg(long)]
        lenient: bool,

        /// Show execution time
        #[arg(short, long)]
        profile: bool,

        /// Arguments to pass to the module (after --)
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// List the imports the bridge provides
    Imports,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            file,
            config,
            memory_limit,
            timeout,
            env,
            lenient,
            profile,
            args,
        } => {
            let config = match build_config(config.as_deref(), memory_limit, &env, lenient, &file, args) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(2);
                }
            };
            run_file(&file, config, timeout, profile);
        }
        Commands::Imports => {
            println!("gowasm {} provides:", VERSION);
            for (name, _) in imports::IMPORTS {
                println!("  {}.{}", imports::NAMESPACE, name);
            }
        }
    }
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_config(
    path: Option<&Path>,
    memory_limit: Option<usize>,
    env: &[String],
    lenient: bool,
    file: &Path,
    args: Vec<String>,
) -> gowasm::Result<BridgeConfig> {
    let mut config = match path {
        Some(path) => BridgeConfig::from_json_file(path)?,
        None => BridgeConfig::default(),
    };
    if memory_limit.is_some() {
        config.memory_limit = memory_limit;
    }
    for entry in env {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("environment entry '{}' is not KEY=VALUE", entry)))?;
        config.env.push((key.to_string(), value.to_string()));
    }
    config.lenient_lookups |= lenient;
    if !args.is_empty() || config.args.is_empty() {
        let program = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        config.args = std::iter::once(program).chain(args).collect();
    }
    Ok(config)
}

fn run_file(path: &Path, config: BridgeConfig, timeout: Option<u64>, profile: bool) {
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());

    let mut bridge = match Bridge::from_file(&name, path, Some(config)) {
        Ok(bridge) => bridge,
        Err(e) => {
            eprintln!("Error loading '{}': {}", path.display(), e);
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    if let Some(ms) = timeout {
        let deadline = cancel.clone();
        thread::spawn(move || {
            if !deadline.wait_timeout(Duration::from_millis(ms)) {
                tracing::warn!(ms, "timeout reached, cancelling");
                deadline.cancel();
            }
        });
    }

    let start = Instant::now();
    let (tx, _rx) = mpsc::channel();
    let result = bridge.run(&cancel, tx);
    // Lets the timeout thread finish.
    cancel.cancel();

    if profile {
        eprintln!();
        eprintln!("  Total time: {:?}", start.elapsed());
        eprintln!("  Module: {}", path.display());
        eprintln!("  State: {}", bridge.state());
    }

    match result {
        Ok(code) => std::process::exit(code),
        Err(Error::Cancelled) => {
            eprintln!("{}: run cancelled", name);
            std::process::exit(124);
        }
        Err(e) => {
            eprintln!("{}: {}", name, e);
            std::process::exit(1);
        }
    }
}
