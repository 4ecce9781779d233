use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::{Parser, Subcommand};
use corner_fx::actor::config_watcher::ConfigWatcher;
use corner_fx::actor::effects::{Event, Extension};
use corner_fx::actor::replay;
use corner_fx::common::config::{Config, config_file};
use corner_fx::common::log;
use corner_fx::sys::host::Host;
use corner_fx::sys::timer::TokioTimers;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
struct Cli {
    /// Path to configuration file to use (overrides default).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Check whether the config file can be loaded and exit.
    #[arg(long)]
    validate: bool,

    /// Run the effects controller against an empty host and apply config
    /// file changes until interrupted.
    #[arg(long)]
    watch: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file and print every `Dump` step to stdout.
    Replay { file: PathBuf },
}

fn main() {
    sigpipe::reset();
    let opt = Cli::parse();

    if std::env::var_os("RUST_BACKTRACE").is_none() {
        // SAFETY: We are single threaded at this point.
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    log::init_logging();
    install_panic_hook();

    let config_path = opt.config.clone().unwrap_or_else(config_file);

    if opt.validate {
        match Config::read(&config_path) {
            Ok(config) => {
                let issues = config.validate();
                if issues.is_empty() {
                    println!("Config validation passed");
                    return;
                }
                for issue in issues {
                    eprintln!("{}", issue);
                }
            }
            Err(e) => eprintln!("{e:#}"),
        }
        process::exit(1);
    }

    let config = if config_path.exists() {
        match Config::read(&config_path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{e:#}");
                process::exit(1);
            }
        }
    } else {
        Config::default()
    };

    let result = match opt.command {
        Some(Commands::Replay { file }) => run_replay(file, config),
        None if opt.watch => watch(config, config_path),
        None => {
            println!("Nothing to do. Pass --validate, --watch or a replay file.");
            Ok(())
        }
    };
    if let Err(e) = result {
        eprintln!("{e:#}");
        process::exit(1);
    }
}

fn run_replay(file: PathBuf, config: Config) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    replay::replay(&file, config, &mut out)?;
    out.flush()?;
    Ok(())
}

fn watch(config: Config, config_path: PathBuf) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    runtime.block_on(watch_loop(config, config_path))
}

async fn watch_loop(config: Config, config_path: PathBuf) -> anyhow::Result<()> {
    let (events_tx, events_rx) = corner_fx::actor::channel();
    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    ctrlc::set_handler(move || token.cancel()).context("setting Ctrl+C handler")?;

    ConfigWatcher::spawn(events_tx.clone(), config.clone(), config_path);

    let mut host = Host::new();
    let mut extension = Extension::new(config, Box::new(TokioTimers::new(events_tx.clone())));
    extension.enable(&mut host)?;
    events_tx.send(Event::BlurLoaded);
    info!("effects running, press Ctrl+C to stop");

    extension.run(&mut host, events_rx, shutdown).await;
    extension.disable(&mut host)?;

    let stage = host.stage();
    print!("{}", stage.draw_tree(stage.root()));
    Ok(())
}

#[cfg(panic = "unwind")]
fn install_panic_hook() {
    // Abort on panic instead of propagating panics to the main thread.
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        original_hook(info);
        std::process::abort();
    }));
}

#[cfg(not(panic = "unwind"))]
fn install_panic_hook() {}
