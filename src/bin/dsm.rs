//! DSM controller binary.
//!
//! Runs one controller, reads line commands from stdin and walks the controller
//! down to OFFLINE on a termination signal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use dsm_controller::{
    wait_for_shutdown_signal, Command, Config, ControllerBuilder, ControllerHandle, Subscribe,
};

/// Dome seeing monitor controller.
#[derive(Parser, Debug)]
#[command(name = "dsm")]
#[command(about = "Run the dome seeing monitor lifecycle controller")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Serve commands read from stdin, one per line.
    ///
    /// Commands: start [label], enable, disable, standby, exitControl, setSimulationMode N
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Device index (overrides the configuration file).
    #[arg(long)]
    index: Option<u32>,

    /// Simulation mode: 0 real, 1 fast, 2 slow.
    #[arg(long, default_value_t = 0)]
    simulate: i64,

    /// Path to configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Go to ENABLED at startup, using LABEL (or the mode's default label).
    #[arg(long, value_name = "LABEL", num_args = 0..=1, default_missing_value = "")]
    enable: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "dsm=debug,dsm_controller=debug"
    } else {
        "dsm=info,dsm_controller=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Cmd::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut cfg = Config::load(args.config.as_deref()).context("loading configuration")?;
    if let Some(index) = args.index {
        cfg.index = index;
    }

    let mut subscribers: Vec<Arc<dyn Subscribe>> = Vec::new();
    #[cfg(feature = "logging")]
    subscribers.push(Arc::new(dsm_controller::LogWriter::new()));

    let mut ctrl = ControllerBuilder::new(cfg)
        .with_simulation_mode(args.simulate)
        .with_subscribers(subscribers)
        .build()
        .context("building controller")?;
    info!(index = ctrl.config().index, mode = %ctrl.mode(), "controller ready");

    if let Some(label) = args.enable {
        let label = if !label.is_empty() {
            label
        } else if ctrl.mode().is_simulated() {
            "simulation".to_string()
        } else {
            "default".to_string()
        };
        for command in [Command::start(label), Command::Enable] {
            let name = command.name();
            let ack = ctrl.execute(command).await;
            if !ack.is_complete() {
                ctrl.shutdown().await;
                anyhow::bail!("{name} at startup: {ack}");
            }
        }
    }

    let token = CancellationToken::new();
    tokio::spawn(watch_signals(token.clone()));
    tokio::spawn(read_commands(ctrl.handle()));

    let state = ctrl.serve(token).await;
    info!(%state, "dsm controller exiting");
    Ok(())
}

async fn watch_signals(token: CancellationToken) {
    match wait_for_shutdown_signal().await {
        Ok(()) => token.cancel(),
        Err(e) => error!(error = %e, "failed to install signal handlers"),
    }
}

async fn read_commands(handle: ControllerHandle) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed; commands now only via signals");
                return;
            }
            Err(e) => {
                warn!(error = %e, "failed to read stdin");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(command) => {
                let shown = command.to_string();
                let ack = handle.send(command).await;
                println!("{shown}: {ack}");
            }
            Err(e) => println!("{e}"),
        }
    }
}
