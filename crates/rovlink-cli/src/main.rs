//! `rovlink` – entry point for both ends of the robot link.
//!
//! * `rovlink actuator` runs the actuator host on the robot: it dials the
//!   controller, drives the motors, streams telemetry and enforces the
//!   obstacle interlock.  Ctrl-C stops the motors and exits.
//! * `rovlink controller` runs the controller server on the compute host with
//!   a teleoperation prompt and a live event log.
//!
//! Settings come from `rovlink.toml` (see [`config`]); flags override it.

mod config;
mod repl;
mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rovlink_actuator::ActuatorHost;
use rovlink_channel::{EventBus, Topic, TopicReceiver};
use rovlink_controller::{ControllerServer, RobotController};
use rovlink_hal::sim::SimHardware;
use rovlink_types::{Event, EventPayload, RovError};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(name = "rovlink", version, about = "Controller and actuator host for a teleoperated rover")]
struct Cli {
    /// Path to the configuration file (missing file means defaults).
    #[arg(long, short, default_value = "rovlink.toml")]
    config: PathBuf,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the actuator host against simulated hardware.
    Actuator {
        /// Actuator identity announced in the handshake.
        #[arg(long)]
        id: Option<String>,
        /// Controller WebSocket URL, e.g. ws://10.0.0.2:5000.
        #[arg(long)]
        url: Option<String>,
    },
    /// Run the controller server with a teleop prompt.
    Controller {
        #[arg(long, short)]
        port: Option<u16>,
        /// Serve without the interactive prompt; stop with Ctrl-C.
        #[arg(long)]
        no_prompt: bool,
    },
    /// Write the default configuration to the config path.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Mode::Init { force } = cli.mode {
        return write_default_config(&cli.config, force);
    }

    // Tracing is installed before the runtime exists; see telemetry.rs.
    let _otel = telemetry::init_tracing("rovlink");

    let mut cfg = match config::load_from(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}: {e}", "Failed to start runtime".red());
            return ExitCode::FAILURE;
        }
    };

    print_banner();

    let result = match cli.mode {
        Mode::Actuator { id, url } => {
            if let Some(id) = id {
                cfg.actuator.actuator_id = id;
            }
            if let Some(url) = url {
                cfg.actuator.controller_url = url;
            }
            runtime.block_on(run_actuator(cfg))
        }
        Mode::Controller { port, no_prompt } => {
            if let Some(port) = port {
                cfg.controller.listen_port = port;
            }
            runtime.block_on(run_controller(cfg, !no_prompt))
        }
        Mode::Init { .. } => Ok(()),
    };

    // Do not wait for the prompt thread, which may still be blocked on stdin.
    runtime.shutdown_timeout(Duration::from_millis(200));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e}", "Error".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn write_default_config(path: &Path, force: bool) -> ExitCode {
    if path.exists() && !force {
        eprintln!(
            "{} already exists; pass {} to overwrite it",
            path.display().to_string().bold(),
            "--force".bold()
        );
        return ExitCode::FAILURE;
    }
    match config::save_to(&Config::default(), path) {
        Ok(()) => {
            println!("{} {}", "  ✓ Wrote".green(), path.display().to_string().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", "Config error".red());
            ExitCode::FAILURE
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actuator mode
// ─────────────────────────────────────────────────────────────────────────────

async fn run_actuator(cfg: Config) -> Result<(), RovError> {
    let host_config = cfg.host_config();
    println!(
        "  Actuator {} dialling {}",
        host_config.actuator_id.bold(),
        host_config.controller_url.cyan()
    );

    let (hardware, _probes) = SimHardware::full().build();
    let host = ActuatorHost::start(host_config, hardware);

    let handle = host.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping motors …".yellow().bold());
        handle.trigger();
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    host.wait().await;
    let dropped = host.telemetry_dropped();
    host.shutdown().await;

    info!(telemetry_dropped = dropped, "actuator exited");
    println!("{}", "  ✓ Motors stopped. Goodbye.".green());
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller mode
// ─────────────────────────────────────────────────────────────────────────────

async fn run_controller(cfg: Config, interactive: bool) -> Result<(), RovError> {
    let bus = EventBus::default();
    let controller = RobotController::new(
        bus.clone(),
        Duration::from_millis(cfg.controller.session_timeout_ms),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);

    let ctrlc_tx = shutdown_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting the controller down …".yellow().bold());
        ctrlc_tx.send_replace(true);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let server = ControllerServer::new(controller.clone())
        .with_port(cfg.controller.listen_port)
        .with_handshake_timeout(Duration::from_millis(cfg.controller.handshake_timeout_ms));
    println!(
        "  Controller listening on port {}",
        cfg.controller.listen_port.to_string().bold()
    );
    let mut server_task = tokio::spawn(server.run(shutdown_rx.clone()));

    tokio::spawn(log_events(
        [
            bus.subscribe_to(Topic::Acknowledgements),
            bus.subscribe_to(Topic::SafetyAlerts),
            bus.subscribe_to(Topic::Sessions),
        ],
        shutdown_rx.clone(),
    ));

    if interactive {
        let prompt_controller = controller.clone();
        let target = cfg.actuator.actuator_id.clone();
        let prompt_shutdown = shutdown_tx.clone();
        // The prompt blocks on stdin, so it gets its own thread.
        tokio::task::spawn_blocking(move || repl::run(prompt_controller, target, prompt_shutdown));
    }

    let mut shutdown = shutdown_rx;
    let joined = tokio::select! {
        // A server that stops on its own (e.g. the port is taken) ends the run.
        joined = &mut server_task => joined,
        _ = shutdown.wait_for(|stop| *stop) => server_task.await,
    };
    shutdown_tx.send_replace(true);

    match joined {
        Ok(result) => result,
        Err(e) => Err(RovError::Channel(format!("server task failed: {e}"))),
    }
}

/// Print acknowledgements, alerts and session changes as they arrive.
async fn log_events(receivers: [TopicReceiver; 3], mut shutdown: watch::Receiver<bool>) {
    let [mut acks, mut alerts, mut sessions] = receivers;
    loop {
        let event = tokio::select! {
            _ = shutdown.changed() => break,
            Some(event) = alerts.next() => event,
            Some(event) = acks.next() => event,
            Some(event) = sessions.next() => event,
            else => break,
        };
        println!("{}", describe(&event));
    }
}

fn describe(event: &Event) -> String {
    let id = event.actuator_id.as_str();
    let at = event.received_at.format("%H:%M:%S%.3f");
    let body = match &event.payload {
        EventPayload::MovementComplete {
            direction,
            actual_duration,
        } => format!("moved {direction} for {actual_duration:.2}s").green().to_string(),
        EventPayload::StopComplete => "stopped".green().to_string(),
        EventPayload::ObstacleAlert(alert) => match alert.distance_cm {
            Some(cm) => format!("OBSTACLE at {cm:.0} cm, motors stopped"),
            None => "OBSTACLE (sensor failure), motors stopped".to_string(),
        }
        .red()
        .bold()
        .to_string(),
        EventPayload::CommandRejected { reason } => format!("rejected: {reason}").yellow().to_string(),
        EventPayload::HardwareFault { component, details } => {
            format!("{component} fault: {details}").red().to_string()
        }
        EventPayload::SessionChanged { connected: true } => "connected".cyan().to_string(),
        EventPayload::SessionChanged { connected: false } => "disconnected".yellow().to_string(),
        EventPayload::Telemetry(sample) => format!("telemetry {}", sample.kind()),
    };
    format!("  {} {} {body}", at.to_string().dimmed(), format!("[{id}]").bold())
}

fn print_banner() {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().cyan());
    println!("{}", "  ║               rovlink                ║".bold().cyan());
    println!("{}", "  ║     teleoperated rover link host     ║".bold().cyan());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().cyan());
    println!();
}
