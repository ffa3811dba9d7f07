//! `pirobot` – runs the PiRobot demo robot on simulated hardware.
//!
//! 1. Loads `~/.pirobot/config.toml`, writing the defaults on first run, and
//!    applies `PIROBOT_*` environment overrides.
//! 2. Installs logging, forwarding every log line to the telemetry bus.
//! 3. Echoes network-table updates (robot mode, battery voltage) to the
//!    console from a small Tokio runtime.
//! 4. Runs the robot until **Ctrl-C**, then shuts down cleanly.

mod config;
mod demo;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use pirobot_middleware::{TelemetryBus, Topic};
use pirobot_runtime::Robot;
use pirobot_runtime::telemetry::{init_tracing_with, log_format_from_env};
use pirobot_types::TelemetryPayload;
use tracing::{error, info};

fn main() -> ExitCode {
    print_banner();

    let cfg = load_config();
    let bus = Arc::new(TelemetryBus::default());
    let format = log_format_from_env().unwrap_or(cfg.log_format);
    let _guard = init_tracing_with("pirobot", format, Some(bus.clone()));

    let robot = match Robot::with_sink(cfg.profile.clone(), demo::DemoRobot::new(cfg.auto_enable), bus.clone()) {
        Ok(robot) => robot,
        Err(e) => {
            println!("{}: {e}", "Invalid configuration".red());
            return ExitCode::FAILURE;
        }
    };

    let echo = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => Some(rt),
        Err(e) => {
            error!(error = %e, "failed to build the console echo runtime");
            None
        }
    };
    let (echo_stop, mut echo_stopped) = tokio::sync::oneshot::channel::<()>();
    let echo_thread = echo.map(|rt| {
        let mut entries = bus.subscribe_to(Topic::NetworkTable);
        std::thread::spawn(move || {
            rt.block_on(async move {
                loop {
                    tokio::select! {
                        _ = &mut echo_stopped => break,
                        event = entries.next() => match event {
                            Some(event) => {
                                if let TelemetryPayload::TableEntry { key, value } = event.payload {
                                    println!("  {} {} = {}", "▸".cyan(), key.bold(), value);
                                }
                            }
                            None => break,
                        },
                    }
                }
            });
        })
    });

    println!(
        "  Rate {} ms, watchdog {} ms, auto-enable {}.  Press {} to stop.\n",
        cfg.profile.periodic_function_rate_ms,
        cfg.profile.watchdog_timeout().as_millis(),
        if cfg.auto_enable { "on".green() } else { "off".yellow() },
        "Ctrl-C".bold()
    );

    let result = robot.run();
    drop(robot);
    let _ = echo_stop.send(());
    if let Some(handle) = echo_thread {
        let _ = handle.join();
    }

    match result {
        Ok(()) => {
            info!("bye");
            println!("{}", "  ✓ Robot stopped.".green());
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}: {e}", "Robot failed".red());
            ExitCode::FAILURE
        }
    }
}

fn load_config() -> config::Config {
    let mut cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {e}", "Error saving config".red()),
            }
            cfg
        }
        Err(e) => {
            println!("{}: {e}", "Config error".red());
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    config::apply_env_overrides(&mut cfg);
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"   ___  _ ___       _         _   "#.bold().cyan());
    println!("{}", r#"  | _ \(_) _ \ ___ | |__  ___| |_ "#.bold().cyan());
    println!("{}", r#"  |  _/| |   // _ \| '_ \/ _ \  _|"#.bold().cyan());
    println!("{}", r#"  |_|  |_|_|_\\___/|_.__/\___/\__|"#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "PiRobot".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Robot control loop on simulated hardware");
    println!();
}
