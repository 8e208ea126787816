// SPDX-License-Identifier: GPL-3.0-only
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use studio_brightness::brightness::Levels;
use studio_brightness::config::{Config, State};
use studio_brightness::daemon::{BrightnessService, ConnectionEvent, StepOutcome};
use studio_brightness::devices::apple::studio_display;
use studio_brightness::error::Status;
use studio_brightness::protocols::hidapi_backend::HidapiBackend;

#[macro_use]
extern crate tracing;

#[derive(Parser, Debug)]
#[command(version, about = "Control the brightness of an Apple Studio Display")]
struct Args {
    /// Config file (defaults to $XDG_CONFIG_HOME/studio-brightness/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Cmd {
    /// Print the current brightness
    Get,
    /// Set a raw brightness value (up to 60000)
    Set { value: u32 },
    /// Step one level brighter
    Up,
    /// Step one level dimmer
    Down,
    /// Jump to a level (1 = dimmest)
    Level { level: usize },
    /// Show the negotiated report layout
    Info,
    /// Show a brightness for a while, then restore the previous one
    Preview {
        value: u32,
        #[arg(short, long, default_value_t = 3)]
        seconds: u64,
        /// Keep the previewed brightness instead of restoring
        #[arg(short, long)]
        keep: bool,
    },
    /// Stay running and report when the display comes and goes
    Watch,
}

fn setup_logs(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    #[cfg(target_os = "linux")]
    if let Ok(journal_layer) = tracing_journald::layer() {
        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .with(journal_layer)
            .init();
        return;
    }

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}

fn check(status: Status) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(anyhow!("{}", status))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let loaded = Config::load(&config_path);
    let log_filter = loaded
        .as_ref()
        .map(|c| c.log_filter.clone())
        .unwrap_or_else(|_| studio_brightness::config::DEFAULT_LOG_FILTER.to_string());
    setup_logs(&log_filter);
    let config = loaded.unwrap_or_else(|e| {
        error!("errors loading config: {}", e);
        Config::default()
    });

    let levels = Levels::new(&config.levels);
    let service = BrightnessService::new(Box::new(HidapiBackend::new()), config);

    let result = run(&service, &levels, args.command).await;
    service.deinit().await;
    result
}

async fn run(service: &BrightnessService, levels: &Levels, command: Cmd) -> Result<()> {
    if command != Cmd::Watch {
        connect(service).await?;
    }

    match command {
        Cmd::Get => {
            let (status, value) = service.get_brightness().await;
            check(status)?;
            println!("{} ({})", value, levels.label(levels.level_for(value)));
        }
        Cmd::Set { value } => {
            let spec = &studio_display::SPEC;
            if value > spec.max_brightness_value {
                bail!(
                    "{} accepts values up to {}",
                    spec.name,
                    spec.max_brightness_value
                );
            }
            check(service.set_brightness(value).await)?;
            remember(levels.level_for(value));
            println!("{}", value);
        }
        Cmd::Up | Cmd::Down => {
            let index = step(service, levels, command == Cmd::Up).await?;
            println!("{}", levels.label(index));
        }
        Cmd::Level { level } => {
            if level == 0 || level > levels.len() {
                bail!("level must be between 1 and {}", levels.len());
            }
            let index = level - 1;
            check(service.set_brightness(levels.value(index)).await)?;
            remember(index);
            println!("{}", levels.label(index));
        }
        Cmd::Info => {
            let report = service
                .describe()
                .await
                .context("brightness device disconnected")?;
            let spec = &studio_display::SPEC;
            println!("device:         {}", spec.name);
            println!(
                "range:          {}..={} ({} steps)",
                spec.min_brightness_value,
                spec.max_brightness_value,
                spec.brightness_range()
            );
            println!("path:           {}", report.path);
            println!(
                "collection:     usage page {:#06x}, usage {:#06x}",
                report.caps.usage_page, report.caps.usage
            );
            for (name, caps) in [("input", report.input_caps), ("feature", report.feature_caps)] {
                println!(
                    "{:<15} report id {}, usage {:#06x}:{:#06x}, {} bytes",
                    format!("{}:", name),
                    caps.report_id,
                    caps.usage_page,
                    caps.usage,
                    caps.report_length
                );
            }
        }
        Cmd::Preview {
            value,
            seconds,
            keep,
        } => {
            let guard = service.begin_preview().await.map_err(|s| anyhow!("{}", s))?;
            println!("previewing {} (was {})", value, guard.original());
            tokio::task::spawn_blocking(move || -> Result<()> {
                guard.show(value)?;
                std::thread::sleep(Duration::from_secs(seconds));
                if keep {
                    guard.commit();
                }
                Ok(())
            })
            .await
            .context("preview crashed")??;
        }
        Cmd::Watch => watch(service).await?,
    }

    Ok(())
}

/// Connect with the startup policy, optionally waiting for the display
async fn connect(service: &BrightnessService) -> Result<()> {
    let status = service.init().await;
    if status != Status::DeviceNotFound || !service.config().wait_for_device {
        return check(status);
    }

    info!("Waiting for the display to be connected...");
    let (watcher, mut events) = service.spawn_watcher();
    let event = events.recv().await;
    tokio::task::spawn_blocking(move || watcher.stop()).await?;

    match event {
        Some(ConnectionEvent::Connected) => Ok(()),
        _ => check(Status::DeviceNotFound),
    }
}

/// Step one level from the current brightness
///
/// A failed write resets the remembered level to the default without writing
/// to the display again.
async fn step(service: &BrightnessService, levels: &Levels, up: bool) -> Result<usize> {
    let last_level = State::load_or_default(&State::default_path()).last_level;
    match service.step(levels, up, last_level).await {
        StepOutcome::Applied(index) => {
            remember(index);
            Ok(index)
        }
        StepOutcome::Reset { level, status } => {
            remember(level);
            Err(anyhow!("{}; level reset to {}", status, levels.label(level)))
        }
    }
}

fn remember(level: usize) {
    let state = State {
        last_level: Some(level),
    };
    if let Err(e) = state.save(&State::default_path()) {
        warn!("Failed to save state: {}", e);
    }
}

async fn watch(service: &BrightnessService) -> Result<()> {
    let status = service.init().await;
    match status {
        Status::Success => println!("connected"),
        Status::DeviceNotFound => println!("waiting for display"),
        other => check(other)?,
    }

    let (watcher, mut events) = service.spawn_watcher();
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Connected => {
                let (status, value) = service.get_brightness().await;
                if status.is_success() {
                    println!("connected, brightness {}", value);
                } else {
                    println!("connected");
                }
            }
            ConnectionEvent::Lost => println!("disconnected"),
            ConnectionEvent::GaveUp => {
                println!("display did not return, giving up");
                break;
            }
        }
    }

    tokio::task::spawn_blocking(move || watcher.stop()).await?;
    Ok(())
}
