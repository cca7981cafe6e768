use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;
use chrono::Utc;
use tracing::{error, info};

use metarmap::{
    AviationWeatherClient, FrameOrchestrator, MetarMapConfig, MetarMapError, sink, telemetry,
};

#[derive(FromArgs)]
/// Drive an addressable LED strip from live METAR flight categories
struct Args {
    /// path to the TOML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// enable debug logging
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// validate the configuration, print a summary and exit
    #[argh(switch)]
    check: bool,
}

#[tokio::main]
async fn main() {
    let args: Args = argh::from_env();

    if let Err(e) = run(args).await {
        match e.downcast_ref::<MetarMapError>() {
            Some(map_error) => eprintln!("Error: {}", map_error.user_message()),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = MetarMapConfig::load_from_path(args.config)?;

    if args.check {
        print_summary(&config);
        return Ok(());
    }

    telemetry::init_tracing(&config.logging, args.verbose)?;
    info!(
        "metarmap {} starting with {} airports",
        metarmap::VERSION,
        config.airports.len()
    );

    let source = AviationWeatherClient::new(&config.fetch)?;
    let sink = sink::from_config(&config.led).with_context(|| "Failed to open LED output")?;
    let config = Arc::new(config);
    let orchestrator = FrameOrchestrator::new(config, Arc::new(source), sink, Utc::now());

    if let Err(e) = orchestrator.run(shutdown_signal()).await {
        error!("Frame loop failed: {}", e);
        return Err(e.into());
    }

    info!("metarmap stopped");
    Ok(())
}

fn print_summary(config: &MetarMapConfig) {
    println!("Configuration OK");
    println!("  airports:  {}", config.airports.join(","));
    println!(
        "  LEDs:      {} on pin {} ({:?}, brightness {:.2})",
        config.led.count, config.led.pin, config.led.color_order, config.led.brightness
    );
    println!(
        "  frames:    every {} ms to {:?}",
        config
            .led
            .frame_interval(config.animation.fade_instead_of_blink)
            .as_millis(),
        config.led.output
    );
    println!(
        "  fetch:     every {}s (retry {}s), {}h lookback from {}",
        config.fetch.every_s,
        config.fetch.error_retry_s,
        config.fetch.lookback_hours,
        config.fetch.api_base
    );
    println!(
        "  stale:     after {}s",
        config.fetch.staleness_window().as_secs()
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}
