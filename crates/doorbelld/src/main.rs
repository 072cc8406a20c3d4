use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use doorbelld::controller::event_channel;
use doorbelld::controller::indicator::run_indicator;
use doorbelld::controller::indicator::DEFAULT_CYCLE_LENGTH;
use doorbelld::controller::indicator::INDICATOR_TICK;
use doorbelld::controller::Collaborators;
use doorbelld::controller::Controller;
use doorbelld::controller::Exit;
use doorbelld::controller::IndicatorBoard;
use doorbelld::controller::IndicatorPattern;
use doorbelld::controller::Lamp;
use doorbelld::controller::SystemClock;
use doorbelld::integrations::gpio::run_console;
use doorbelld::integrations::gpio::SimulatedDoor;
use doorbelld::integrations::gpio::SimulatedLamps;
use doorbelld::integrations::linphone::Linphone;
use doorbelld::integrations::media::CommandCamera;
use doorbelld::integrations::media::CommandPlayer;
use doorbelld::integrations::mqtt::MqttBridge;
use doorbelld::integrations::mqtt::RumqttcClient;
use doorbelld::integrations::pushover::Pushover;
use doorbelld::Config;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Time for the MQTT event loop to deliver the final status before exiting
const MQTT_FLUSH: Duration = Duration::from_secs(1);

/// Doorbell monitor: answers the door in Auto mode, calls an operator in Manual mode and
/// reports status to the home manager over MQTT.
#[derive(Parser)]
#[command(name = "doorbelld", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(default_value = "doorbelld.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.targets())
        .init();

    info!("doorbelld starting");
    info!("Loaded config from: {}", cli.config.display());

    match run(&config).await? {
        Exit::Shutdown => {
            info!("doorbelld shutdown complete");
            Ok(())
        }
        Exit::Restart => restart(),
    }
}

async fn run(config: &Config) -> anyhow::Result<Exit> {
    let (events, event_rx) = event_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut bridge = MqttBridge::new(RumqttcClient::new(&config.mqtt), &config.mqtt);
    bridge
        .start(events.clone())
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start MQTT bridge: {}", e))?;
    let bridge = Arc::new(bridge);

    let indicator = Arc::new(IndicatorBoard::new(
        DEFAULT_CYCLE_LENGTH,
        IndicatorPattern::new(Lamp::Blink, Lamp::Blink, DEFAULT_CYCLE_LENGTH),
    ));
    let indicator_task = tokio::spawn(run_indicator(
        indicator.clone(),
        Box::new(SimulatedLamps::default()),
        INDICATOR_TICK,
    ));

    let door = SimulatedDoor::new();
    let console_task = tokio::spawn(run_console(door.ring_line(), events));

    let collaborators = Collaborators {
        camera: Arc::new(CommandCamera::from(&config.media)),
        player: Arc::new(CommandPlayer::from(&config.media)),
        telephony: Arc::new(Linphone::from_config(config)),
        notifier: Arc::new(Pushover::new(&config.pushover)),
        door: Box::new(door),
        status: bridge.clone(),
        clock: Arc::new(SystemClock),
    };
    let controller = Controller::new(
        config,
        collaborators,
        indicator.clone(),
        event_rx,
        shutdown_rx,
    );

    #[cfg(feature = "api")]
    let api = config.api.as_ref().map(|api_config| {
        let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel();
        let task = tokio::spawn(doorbelld::api::serve(
            api_config.listen.clone(),
            api_config.port,
            controller.status_receiver(),
            api_shutdown_rx,
        ));
        (api_shutdown_tx, task)
    });

    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    info!("Press Ctrl+C to exit");
    let exit = controller.run().await;

    signal_task.abort();
    console_task.abort();
    if let Err(e) = indicator_task.await {
        error!("Indicator task failed: {}", e);
    }

    #[cfg(feature = "api")]
    if let Some((api_shutdown_tx, task)) = api {
        let _ = api_shutdown_tx.send(());
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("HTTP API server error: {}", e),
            Err(e) => error!("HTTP API task failed: {}", e),
        }
    }

    tokio::time::sleep(MQTT_FLUSH).await;
    Ok(exit)
}

/// Replace this process with a fresh copy of the same binary and arguments.
fn restart() -> anyhow::Result<()> {
    let exe = std::env::current_exe().context("Failed to locate the doorbelld executable")?;
    info!("Restarting {}", exe.display());

    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(err).with_context(|| format!("Failed to re-execute {}", exe.display()))
}
