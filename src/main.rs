use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::Parser;
use tracing::info;

use mqtt_tui::broker::RumqttClient;
use mqtt_tui::config::{FileConfig, Overrides, Settings};
use mqtt_tui::connection::ConnectionManager;
use mqtt_tui::tui::app::{DashboardState, ExitStatus};
use mqtt_tui::tui::screen::TerminalScreen;
use mqtt_tui::tui::{event, input, runner};

#[derive(Parser)]
#[command(
    name = "mqtt-tui",
    version,
    about = "Watch the latest payload of every subscribed MQTT topic. Press any key to quit."
)]
struct Cli {
    /// Broker address (host, host:port, tcp://host:port)
    broker: String,

    /// Topic filters to subscribe to (wildcards allowed, e.g. '#')
    #[arg(required = true)]
    topics: Vec<String>,

    /// Quality of service for every subscription
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    qos: Option<u8>,

    /// MQTT client identifier
    #[arg(long)]
    client_id: Option<String>,

    /// YAML settings file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write logs here (discarded otherwise; the terminal belongs to the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("mqtt_tui=info".parse()?);
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::sink)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
            err.print()?;
            return Ok(code);
        }
    };

    init_logging(cli.log_file.as_ref())?;

    let file = match cli.config.as_deref().map(FileConfig::load).transpose() {
        Ok(file) => file.unwrap_or_default(),
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };
    let overrides = Overrides {
        qos: cli.qos,
        client_id: cli.client_id,
    };
    let settings = match Settings::resolve(&cli.broker, &cli.topics, overrides, file) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(ExitCode::FAILURE);
        }
    };

    info!(broker = %settings.broker, topics = settings.subscriptions.len(), "mqtt-tui starting");

    let (events, receiver) = event::channel();
    let connection = ConnectionManager::new(
        RumqttClient::new(settings.client_options()),
        settings.subscriptions.clone(),
        events.clone(),
        settings.retry_delay,
        settings.disconnect_grace,
    )
    .spawn();

    let mut screen = TerminalScreen::enter()?;
    let listener = input::spawn_key_listener(events);

    let outcome = runner::run_loop(DashboardState::new(), receiver, &mut screen).await;
    screen.restore()?;
    let outcome = outcome?;

    for line in &outcome.final_lines {
        println!("{line}");
    }
    if let ExitStatus::Failure(reason) = &outcome.status {
        eprintln!("error: {reason}");
    }

    info!(connected = connection.is_connected(), "shutting down");
    connection.shutdown(settings.disconnect_grace).await;
    let _ = listener.await;

    Ok(ExitCode::from(outcome.status.code()))
}
