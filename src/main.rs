//! broker-bridge - publish to and subscribe from a Kafka cluster.
//!
//! Logs go to stderr; results and events go to stdout as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use broker_bridge::config::{resolve_hosts, resolve_or_default, ClientIdentity, DEFAULT_PRODUCER_CLIENT_ID};
use broker_bridge::telemetry::{init_logging, LogFormat};
use broker_bridge::{
    BridgeConfig, BrokerConnector, JsonLinesSink, KafkaConnector, Publisher, PublisherOptions,
    StopToken, Subscriber, SubscriberThread,
};

/// broker-bridge - at-least-once Kafka bridge
#[derive(Parser, Debug)]
#[command(name = "broker-bridge")]
#[command(author, version, about = "Publish to and subscribe from Kafka topics")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send one message to an existing topic
    Publish {
        #[arg(long)]
        topic: String,

        #[arg(long)]
        message: String,

        /// Comma-separated host:port list, overrides the config file
        #[arg(long, env = "BROKER_HOSTS")]
        hosts: Option<String>,

        /// YAML config file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Consume the configured topics and print each event as a JSON line
    Subscribe {
        /// YAML config file with a `subscriber` section
        #[arg(long)]
        config: PathBuf,
    },

    /// List the topics known to the cluster
    Topics {
        #[arg(long, env = "BROKER_HOSTS")]
        hosts: String,

        /// Metadata timeout in milliseconds
        #[arg(long, default_value = "10000")]
        timeout_ms: u64,
    },

    /// Serve the publish action over HTTP
    #[cfg(feature = "http")]
    Serve {
        #[arg(long, default_value = "0.0.0.0:3000")]
        addr: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(LogFormat::from_env()) {
        eprintln!("failed to initialize logging: {e}");
    }

    let result = match args.command {
        Commands::Publish {
            topic,
            message,
            hosts,
            config,
        } => publish(topic, message, hosts, config).await,
        Commands::Subscribe { config } => subscribe(&config).await,
        Commands::Topics { hosts, timeout_ms } => topics(&hosts, timeout_ms),
        #[cfg(feature = "http")]
        Commands::Serve { addr, config } => serve(&addr, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig, broker_bridge::ConfigError> {
    match path {
        Some(path) => BridgeConfig::load(path),
        None => Ok(BridgeConfig::default()),
    }
}

async fn publish(
    topic: String,
    message: String,
    hosts: Option<String>,
    config: Option<PathBuf>,
) -> CliResult {
    let config = load_config(config.as_deref())?;
    let publisher = Publisher::new(KafkaConnector::new(), PublisherOptions::from_config(&config));

    let delivery = tokio::task::spawn_blocking(move || {
        publisher.publish(&topic, &message, hosts.as_deref())
    })
    .await??;

    println!("{}", serde_json::to_string(&delivery)?);
    Ok(())
}

async fn subscribe(config: &Path) -> CliResult {
    let config = BridgeConfig::load(config)?;
    let subscriber = Subscriber::from_config(KafkaConnector::new(), &config, JsonLinesSink::stdout())?;

    let stop = StopToken::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping subscriber");
            signal.stop();
        }
    });

    let worker = SubscriberThread::spawn_with_token(subscriber, stop);
    let stats = tokio::task::spawn_blocking(move || worker.join()).await??;
    info!(
        polls = stats.polls,
        dispatched = stats.dispatched,
        committed = stats.committed,
        "subscriber finished"
    );
    Ok(())
}

fn topics(hosts: &str, timeout_ms: u64) -> CliResult {
    let endpoint = resolve_hosts(Some(hosts), None).ok_or("no broker hosts given")?;
    let identity = ClientIdentity::producer(resolve_or_default(None, DEFAULT_PRODUCER_CLIENT_ID));
    let names = KafkaConnector::new().list_topics(
        &endpoint,
        &identity,
        Duration::from_millis(timeout_ms),
    )?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

#[cfg(feature = "http")]
async fn serve(addr: &str, config: Option<PathBuf>) -> CliResult {
    let config = load_config(config.as_deref())?;
    let publisher = std::sync::Arc::new(Publisher::new(
        KafkaConnector::new(),
        PublisherOptions::from_config(&config),
    ));
    info!(addr, "serving publish action");
    broker_bridge::http::serve(publisher, addr).await?;
    Ok(())
}
