//! MyEvents service runner.
//!
//! - `myevents-service --service users --conf ./user-config.json`
//! - `myevents-service --service bookings --broker memory`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use myevents_config::ServiceConfig;
use myevents_log::LogConfig;
use myevents_messaging::BrokerConnector;
use myevents_messaging::memory::InMemoryBroker;
use myevents_service::{ServiceKind, ServiceRuntime};
use tracing::info;

/// Message broker transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BrokerKind {
    /// RabbitMQ at `amqp_message_broker`
    Amqp,
    /// In-process broker, nothing leaves the process
    Memory,
}

/// Runs the event processor of one MyEvents service
#[derive(Parser)]
#[command(name = "myevents-service")]
#[command(version)]
#[command(about = "Consume MyEvents events and store them in the service database")]
struct Cli {
    /// Path to the JSON or TOML configuration file
    #[arg(long, env = "MYEVENTS_CONF", default_value = "./config.json")]
    conf: PathBuf,

    /// Which service to run
    #[arg(long, value_enum)]
    service: ServiceKind,

    /// Broker transport
    #[arg(long, value_enum, default_value_t = BrokerKind::Amqp)]
    broker: BrokerKind,
}

fn connector(kind: BrokerKind, config: &ServiceConfig) -> anyhow::Result<Arc<dyn BrokerConnector>> {
    match kind {
        BrokerKind::Memory => Ok(InMemoryBroker::new().connector()),
        #[cfg(feature = "rabbitmq")]
        BrokerKind::Amqp => Ok(myevents_messaging::RabbitMqConnector::shared(
            config.amqp_message_broker.clone(),
        )),
        #[cfg(not(feature = "rabbitmq"))]
        BrokerKind::Amqp => {
            let _ = config;
            anyhow::bail!("built without the rabbitmq feature, use --broker memory")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    myevents_log::init(&LogConfig::from_env()).context("could not initialize logging")?;

    let config = ServiceConfig::extract(Some(&cli.conf))
        .with_context(|| format!("could not load configuration from {}", cli.conf.display()))?;

    let runtime = ServiceRuntime::start(cli.service, &config, connector(cli.broker, &config)?)
        .await
        .context("could not start service")?;

    runtime
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Could not listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!(service = %cli.service, "Service stopped");
    Ok(())
}
