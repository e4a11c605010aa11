//! Symbion OpenStack Agent - cloud statistics collector
//!
//! This agent reports OpenStack usage to the Symbion network:
//! - Keystone authentication with project scope
//! - Project, hypervisor, flavor, server, volume and storage pool listings
//! - Aggregated statistics published over MQTT on a fixed interval
//! - One-shot mode printing JSON lines for debugging

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use symbion_agent_openstack::config::AgentConfig;
use symbion_agent_openstack::publisher::{self, MqttPublisher};
use symbion_agent_openstack::Collector;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Symbion OpenStack statistics agent
#[derive(Parser, Debug)]
#[command(name = "symbion-agent-openstack", version, about)]
struct Args {
    /// Path to configuration file (defaults to the OS config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run a single collection cycle and print JSON lines to stdout
    #[arg(long)]
    once: bool,

    /// Print the default configuration and exit
    #[arg(long)]
    dump_default_config: bool,

    /// Read a password from stdin and store it in the OS keyring
    #[arg(long)]
    store_password: bool,
}

/// Main agent state
struct Agent {
    config: AgentConfig,
    collector: Collector,
}

impl Agent {
    fn new(config: AgentConfig) -> Self {
        let collector = Collector::new(config.openstack.clone());
        Self { config, collector }
    }

    /// Single cycle to stdout
    async fn run_once(&self) -> Result<()> {
        let batch = self
            .collector
            .collect()
            .await
            .context("Unable to authenticate OpenStack user")?;

        let stdout = io::stdout();
        publisher::write_json_lines(
            &mut stdout.lock(),
            &batch,
            &self.config.collection.measurement_prefix,
            &self.config.mqtt.effective_client_id(),
            Utc::now(),
        )
    }

    /// One collection cycle handed to the publisher
    ///
    /// Authentication failures skip the cycle; the loop retries on the next
    /// tick.
    async fn tick(&self, publisher: &MqttPublisher) -> usize {
        match self.collector.collect().await {
            Ok(batch) => {
                let published = publisher.publish_batch(&batch);
                info!("Published {}/{} metric records", published, batch.len());
                published
            }
            Err(e) => {
                error!("Unable to authenticate OpenStack user: {}", e);
                0
            }
        }
    }

    /// Collect and publish on every tick until Ctrl-C
    async fn run(&self) -> Result<()> {
        let publisher = MqttPublisher::connect(
            &self.config.mqtt,
            &self.config.collection.measurement_prefix,
        );

        let period = self.config.collection.interval;
        info!("Collecting every {}", humantime::format_duration(period));

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(&publisher).await;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }

        Ok(())
    }
}

async fn store_password(path: Option<&std::path::Path>) -> Result<()> {
    let config = AgentConfig::read(path).await?;

    eprintln!("Password for {}:", config.openstack.username);
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("Empty password, nothing stored");
    }

    AgentConfig::save_password(&config.openstack.username, password)
        .context("Failed to store password in keyring")?;
    info!("Password stored in keyring for {}", config.openstack.username);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("symbion_agent_openstack=info")),
        )
        .with_writer(io::stderr)
        .init();

    if args.dump_default_config {
        print!("{}", AgentConfig::default_toml()?);
        return Ok(());
    }

    if args.store_password {
        return store_password(args.config.as_deref()).await;
    }

    let config = AgentConfig::load(args.config.as_deref())
        .await
        .context("Failed to load configuration")?;

    info!(
        "Symbion OpenStack agent v{} starting ({})",
        env!("CARGO_PKG_VERSION"),
        config.openstack.identity_endpoint
    );

    let agent = Agent::new(config);

    if args.once {
        agent.run_once().await
    } else {
        agent.run().await.context("Agent execution failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use symbion_agent_openstack::config::Password;
    use symbion_devkit::fixtures::{flavor, project, server};
    use symbion_devkit::{CloudFixtures, MqttBrokerStub, StubCloud};

    fn agent_config(cloud: &StubCloud, broker: &MqttBrokerStub, password: &str) -> AgentConfig {
        let mut config = AgentConfig::default();
        config.openstack.identity_endpoint = cloud.identity_endpoint();
        config.openstack.username = "admin".to_string();
        config.openstack.project = "admin".to_string();
        config.openstack.password = Some(Password::new(password));
        config.openstack.timeout_secs = 5;
        config.mqtt.broker_port = broker.port();
        config.mqtt.client_id = Some("agent-test".to_string());
        config
    }

    async fn cloud() -> StubCloud {
        let fixtures = CloudFixtures::new()
            .projects(vec![project("p1", "dev")])
            .flavors(vec![flavor("f1", 2, 4096, 20)])
            .servers(vec![server("s1", "ACTIVE", "f1", "p1")]);
        StubCloud::start(fixtures).await.unwrap()
    }

    #[tokio::test]
    async fn test_tick_publishes_cycle() {
        let cloud = cloud().await;
        let broker = MqttBrokerStub::start().await.unwrap();
        let agent = Agent::new(agent_config(&cloud, &broker, "Passw0rd"));
        let publisher = MqttPublisher::connect(&agent.config.mqtt, "openstack_");

        // identity_total + 4 server records
        assert_eq!(agent.tick(&publisher).await, 5);

        let received = broker.wait_for(5, Duration::from_secs(5)).await;
        assert_eq!(received.len(), 5);
        assert!(received
            .iter()
            .any(|m| m.topic == "symbion/openstack/metrics@v1/openstack_server_state_total"));
    }

    #[tokio::test]
    async fn test_tick_survives_rejected_credentials() {
        let cloud = cloud().await;
        let broker = MqttBrokerStub::start().await.unwrap();
        let agent = Agent::new(agent_config(&cloud, &broker, "wrong"));
        let publisher = MqttPublisher::connect(&agent.config.mqtt, "openstack_");

        assert_eq!(agent.tick(&publisher).await, 0);
        assert_eq!(agent.tick(&publisher).await, 0);
        assert_eq!(cloud.requests_matching("auth/tokens").len(), 2);
        assert!(broker.published().is_empty());
    }
}
