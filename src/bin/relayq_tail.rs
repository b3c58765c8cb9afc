//! relayq-tail: print broadcast messages as they arrive.
//!
//! Subscribes a configured consumer broker to one subject and logs every
//! message until Ctrl-C.
//!
//! ## Configuration
//! - RELAYQ_CONFIG: broker config file (see `relayq::config`)
//! - RELAYQ_TAIL_ALIAS: consumer broker alias (default: first argument)
//! - RELAYQ_TAIL_SUBJECT: subject to follow (default: second argument)
//! - RELAYQ_TAIL_GROUP: consumer group (default: "relayq-tail")
//! - RELAYQ_LOG: log filter (default: info)

use std::time::Duration;

use tracing::{error, info};

use relayq::broker::BrokerManager;
use relayq::config::Config;
use relayq::registry::DriverRegistry;
use relayq::utils::bootstrap::init_tracing;
use relayq::wait::Next;

const DEFAULT_GROUP: &str = "relayq-tail";
const POLL_TIMEOUT: Duration = Duration::from_secs(1);

fn setting(var: &str, position: usize) -> Option<String> {
    std::env::var(var).ok().or_else(|| std::env::args().nth(position))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let alias = setting("RELAYQ_TAIL_ALIAS", 1).ok_or("missing consumer alias")?;
    let subject = setting("RELAYQ_TAIL_SUBJECT", 2).ok_or("missing subject")?;
    let group = std::env::var("RELAYQ_TAIL_GROUP").unwrap_or_else(|_| DEFAULT_GROUP.to_string());

    let config = Config::load(None)?;
    let registry = DriverRegistry::with_default_drivers();
    let brokers = BrokerManager::open(&registry, &config).await;

    let consumer = brokers.consumer(&alias)?;
    let subscriber = consumer.subscribe(&subject, &group).await?;

    info!(alias = %alias, subject = %subject, group = %group, "relayq-tail started");

    let tail = async {
        loop {
            match subscriber.next(POLL_TIMEOUT).await {
                Next::Message(msg) => info!(
                    message_id = %msg.message_id,
                    priority = msg.priority,
                    options = ?msg.options,
                    published_at = ?msg.published_at(),
                    bytes = msg.body.len(),
                    "Message"
                ),
                Next::TimedOut => continue,
                Next::Failed(e) => {
                    error!(error = %e, "Subscription failed");
                    return;
                }
            }
        }
    };

    tokio::select! {
        _ = tail => {}
        result = tokio::signal::ctrl_c() => result?,
    }

    subscriber.close().await?;
    brokers.close().await;
    info!("relayq-tail stopped");
    Ok(())
}
