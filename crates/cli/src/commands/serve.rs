//! `harness serve`: Start the HTTP gateway.

use std::sync::Arc;
use std::time::Duration;

use harness_config::AppConfig;
use harness_core::event::EventBroadcaster;
use harness_gateway::GatewayState;

pub async fn run(
    mut config: AppConfig,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let events = EventBroadcaster::new(config.gateway.subscriber_buffer);
    let agent = super::build_agent(&config, Arc::new(events.clone()))?;
    let state = Arc::new(GatewayState::new(
        Arc::new(agent),
        events,
        Duration::from_secs(config.gateway.heartbeat_secs),
    ));

    let addr = config.gateway.addr();
    println!("Harness server starting on {addr}");
    println!("Model: {}", config.model);
    println!("Tools: read, list_dir, grep");

    harness_gateway::serve(state, &addr).await
}
