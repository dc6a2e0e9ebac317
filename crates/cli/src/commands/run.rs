//! `harness run`: One prompt, printed as it streams.

use std::sync::Arc;

use harness_agent::StopReason;
use harness_config::AppConfig;
use harness_core::event::EventListener;
use tokio_util::sync::CancellationToken;

/// Prints agent progress to the terminal.
struct ConsoleListener;

impl EventListener for ConsoleListener {
    fn on_text(&self, text: &str) {
        println!("{text}");
    }

    fn on_tool_call(&self, id: &str, name: &str, input: &serde_json::Value) {
        println!("  [tool] {name} ({id}) {input}");
    }

    fn on_tool_result(&self, id: &str, result: &str, is_error: bool) {
        let label = if is_error { "error" } else { "ok" };
        let first = result.lines().next().unwrap_or_default();
        let more = result.lines().count().saturating_sub(1);
        if more > 0 {
            println!("  [{label}] {id}: {first} (+{more} lines)");
        } else {
            println!("  [{label}] {id}: {first}");
        }
    }

    fn on_reasoning(&self, text: &str) {
        eprintln!("  (thinking) {text}");
    }
}

pub async fn run(config: AppConfig, message: String) -> Result<(), Box<dyn std::error::Error>> {
    let agent = super::build_agent(&config, Arc::new(ConsoleListener))?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling...");
            on_ctrl_c.cancel();
        }
    });

    let outcome = agent.prompt(message, &cancel).await?;
    if outcome.stop == StopReason::MaxTurns {
        eprintln!(
            "  Stopped after {} turns with tool requests outstanding",
            outcome.turns
        );
    }
    Ok(())
}
