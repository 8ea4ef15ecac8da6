//! Single agent answering with Google Search grounding.
//!
//! Run with: GOOGLE_API_KEY=... cargo run --example search

use agentflow::pipelines::{search_assistant, SEARCH_PROMPT};
use agentflow::provider::GoogleProvider;
use agentflow::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env()?;
    let runner = Runner::new(GoogleProvider::new(&settings.base_url), &settings);
    let workflow = search_assistant(&settings.model)?;

    println!("> {}\n", SEARCH_PROMPT);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let WorkflowEvent::Agent {
                event:
                    AgentEvent::MessageUpdate {
                        delta: StreamDelta::Text { delta },
                        ..
                    },
                ..
            } = event
            {
                print!("{}", delta);
            }
        }
    });

    let response = runner
        .run_with_events(&workflow, SEARCH_PROMPT, tx, CancellationToken::new())
        .await;
    printer.await.ok();
    let response = response?;

    println!("\n\n--- Done ({}) ---", response.invocation_id);
    Ok(())
}
