//! Three researchers run concurrently, then an aggregator combines their
//! findings into an executive summary.
//!
//! Run with: GOOGLE_API_KEY=... cargo run --example briefing

use agentflow::pipelines::{executive_briefing, BRIEFING_PROMPT};
use agentflow::provider::GoogleProvider;
use agentflow::*;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env()?;
    let runner = Runner::new(GoogleProvider::new(&settings.base_url), &settings);
    let workflow = executive_briefing(&settings.model)?;

    println!("> {}\n", BRIEFING_PROMPT);

    let started = Instant::now();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let WorkflowEvent::NodeEnd { node } = event {
                println!("[{:>6.1}s] {} done", started.elapsed().as_secs_f64(), node);
            }
        }
    });

    let response = runner
        .run_with_events(&workflow, BRIEFING_PROMPT, tx, CancellationToken::new())
        .await;
    printer.await.ok();
    let response = response?;

    println!(
        "\n{}",
        response.state.get("executive_summary").unwrap_or_default()
    );
    Ok(())
}
