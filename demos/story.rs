//! Iterative refinement: a first draft, then critique and rewrite rounds
//! until the critic approves or the round limit is hit.
//!
//! Run with: GOOGLE_API_KEY=... cargo run --example story

use agentflow::pipelines::{story_refinement, STORY_PROMPT};
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
    let workflow = story_refinement(&settings.model)?;

    println!("> {}\n", STORY_PROMPT);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let WorkflowEvent::LoopIteration { name, iteration } = event {
                println!("-- {} round {} --", name, iteration);
            }
        }
    });

    let response = runner
        .run_with_events(&workflow, STORY_PROMPT, tx, CancellationToken::new())
        .await;
    printer.await.ok();
    let response = response?;

    if let Some(report) = response.loop_report("StoryRefinementLoop") {
        match &report.termination {
            Termination::ExitSignal { agent, iteration } => {
                println!("Approved: {} exited in round {}", agent, iteration)
            }
            Termination::MaxIterationsReached { iterations } => {
                println!("Stopped after {} rounds without approval", iterations)
            }
        }
    }
    println!("\n{}", response.state.get("current_story").unwrap_or_default());
    Ok(())
}
