//! A coordinator delegating to a researcher and a summarizer exposed as
//! tools. The summarizer reads what the researcher stored in state.
//!
//! Run with: GOOGLE_API_KEY=... cargo run --example research

use agentflow::pipelines::{research_coordinator, RESEARCH_PROMPT};
use agentflow::provider::GoogleProvider;
use agentflow::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings::from_env()?;
    let runner = Runner::new(GoogleProvider::new(&settings.base_url), &settings);
    let workflow = research_coordinator(&settings.model)?;

    println!("> {}\n", RESEARCH_PROMPT);
    let response = runner.run(&workflow, RESEARCH_PROMPT).await?;

    for key in ["research_findings", "final_summary"] {
        if let Some(entry) = response.state.entry(key) {
            println!("--- {} (by {}) ---\n{}\n", key, entry.author, entry.value);
        }
    }
    println!("--- Coordinator ---\n{}", response.final_response);
    Ok(())
}
