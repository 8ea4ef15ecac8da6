//! Sequential pipeline: outline, draft, edit.
//!
//! Run with: GOOGLE_API_KEY=... cargo run --example blog

use agentflow::pipelines::{blog_pipeline, BLOG_PROMPT};
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
    let workflow = blog_pipeline(&settings.model)?;

    println!("> {}\n", BLOG_PROMPT);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                WorkflowEvent::NodeStart { node, kind: "agent" } => println!("== {} ==", node),
                WorkflowEvent::StateWritten { key, author } => {
                    println!("   {} wrote '{}'", author, key)
                }
                _ => {}
            }
        }
    });

    let response = runner
        .run_with_events(&workflow, BLOG_PROMPT, tx, CancellationToken::new())
        .await;
    printer.await.ok();
    let response = response?;

    println!("\n{}", response.state.get("final_blog").unwrap_or_default());
    Ok(())
}
