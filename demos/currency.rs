//! Currency conversion with fee/rate lookup tools and a calculator agent.
//!
//! Run with: GOOGLE_API_KEY=... cargo run --example currency

use agentflow::pipelines::{currency_converter, CURRENCY_PROMPT};
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
    let workflow = currency_converter(&settings.model)?;

    println!("> {}\n", CURRENCY_PROMPT);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let WorkflowEvent::Agent { agent, event } = event {
                match event {
                    AgentEvent::ToolExecutionStart {
                        tool_name, args, ..
                    } => {
                        println!("[{}] -> {}({})", agent, tool_name, args);
                    }
                    AgentEvent::ToolExecutionEnd {
                        tool_name,
                        result,
                        is_error,
                        ..
                    } => {
                        let text: String = result
                            .content
                            .iter()
                            .filter_map(|c| match c {
                                Content::Text { text } => Some(text.as_str()),
                                _ => None,
                            })
                            .collect();
                        let tag = if is_error { "error" } else { "ok" };
                        println!("[{}] <- {} ({}): {}", agent, tool_name, tag, text);
                    }
                    _ => {}
                }
            }
        }
    });

    let response = runner
        .run_with_events(&workflow, CURRENCY_PROMPT, tx, CancellationToken::new())
        .await;
    printer.await.ok();
    let response = response?;

    println!("\n{}", response.final_response);
    Ok(())
}
