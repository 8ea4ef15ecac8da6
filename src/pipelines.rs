//! Ready-made workflows: search, currency conversion, research
//! coordination, blog writing, executive briefing and story refinement.
//!
//! Every builder takes the [`ModelRef`] its agents use; pair each with its
//! `*_PROMPT` to reproduce the demo run.

use crate::agent::{LlmAgent, ToolRef};
use crate::model::ModelRef;
use crate::tools::{currency_tools, ExitLoopTool};
use crate::types::BuiltinTool;
use crate::workflow::{CompositionError, LoopAgent, ParallelAgent, SequentialAgent, Workflow};

pub const SEARCH_PROMPT: &str =
    "What is the Agent Development Kit from Google? What languages is it available in?";
pub const CURRENCY_PROMPT: &str =
    "Convert 1,250 USD to INR using a Bank Transfer. Show me the precise calculation.";
pub const RESEARCH_PROMPT: &str =
    "What are the latest advancements in quantum computing and how might they impact AI?";
pub const BLOG_PROMPT: &str =
    "Write a blog post about the benefits of multi-agent systems for software developers.";
pub const BRIEFING_PROMPT: &str = "Run the daily executive briefing on Tech, Health, and Finance.";
pub const STORY_PROMPT: &str =
    "Write a short story about a lighthouse keeper who discovers a mysterious glowing map.";

/// Maximum critique/refine rounds in [`story_refinement`].
pub const STORY_MAX_ITERATIONS: u32 = 2;

/// A single agent answering with Google Search grounding.
pub fn search_assistant(model: &ModelRef) -> Result<Workflow, CompositionError> {
    let agent = LlmAgent::new("GenSearch", model.clone())
        .with_description("A simple agent that can answer general questions.")
        .with_instruction(
            "You are a helpful assistant. Use Google Search for current info or if unsure.",
        )
        .with_tool(BuiltinTool::GoogleSearch);
    Workflow::build(agent)
}

/// Fee and rate lookups plus a code-executing calculator agent.
pub fn currency_converter(model: &ModelRef) -> Result<Workflow, CompositionError> {
    let calculator = LlmAgent::new("CalculationAgent", model.clone())
        .with_description("Generates and runs Python code for arithmetic.")
        .with_instruction(
            "You are a specialized calculator that ONLY responds with Python code.
RULES:
1. Respond ONLY with a Python code block.
2. The code MUST calculate the result and print it.
3. Do NOT explain anything. No text before/after code.",
        )
        .with_tool(BuiltinTool::CodeExecution);

    let agent = LlmAgent::new("enhanced_currency_agent", model.clone())
        .with_instruction(
            "You are a smart currency conversion assistant.

Steps:
1. Use get_fee_for_payment_method() to determine the fee.
2. Use get_exchange_rate() to fetch conversion rate.
3. If any tool returns error, report that clearly.
4. DO NOT calculate manually. Use CalculationAgent to generate Python code for the computation.
5. Final response must:
   - Mention converted amount.
   - Include fee percentage, fee amount, amount after fee, and exchange rate.",
        )
        .with_tools(
            currency_tools()
                .into_iter()
                .map(ToolRef::LocalFunction)
                .collect(),
        )
        .with_tool(calculator);
    Workflow::build(agent)
}

/// A coordinator calling a researcher and a summarizer as tools.
pub fn research_coordinator(model: &ModelRef) -> Result<Workflow, CompositionError> {
    let researcher = LlmAgent::new("ResearchAgent", model.clone())
        .with_description("Finds cited information on a topic with Google Search.")
        .with_instruction(
            "You are a research specialist. Use google_search to find 2-3
relevant, cited pieces of information on the given topic.",
        )
        .with_tool(BuiltinTool::GoogleSearch)
        .with_output_key("research_findings");

    let summarizer = LlmAgent::new("SummarizerAgent", model.clone())
        .with_description("Summarizes the collected research findings.")
        .with_instruction(
            "Summarize these research findings in 3-5 concise bullet points:
{research_findings}",
        )
        .with_output_key("final_summary");

    let coordinator = LlmAgent::new("ResearchCoordinator", model.clone())
        .with_instruction(
            "You are a research coordinator. Follow these steps:
1. Call ResearchAgent to collect info.
2. Call SummarizerAgent to summarize findings.
3. Present a clear final summary.",
        )
        .with_tool(ToolRef::agent(researcher))
        .with_tool(ToolRef::agent(summarizer))
        .with_tool_execution(crate::types::ToolExecutionStrategy::Sequential);
    Workflow::build(coordinator)
}

/// Outline, draft, edit.
pub fn blog_pipeline(model: &ModelRef) -> Result<Workflow, CompositionError> {
    let outline = LlmAgent::new("OutlineAgent", model.clone())
        .with_instruction(
            "Create a blog outline for the given topic including:
- A catchy headline
- An engaging intro
- 3-5 main sections (with 2-3 bullet points each)
- A short conclusion.",
        )
        .with_output_key("blog_outline");

    let writer = LlmAgent::new("WriterAgent", model.clone())
        .with_instruction(
            "Using this outline: {blog_outline}
Write a 200-300 word blog post that is informative and engaging.",
        )
        .with_output_key("blog_draft");

    let editor = LlmAgent::new("EditorAgent", model.clone())
        .with_instruction(
            "Polish this blog draft for grammar, tone, and flow:
{blog_draft}",
        )
        .with_output_key("final_blog");

    Workflow::build(
        SequentialAgent::new("BlogPipeline")
            .then(outline)
            .then(writer)
            .then(editor),
    )
}

/// Three researchers in parallel, then an aggregator.
pub fn executive_briefing(model: &ModelRef) -> Result<Workflow, CompositionError> {
    let researcher = |name: &str, instruction: &str, key: &str| {
        LlmAgent::new(name, model.clone())
            .with_instruction(instruction)
            .with_tool(BuiltinTool::GoogleSearch)
            .with_output_key(key)
    };

    let team = ParallelAgent::new("ParallelResearchTeam")
        .with_member(researcher(
            "TechResearcher",
            "Research 3 key AI/ML trends with companies and impact (100 words).",
            "tech_research",
        ))
        .with_member(researcher(
            "HealthResearcher",
            "Research 3 major medical breakthroughs and applications (100 words).",
            "health_research",
        ))
        .with_member(researcher(
            "FinanceResearcher",
            "Research 3 major fintech trends with implications (100 words).",
            "finance_research",
        ));

    let aggregator = LlmAgent::new("AggregatorAgent", model.clone())
        .with_instruction(
            "Combine research findings:
- Tech: {tech_research}
- Health: {health_research}
- Finance: {finance_research}
Write a 200-word executive summary highlighting key themes and takeaways.",
        )
        .with_output_key("executive_summary");

    Workflow::build(
        SequentialAgent::new("ResearchSystem")
            .then(team)
            .then(aggregator),
    )
}

/// A first draft, then critique and refinement until approved or
/// [`STORY_MAX_ITERATIONS`] rounds have run.
pub fn story_refinement(model: &ModelRef) -> Result<Workflow, CompositionError> {
    let initial_writer = LlmAgent::new("InitialWriterAgent", model.clone())
        .with_instruction(
            "Write the first draft of a 150-word short story based on the prompt.
Output only the story text, no intro or explanation.",
        )
        .with_output_key("current_story");

    let critic = LlmAgent::new("CriticAgent", model.clone())
        .with_instruction(
            "You are a story critic. Review this story:
{current_story}
If it's excellent, reply EXACTLY 'APPROVED'.
Otherwise, give 2-3 actionable improvement suggestions.",
        )
        .with_output_key("critique");

    let refiner = LlmAgent::new("RefinerAgent", model.clone())
        .with_instruction(
            "Review the critique:
{critique}
If the critique is 'APPROVED', call exit_loop.
Otherwise, rewrite the story to improve it.",
        )
        .with_function_tool(ExitLoopTool::new())
        .with_output_key("current_story");

    Workflow::build(
        SequentialAgent::new("StoryPipeline")
            .then(initial_writer)
            .then(
                LoopAgent::new("StoryRefinementLoop", STORY_MAX_ITERATIONS)
                    .then(critic)
                    .then(refiner),
            ),
    )
}
