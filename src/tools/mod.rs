pub mod agent_tool;
pub mod exit_loop;
pub mod function;
pub mod payments;

pub use agent_tool::SubAgentTool;
pub use exit_loop::ExitLoopTool;
pub use function::FunctionTool;
pub use payments::{
    exchange_rate_tool, fee_lookup_tool, get_exchange_rate, get_fee_for_payment_method,
    FeeLookup, RateLookup,
};

use crate::types::AgentTool;

/// The currency tools: fee lookup and exchange rate.
pub fn currency_tools() -> Vec<std::sync::Arc<dyn AgentTool>> {
    vec![
        std::sync::Arc::new(fee_lookup_tool()),
        std::sync::Arc::new(exchange_rate_tool()),
    ]
}
