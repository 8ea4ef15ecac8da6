//! The loop exit signal as a tool.

use crate::types::*;
use async_trait::async_trait;

/// Calling this ends the innermost enclosing loop after the current turn.
#[derive(Debug, Default, Clone)]
pub struct ExitLoopTool;

impl ExitLoopTool {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentTool for ExitLoopTool {
    fn name(&self) -> &str {
        "exit_loop"
    }

    fn label(&self) -> &str {
        "Exit Loop"
    }

    fn description(&self) -> &str {
        "Call this function ONLY when the critique is 'APPROVED', indicating the story is finished and no more changes are needed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    fn signals_exit(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        _params: serde_json::Value,
        _ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        let mut result = ToolResult::json(serde_json::json!({
            "status": "approved",
            "message": "Story approved. Exiting loop.",
        }));
        result.escalate = true;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exit_loop_escalates() {
        let result = ExitLoopTool
            .execute(serde_json::json!({}), ToolContext::detached("exit_loop"))
            .await
            .unwrap();
        assert!(result.escalate);
        assert_eq!(result.details["status"], "approved");
        assert_eq!(result.details["message"], "Story approved. Exiting loop.");
    }
}
