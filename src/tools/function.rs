//! Function tools: a plain Rust function exposed to the model.
//!
//! Arguments are deserialized from the model's JSON call and the returned
//! record is serialized back, so the function itself stays typed and pure.

use crate::types::*;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Wraps `Fn(Args) -> Record` as an [`AgentTool`].
pub struct FunctionTool<A, R, F> {
    name: String,
    description: String,
    parameters: serde_json::Value,
    function: F,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R, F> FunctionTool<A, R, F>
where
    A: DeserializeOwned,
    R: Serialize,
    F: Fn(A) -> R + Send + Sync,
{
    /// `parameters` is the JSON schema the model sees for `A`.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
        function: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            function,
            _marker: PhantomData,
        }
    }

    /// Call the function directly, bypassing JSON.
    pub fn call(&self, args: A) -> R {
        (self.function)(args)
    }
}

#[async_trait::async_trait]
impl<A, R, F> AgentTool for FunctionTool<A, R, F>
where
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(A) -> R + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.parameters.clone()
    }

    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult, ToolError> {
        if ctx.cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }
        let args: A =
            serde_json::from_value(params).map_err(|e| ToolError::InvalidArgs(e.to_string()))?;
        let record = serde_json::to_value((self.function)(args))
            .map_err(|e| ToolError::Failed(format!("Could not encode result: {}", e)))?;
        Ok(ToolResult::json(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Args {
        a: i64,
        b: i64,
    }

    #[derive(Serialize)]
    struct Sum {
        total: i64,
    }

    fn adder() -> FunctionTool<Args, Sum, impl Fn(Args) -> Sum + Send + Sync> {
        FunctionTool::new(
            "add",
            "Adds two integers",
            serde_json::json!({
                "type": "object",
                "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
                "required": ["a", "b"]
            }),
            |args: Args| Sum {
                total: args.a + args.b,
            },
        )
    }

    #[tokio::test]
    async fn test_executes_with_json_args() {
        let tool = adder();
        let result = tool
            .execute(serde_json::json!({"a": 2, "b": 3}), ToolContext::detached("add"))
            .await
            .unwrap();
        assert_eq!(result.details, serde_json::json!({"total": 5}));
        assert!(!result.escalate);
    }

    #[tokio::test]
    async fn test_bad_args_are_invalid() {
        let tool = adder();
        let err = tool
            .execute(serde_json::json!({"a": "two"}), ToolContext::detached("add"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs(_)));
    }
}
