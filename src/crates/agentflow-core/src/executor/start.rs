//! Start node - run entry point

use crate::error::Result;
use crate::executor::{ExecEnv, NodeExecutor, NodeOutcome};
use crate::graph::kinds;
use async_trait::async_trait;

/// Pass-through entry executor: its output is the raw run input.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartExecutor;

#[async_trait]
impl NodeExecutor for StartExecutor {
    fn kind(&self) -> &'static str {
        kinds::START
    }

    fn default_data(&self) -> serde_json::Value {
        serde_json::json!({"label": "Start"})
    }

    async fn execute(&self, env: &mut ExecEnv<'_>, _node: &crate::graph::Node) -> Result<NodeOutcome> {
        Ok(NodeOutcome::output(env.ctx.input.text.clone()))
    }
}
