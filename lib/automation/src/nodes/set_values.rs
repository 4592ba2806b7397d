//! Set-values node.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

use crate::plugin::{
    NodeCategory, NodeDefinition, NodePlugin, NodeResult, PortSpec, RunContext, ValidationOutcome,
};

/// Shapes a value object for downstream nodes.
///
/// The configured `values` object is emitted on the output port. Upstream
/// references in the configuration are interpolated by the engine before
/// `run` is invoked, so this node sees only resolved values.
pub struct SetValuesNode;

#[async_trait]
impl NodePlugin for SetValuesNode {
    fn definition(&self) -> NodeDefinition {
        NodeDefinition {
            sub_type: "core.set_values".to_string(),
            title: "Set values".to_string(),
            category: NodeCategory::Action,
            inputs: vec![PortSpec::optional("input")],
            outputs: vec![PortSpec::output("output")],
            config_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "values": {
                        "type": "object",
                        "description": "Key/value pairs emitted on the output port"
                    }
                }
            }),
            activation: None,
        }
    }

    fn validate(&self, config: &JsonValue) -> ValidationOutcome {
        match config.get("values") {
            None | Some(JsonValue::Object(_)) => ValidationOutcome::ok(),
            Some(_) => ValidationOutcome::fail_at("values", "values must be an object"),
        }
    }

    async fn run(&self, ctx: RunContext) -> NodeResult {
        let values = ctx
            .config
            .get("values")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let outputs: HashMap<String, JsonValue> =
            [("output".to_string(), values)].into_iter().collect();
        NodeResult::success(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::NodeStatus;

    #[test]
    fn validates_values_shape() {
        let node = SetValuesNode;
        assert!(node.validate(&serde_json::json!({"values": {"a": 1}})).valid);
        assert!(node.validate(&serde_json::json!({})).valid);
        assert!(!node.validate(&serde_json::json!({"values": []})).valid);
    }

    #[tokio::test]
    async fn emits_configured_values() {
        let ctx = RunContext::new(
            HashMap::new(),
            serde_json::json!({"values": {"status": "done", "count": 2}}),
        );

        let result = SetValuesNode.run(ctx).await;
        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(
            result.outputs.get("output"),
            Some(&serde_json::json!({"status": "done", "count": 2}))
        );
    }

    #[tokio::test]
    async fn missing_values_emit_empty_object() {
        let ctx = RunContext::new(HashMap::new(), serde_json::json!({}));
        let result = SetValuesNode.run(ctx).await;
        assert_eq!(result.outputs.get("output"), Some(&serde_json::json!({})));
    }
}
