//! The node plugin contract.
//!
//! Every node type — trigger or action, built-in or shipped by a third-party
//! integration package — implements [`NodePlugin`]. The contract is a flat
//! capability interface: static metadata, pure config validation, the `run`
//! unit of work, optional dynamic form options, and (for triggers) the
//! activation hook pair. Plugins carry no engine dependencies; everything
//! they need at runtime arrives through [`RunContext`].
//!
//! Contract invariant: `run` must not assume it is called in-process
//! contiguously with earlier invocations of the same execution. It may be
//! re-entered in a fresh process after a resume. Any state a node needs
//! across a pause must travel in [`NodeResult::outputs`]; persisting it is
//! the engine's responsibility, not the node's.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use slatebase_core::WorkflowId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::node::NodeId;

/// The category of a node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeCategory {
    /// Entry points that originate executions.
    Trigger,
    /// Nodes that perform work on upstream data.
    Action,
}

/// How a trigger registers external listeners on publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationType {
    /// The trigger registers a webhook with an external system.
    Webhook,
}

/// A named port slot on a node type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSpec {
    /// The name of this port.
    pub name: String,
    /// Whether an incoming edge is required (inputs only).
    pub required: bool,
}

impl PortSpec {
    /// Creates a required input port.
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    /// Creates an optional input port.
    #[must_use]
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }

    /// Creates an output port.
    #[must_use]
    pub fn output(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// Static metadata describing a node type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Registry key, e.g. `"core.delay"` or `"github.trigger"`.
    pub sub_type: String,
    /// Human-readable title for the node palette.
    pub title: String,
    /// Trigger or action.
    pub category: NodeCategory,
    /// Input port slots.
    pub inputs: Vec<PortSpec>,
    /// Output port slots.
    pub outputs: Vec<PortSpec>,
    /// JSON Schema for the configuration form.
    pub config_schema: JsonValue,
    /// Activation mechanism, for triggers that register external listeners.
    pub activation: Option<ActivationType>,
}

/// A single validation problem, addressed by JSON path into the config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Path into the config object, e.g. `"duration_ms"`.
    pub path: String,
    /// Human-readable message.
    pub message: String,
}

impl ValidationIssue {
    /// Creates a new issue.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The result of validating a node configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Whether the configuration is usable.
    pub valid: bool,
    /// Problems found; empty when valid.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationOutcome {
    /// A passing outcome.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            issues: Vec::new(),
        }
    }

    /// A failing outcome with the given issues.
    #[must_use]
    pub fn fail(issues: Vec<ValidationIssue>) -> Self {
        Self {
            valid: false,
            issues,
        }
    }

    /// A failing outcome with a single issue.
    #[must_use]
    pub fn fail_at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::fail(vec![ValidationIssue::new(path, message)])
    }
}

/// Severity of a node log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// A log line emitted by a node during `run`, recorded with the execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Severity.
    pub level: LogLevel,
    /// Message text.
    pub message: String,
    /// When the line was emitted.
    pub at: DateTime<Utc>,
}

/// Execution-scoped log collector handed to nodes through [`RunContext`].
///
/// Entries are drained by the engine after `run` returns and merged into
/// the recorded [`NodeResult`].
#[derive(Debug, Clone, Default)]
pub struct NodeLogger {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl NodeLogger {
    /// Creates an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a log entry.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let entry = LogEntry {
            level,
            message: message.into(),
            at: Utc::now(),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    /// Records an info-level entry.
    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    /// Records a warn-level entry.
    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Drains all recorded entries.
    #[must_use]
    pub fn drain(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(mut entries) => std::mem::take(&mut *entries),
            Err(_) => Vec::new(),
        }
    }
}

/// Everything a node receives for one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Resolved input values, keyed by input port name. For a trigger in
    /// test mode this is empty; during execution trigger outputs are seeded
    /// directly from the triggering payload and `run` is not invoked.
    pub inputs: HashMap<String, JsonValue>,
    /// The node configuration with upstream references already interpolated.
    pub config: JsonValue,
    /// When set, the node must return representative sample output without
    /// performing side effects.
    pub test_mode: bool,
    /// Execution-scoped logger.
    pub logger: NodeLogger,
}

impl RunContext {
    /// Creates a context for a live run.
    #[must_use]
    pub fn new(inputs: HashMap<String, JsonValue>, config: JsonValue) -> Self {
        Self {
            inputs,
            config,
            test_mode: false,
            logger: NodeLogger::new(),
        }
    }

    /// Creates a context for a test-mode run.
    #[must_use]
    pub fn test(config: JsonValue) -> Self {
        Self {
            inputs: HashMap::new(),
            config,
            test_mode: true,
            logger: NodeLogger::new(),
        }
    }

    /// Returns the value of an input port, if populated.
    #[must_use]
    pub fn input(&self, port: &str) -> Option<&JsonValue> {
        self.inputs.get(port)
    }
}

/// Outcome status of a node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// The node finished and produced its outputs.
    Success,
    /// The node failed; the execution halts with status `error`.
    Error,
    /// The node requests suspension until `resume_at`.
    Waiting,
}

/// Timing information recorded with each node invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Wall-clock duration of the `run` call in milliseconds.
    pub execution_time_ms: u64,
}

/// The result of a node invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// Output values keyed by output port name.
    pub outputs: HashMap<String, JsonValue>,
    /// Outcome status.
    pub status: NodeStatus,
    /// Error message when status is `Error`.
    pub error: Option<String>,
    /// Log entries emitted during the invocation.
    pub logs: Vec<LogEntry>,
    /// Timing metrics, filled in by the engine.
    pub metrics: NodeMetrics,
    /// When to resume, required when status is `Waiting`. A `Waiting`
    /// status with `resume_at` is the sole suspend signal the engine
    /// recognizes.
    pub resume_at: Option<DateTime<Utc>>,
}

impl NodeResult {
    /// A successful result with the given outputs.
    #[must_use]
    pub fn success(outputs: HashMap<String, JsonValue>) -> Self {
        Self {
            outputs,
            status: NodeStatus::Success,
            error: None,
            logs: Vec::new(),
            metrics: NodeMetrics::default(),
            resume_at: None,
        }
    }

    /// A failed result with the given error message.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            outputs: HashMap::new(),
            status: NodeStatus::Error,
            error: Some(message.into()),
            logs: Vec::new(),
            metrics: NodeMetrics::default(),
            resume_at: None,
        }
    }

    /// A suspend request. `outputs` must already contain everything the
    /// execution needs downstream; the node is not re-entered after resume.
    #[must_use]
    pub fn waiting(resume_at: DateTime<Utc>, outputs: HashMap<String, JsonValue>) -> Self {
        Self {
            outputs,
            status: NodeStatus::Waiting,
            error: None,
            logs: Vec::new(),
            metrics: NodeMetrics::default(),
            resume_at: Some(resume_at),
        }
    }
}

/// An option entry for dynamic configuration form lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Display label.
    pub label: String,
    /// Value stored in the config when selected.
    pub value: JsonValue,
}

/// Context passed to trigger activation hooks.
#[derive(Debug, Clone)]
pub struct ActivationContext {
    /// The workflow being published or unpublished.
    pub workflow_id: WorkflowId,
    /// The trigger node being activated or deactivated.
    pub node_id: NodeId,
    /// The trigger node's configuration.
    pub config: JsonValue,
}

/// Opaque per-node state returned by `on_activate` and passed back verbatim
/// to `on_deactivate`. Owned by the activation manager; never inspected by
/// the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivationState(JsonValue);

impl ActivationState {
    /// Wraps an arbitrary JSON value.
    #[must_use]
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    /// Returns the wrapped value.
    #[must_use]
    pub fn as_value(&self) -> &JsonValue {
        &self.0
    }

    /// Unwraps into the inner value.
    #[must_use]
    pub fn into_value(self) -> JsonValue {
        self.0
    }
}

/// Errors surfaced by plugin capabilities outside of `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// The configuration is unusable for the requested operation.
    InvalidConfig { message: String },
    /// An activation hook failed against the external system.
    Hook { message: String },
    /// The requested option list key is not provided by this plugin.
    UnknownOptionKey { key: String },
    /// An activation hook was invoked on a plugin that is not a trigger.
    NotATrigger,
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig { message } => write!(f, "invalid config: {message}"),
            Self::Hook { message } => write!(f, "activation hook failed: {message}"),
            Self::UnknownOptionKey { key } => write!(f, "unknown option key: {key}"),
            Self::NotATrigger => write!(f, "activation hooks require a trigger node"),
        }
    }
}

impl std::error::Error for PluginError {}

/// The contract every node type implements.
#[async_trait]
pub trait NodePlugin: Send + Sync {
    /// Static metadata for this node type.
    fn definition(&self) -> NodeDefinition;

    /// Validates a configuration. Pure and side-effect free; called before
    /// save and before activation.
    fn validate(&self, config: &JsonValue) -> ValidationOutcome;

    /// Executes the node's unit of work.
    async fn run(&self, ctx: RunContext) -> NodeResult;

    /// Returns dynamic option lists for the configuration form. Never
    /// invoked during `run`.
    async fn fetch_options(
        &self,
        key: &str,
        _config: &JsonValue,
    ) -> Result<Vec<SelectOption>, PluginError> {
        Err(PluginError::UnknownOptionKey {
            key: key.to_string(),
        })
    }

    /// Registers external listeners when the owning workflow is published.
    /// Triggers only; called exactly once per publish transition and must be
    /// idempotent against retry (the activation manager may call again after
    /// a crash before persisting the returned state).
    async fn on_activate(&self, _ctx: &ActivationContext) -> Result<ActivationState, PluginError> {
        Err(PluginError::NotATrigger)
    }

    /// Tears down external listeners when the owning workflow is
    /// unpublished. Receives the state returned by `on_activate` verbatim.
    async fn on_deactivate(
        &self,
        _ctx: &ActivationContext,
        _state: ActivationState,
    ) -> Result<(), PluginError> {
        Err(PluginError::NotATrigger)
    }

    /// Names of input variables exposed to the form UI.
    fn input_variables(&self) -> Vec<String> {
        self.definition()
            .inputs
            .into_iter()
            .map(|port| port.name)
            .collect()
    }

    /// Names of output variables exposed to downstream configuration forms.
    fn output_variables(&self) -> Vec<String> {
        self.definition()
            .outputs
            .into_iter()
            .map(|port| port.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;

    #[async_trait]
    impl NodePlugin for Probe {
        fn definition(&self) -> NodeDefinition {
            NodeDefinition {
                sub_type: "test.probe".to_string(),
                title: "Probe".to_string(),
                category: NodeCategory::Action,
                inputs: vec![PortSpec::required("input")],
                outputs: vec![PortSpec::output("output")],
                config_schema: serde_json::json!({"type": "object"}),
                activation: None,
            }
        }

        fn validate(&self, _config: &JsonValue) -> ValidationOutcome {
            ValidationOutcome::ok()
        }

        async fn run(&self, ctx: RunContext) -> NodeResult {
            ctx.logger.info("probing");
            NodeResult::success(ctx.inputs)
        }
    }

    #[test]
    fn validation_outcome_fail_at() {
        let outcome = ValidationOutcome::fail_at("path", "must be set");
        assert!(!outcome.valid);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].path, "path");
    }

    #[test]
    fn node_result_constructors() {
        let ok = NodeResult::success(HashMap::new());
        assert_eq!(ok.status, NodeStatus::Success);
        assert!(ok.error.is_none());

        let failed = NodeResult::error("boom");
        assert_eq!(failed.status, NodeStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("boom"));

        let at = Utc::now();
        let suspended = NodeResult::waiting(at, HashMap::new());
        assert_eq!(suspended.status, NodeStatus::Waiting);
        assert_eq!(suspended.resume_at, Some(at));
    }

    #[test]
    fn logger_drains_entries() {
        let logger = NodeLogger::new();
        logger.info("one");
        logger.warn("two");

        let entries = logger.drain();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[1].level, LogLevel::Warn);

        // Draining empties the buffer.
        assert!(logger.drain().is_empty());
    }

    #[tokio::test]
    async fn default_hooks_reject_non_triggers() {
        let plugin = Probe;
        let ctx = ActivationContext {
            workflow_id: WorkflowId::new(),
            node_id: NodeId::new(),
            config: JsonValue::Null,
        };

        let result = plugin.on_activate(&ctx).await;
        assert_eq!(result.unwrap_err(), PluginError::NotATrigger);
    }

    #[tokio::test]
    async fn default_variables_derive_from_ports() {
        let plugin = Probe;
        assert_eq!(plugin.input_variables(), vec!["input".to_string()]);
        assert_eq!(plugin.output_variables(), vec!["output".to_string()]);
    }

    #[tokio::test]
    async fn run_collects_logs_through_context() {
        let plugin = Probe;
        let ctx = RunContext::new(HashMap::new(), JsonValue::Null);
        let logger = ctx.logger.clone();

        let result = plugin.run(ctx).await;
        assert_eq!(result.status, NodeStatus::Success);
        assert_eq!(logger.drain().len(), 1);
    }
}
