//! Built-in structural nodes.
//!
//! Integration nodes (GitHub, Slack, AI providers, record-change triggers)
//! ship in their own packages and register through the
//! [`NodeRegistry`](crate::registry::NodeRegistry). The nodes here are the
//! structural minimum the engine itself relies on: entry points for manual
//! and webhook invocation, the delay node that exercises suspend/resume,
//! and a value-shaping action.

mod delay;
mod manual;
mod set_values;
mod webhook;

pub use delay::DelayNode;
pub use manual::ManualTriggerNode;
pub use set_values::SetValuesNode;
pub use webhook::WebhookTriggerNode;

use crate::plugin::NodePlugin;
use std::sync::Arc;

/// Returns one instance of every built-in node plugin.
#[must_use]
pub fn builtins() -> Vec<Arc<dyn NodePlugin>> {
    vec![
        Arc::new(ManualTriggerNode),
        Arc::new(WebhookTriggerNode),
        Arc::new(DelayNode),
        Arc::new(SetValuesNode),
    ]
}
