//! The `updateFormField` capability: how it is described to the agent and how
//! its invocations land in the form and the transcript.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::conversation::{ConversationEntry, ConversationLog};
use crate::fields::{FormBuilder, FormField};

pub const UPDATE_FORM_FIELD: &str = "updateFormField";

/// A capability offered to the agent, with a JSON Schema for its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub fn update_form_field_tool() -> ToolDefinition {
    ToolDefinition {
        name: UPDATE_FORM_FIELD.to_string(),
        description: "Update a form field with user-provided information. Stores the value \
                      against the field whose name matches fieldName."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "fieldName": {
                    "type": "string",
                    "description": "The name of the field to update"
                },
                "value": {
                    "type": "string",
                    "description": "The value provided by the user"
                }
            },
            "required": ["fieldName", "value"],
            "additionalProperties": false
        }),
    }
}

/// Tools to register for a form: exactly `updateFormField`, or nothing for an
/// empty form.
pub fn form_tools(fields: &[FormField]) -> Vec<ToolDefinition> {
    if fields.is_empty() {
        Vec::new()
    } else {
        vec![update_form_field_tool()]
    }
}

/// What the tool callback hands back to the agent. Never an error.
pub fn acknowledgement() -> Value {
    json!({})
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFormFieldArgs {
    pub field_name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Updated { field_id: String },
    UnknownField { field_name: String },
    InvalidArguments,
    /// A tool other than `updateFormField`; only logged to the transcript.
    Ignored,
}

/// Apply one tool invocation delivered by the session.
///
/// Appends exactly one `toolInvocation` and one `toolResult` entry whatever
/// the outcome. Unknown field names are dropped with a warning.
pub fn apply_tool_call(
    form: &mut FormBuilder,
    log: &mut ConversationLog,
    tool_name: &str,
    parameters: &Value,
    output: &Value,
) -> BridgeOutcome {
    let outcome = if tool_name != UPDATE_FORM_FIELD {
        tracing::debug!(tool = tool_name, "ignoring invocation of unregistered tool");
        BridgeOutcome::Ignored
    } else {
        match serde_json::from_value::<UpdateFormFieldArgs>(parameters.clone()) {
            Ok(args) => match form.apply_tool_value(&args.field_name, args.value) {
                Some(field_id) => {
                    tracing::debug!(field = %args.field_name, "form field updated by agent");
                    BridgeOutcome::Updated { field_id }
                }
                None => {
                    tracing::warn!(
                        field = %args.field_name,
                        "agent tried to update a field that is not in the form"
                    );
                    BridgeOutcome::UnknownField {
                        field_name: args.field_name,
                    }
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "malformed updateFormField arguments");
                BridgeOutcome::InvalidArguments
            }
        }
    };

    log.push(ConversationEntry::ToolInvocation {
        tool_name: tool_name.to_string(),
        parameters: parameters.clone(),
    });
    log.push(ConversationEntry::ToolResult {
        tool_name: tool_name.to_string(),
        output: output.clone(),
    });

    outcome
}
