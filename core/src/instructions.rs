//! System instructions steering the agent, derived from the form's fields.
//!
//! Output must be byte-for-byte reproducible for a given field list.

use crate::fields::FormField;

/// Used on its own when the form has no fields, and as the opening line otherwise.
pub const GENERIC_INSTRUCTION: &str =
    "You are a helpful voice assistant designed to collect information from users through conversation.";

const GOAL_STATEMENT: &str =
    "Your goal is to gather the following information through natural conversation:";

const STRATEGY: &str = "Instructions:
1. Be friendly, conversational, and natural
2. Ask for information in a logical order (required fields first, then optional)
3. Don't ask for all fields at once - gather them progressively through conversation
4. When you successfully collect a piece of information, use the updateFormField tool to save it
5. If a user provides information for multiple fields at once, extract and save each piece separately
6. Keep responses concise and engaging
7. After collecting all required fields, end the conversation, say thank you and goodbye. Don't ask for anything else.

Start by greeting the user and beginning to collect the required information naturally.";

/// One bullet per field: `- <label> (<REQUIRED|optional>): <type> field, name: "<name>"`.
pub fn describe_field(field: &FormField) -> String {
    let requirement = if field.required { "REQUIRED" } else { "optional" };
    format!(
        "- {} ({}): {} field, name: \"{}\"",
        field.label,
        requirement,
        field.field_type.as_str(),
        field.name
    )
}

pub fn build_instructions(fields: &[FormField]) -> String {
    if fields.is_empty() {
        return GENERIC_INSTRUCTION.to_string();
    }

    let mut sorted: Vec<&FormField> = fields.iter().collect();
    sorted.sort_by_key(|field| field.order);

    let descriptions = sorted
        .into_iter()
        .map(describe_field)
        .collect::<Vec<_>>()
        .join("\n");

    format!("{GENERIC_INSTRUCTION}\n\n{GOAL_STATEMENT}\n\n{descriptions}\n\n{STRATEGY}")
}
