use std::path::Path;

use formcall_core::bridge::form_tools;
use formcall_core::instructions::build_instructions;
use serde_json::json;

use crate::util::{error_json, load_schema, print_json};

/// Print the agent instructions (and optionally the tool definitions) a
/// call with this form would be configured with.
pub fn run(schema_path: Option<&Path>, with_tools: bool) -> i32 {
    let schema = match load_schema(schema_path) {
        Ok(schema) => schema,
        Err(message) => {
            eprintln!("{}", error_json("invalid_schema", &message, None));
            return 4;
        }
    };

    let fields = &schema.fields;
    if with_tools {
        print_json(&json!({
            "instructions": build_instructions(fields),
            "tools": form_tools(fields),
        }));
    } else {
        println!("{}", build_instructions(fields));
    }
    0
}
