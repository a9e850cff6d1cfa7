use std::path::Path;

use formcall_core::fields::FormSchema;
use formcall_core::handshake::SessionParams;
use serde_json::json;

use crate::util::{error_json, load_schema, print_json};

/// Print the default form as a session parameter payload.
pub fn default_form() -> i32 {
    let params = SessionParams::for_schema(&FormSchema::default_form());
    match serde_json::to_value(&params) {
        Ok(value) => {
            print_json(&value);
            0
        }
        Err(e) => {
            eprintln!("{}", error_json("cli_error", &e.to_string(), None));
            1
        }
    }
}

/// Check a schema file the way the server checks the handshake.
pub fn validate(schema_path: &Path) -> i32 {
    match load_schema(Some(schema_path)) {
        Ok(schema) => {
            let fields: Vec<_> = schema
                .sorted_fields()
                .into_iter()
                .map(|field| {
                    json!({
                        "name": field.name,
                        "type": field.field_type.as_str(),
                        "required": field.required,
                    })
                })
                .collect();
            print_json(&json!({"valid": true, "fields": fields}));
            0
        }
        Err(message) => {
            eprintln!(
                "{}",
                error_json(
                    "invalid_schema",
                    &message,
                    Some("Field ids and names must be unique; types are text, email, tel, date or textarea."),
                )
            );
            1
        }
    }
}
