use std::path::Path;

use formcall_core::fields::FormSchema;
use formcall_core::handshake::SessionParams;
use serde_json::json;

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

/// Print a structured error to stderr and exit with status 1.
pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    eprintln!("{}", error_json("cli_error", message, docs_hint));
    std::process::exit(1);
}

pub fn error_json(kind: &str, message: &str, docs_hint: Option<&str>) -> String {
    let mut err = json!({
        "error": kind,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    serde_json::to_string_pretty(&err).unwrap_or_else(|_| message.to_string())
}

pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(formatted) => println!("{formatted}"),
        Err(_) => println!("{value}"),
    }
}

/// Load a form schema from a JSON file, or the default form when no path
/// is given. Accepts either a bare schema (`{"fields": [...]}`) or a full
/// session parameter payload (`{"formSchema": {...}}`).
pub fn load_schema(path: Option<&Path>) -> Result<FormSchema, String> {
    let Some(path) = path else {
        return Ok(FormSchema::default_form());
    };
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    parse_schema(&raw).map_err(|e| format!("{}: {e}", path.display()))
}

pub fn parse_schema(raw: &str) -> Result<FormSchema, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("Invalid JSON: {e}"))?;
    let params = if value.get("formSchema").is_some() {
        SessionParams::parse(raw).map_err(|e| e.to_string())?
    } else {
        let schema: FormSchema =
            serde_json::from_value(value).map_err(|e| format!("Invalid form schema: {e}"))?;
        let params = SessionParams::for_schema(&schema);
        params.validate().map_err(|e| e.to_string())?;
        params
    };
    Ok(params.form_schema.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_schema_and_payload_both_parse() {
        let bare = r#"{"fields":[{"id":"a","name":"city","type":"text","label":"City","required":false,"order":1}]}"#;
        let schema = parse_schema(bare).expect("bare schema");
        assert_eq!(schema.len(), 1);

        let payload = format!(r#"{{"formSchema":{bare}}}"#);
        assert_eq!(parse_schema(&payload).expect("payload"), schema);
    }

    #[test]
    fn duplicate_names_are_reported() {
        let raw = r#"{"fields":[
            {"id":"a","name":"city","type":"text","label":"City","required":false,"order":1},
            {"id":"b","name":"city","type":"text","label":"Town","required":false,"order":2}
        ]}"#;
        let err = parse_schema(raw).expect_err("duplicate name");
        assert!(err.contains("city"));
    }

    #[test]
    fn missing_path_yields_default_form() {
        let schema = load_schema(None).expect("default");
        assert_eq!(schema, FormSchema::default_form());
    }
}
