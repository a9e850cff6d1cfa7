use serde_json::json;

use crate::util::{client, error_json, print_json};

/// Exit codes: 0=healthy, 2=unexpected status, 3=connection error
pub async fn run(api_url: &str) -> i32 {
    let resp = match client().get(format!("{api_url}/health")).send().await {
        Ok(r) => r,
        Err(e) => {
            eprintln!(
                "{}",
                error_json(
                    "connection_error",
                    &e.to_string(),
                    Some("Is the voice server running? Check FORMCALL_API_URL."),
                )
            );
            return 3;
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp
        .json()
        .await
        .unwrap_or_else(|e| json!({"raw_error": format!("Failed to parse response as JSON: {e}")}));

    if status.is_success() {
        print_json(&body);
        0
    } else {
        eprintln!("{}", error_json("unhealthy", &format!("HTTP {status}: {body}"), None));
        2
    }
}
