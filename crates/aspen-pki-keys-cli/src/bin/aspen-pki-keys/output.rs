//! Rendering of key management responses.
//!
//! `--json` prints the response as the handler produced it. Otherwise a short
//! operator summary is printed, with warnings on their own lines.

use aspen_pki_keys::KeyEntry;
use aspen_pki_keys::KeysResponse;

/// Print `output` as JSON or as text.
pub fn print_output(output: &KeysOutput, json: bool) {
    let rendered = if json {
        serde_json::to_string_pretty(&output.to_json())
            .unwrap_or_else(|e| format!(r#"{{"error": "unprintable response: {e}"}}"#))
    } else {
        output.to_human()
    };
    println!("{rendered}");
}

/// A handler response ready for printing.
pub struct KeysOutput {
    response: KeysResponse,
}

impl KeysOutput {
    pub fn new(response: KeysResponse) -> Self {
        Self { response }
    }

    pub fn is_success(&self) -> bool {
        self.response.is_success()
    }

    /// The response as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.response)
            .unwrap_or_else(|e| serde_json::json!({ "error": format!("unprintable response: {e}") }))
    }

    /// Operator-facing summary of the response.
    pub fn to_human(&self) -> String {
        if let Some(error) = self.response.error() {
            return format!("Error: {error}");
        }

        let mut out = match &self.response {
            KeysResponse::ListResult(result) if result.keys.is_empty() => "No keys found".to_string(),
            KeysResponse::ListResult(result) => {
                let mut lines = vec![format!("Keys ({}):", result.keys.len()), format!("{:<38} NAME", "ID")];
                lines.extend(result.keys.iter().map(|id| {
                    let name = result.key_info.get(id).map(|info| info.name.as_str()).unwrap_or("");
                    format!("{:<38} {}", id, display_name(name))
                }));
                lines.join("\n")
            }
            KeysResponse::KeyResult(result) => match &result.key {
                Some(key) if result.existing => format!("Key material already registered\n{}", format_key(key)),
                Some(key) => format_key(key),
                None => "No key returned".to_string(),
            },
            KeysResponse::DeleteResult(result) => match &result.id {
                Some(id) => format!("Deleted key {id}"),
                None => "Deleted".to_string(),
            },
            KeysResponse::DefaultResult(result) => match &result.default {
                Some(id) => format!("Default key: {id}"),
                None => "No default key configured".to_string(),
            },
        };

        for warning in self.response.warnings() {
            out.push_str("\nWarning: ");
            out.push_str(warning);
        }
        out
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "-" } else { name }
}

fn format_key(key: &KeyEntry) -> String {
    let backing = if key.backing.is_empty() { "stored" } else { key.backing.as_str() };
    format!(
        "Key ID:    {}\n\
         Name:      {}\n\
         Type:      {}\n\
         Backing:   {}",
        key.id,
        display_name(&key.name),
        key.key_type,
        backing
    )
}
