//! Pure predicates classifying a method name (and, for `workspace/executeCommand`, a
//! command name) against a backend's capabilities object, as advertised in its
//! `initialize` response.

use serde_json::Value;

/// Does `capabilities` (a backend's cached `initialize` result) support `method`?
///
/// Any method not covered by the table below is not routable on capability grounds;
/// callers route it to the primary unconditionally.
pub fn supports_method(capabilities: &Value, method: &str) -> bool {
    match method {
        "textDocument/completion" => capabilities.get("completionProvider").is_some(),
        "completionItem/resolve" => capabilities
            .pointer("/completionProvider/resolveProvider")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        "textDocument/signatureHelp" => capabilities.get("signatureHelpProvider").is_some(),
        "textDocument/formatting" => is_truthy(capabilities.get("documentFormattingProvider")),
        "textDocument/rangeFormatting" => {
            is_truthy(capabilities.get("documentRangeFormattingProvider"))
        }
        "textDocument/codeAction" => is_truthy(capabilities.get("codeActionProvider")),
        _ => false,
    }
}

/// Does `capabilities` advertise support for executing `command` via
/// `workspace/executeCommand`?
pub fn supports_command(capabilities: &Value, command: &str) -> bool {
    capabilities
        .pointer("/executeCommandProvider/commands")
        .and_then(Value::as_array)
        .map(|commands| commands.iter().any(|c| c.as_str() == Some(command)))
        .unwrap_or(false)
}

/// A provider field is "truthy" if present and not `false` (LSP allows either a boolean
/// or an options object for several provider fields).
fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Null) => false,
        Some(_) => true,
    }
}

/// The set of method names the Routing Resolver may send to a non-primary backend.
pub const ROUTABLE_METHODS: &[&str] = &[
    "textDocument/completion",
    "completionItem/resolve",
    "textDocument/signatureHelp",
    "textDocument/formatting",
    "textDocument/rangeFormatting",
    "workspace/executeCommand",
];

pub fn is_routable(method: &str) -> bool {
    ROUTABLE_METHODS.contains(&method)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn completion_requires_provider_presence() {
        let caps = json!({ "completionProvider": {} });
        assert!(supports_method(&caps, "textDocument/completion"));
        assert!(!supports_method(&json!({}), "textDocument/completion"));
    }

    #[test]
    fn resolve_requires_true_flag() {
        let caps = json!({ "completionProvider": { "resolveProvider": true } });
        assert!(supports_method(&caps, "completionItem/resolve"));

        let caps = json!({ "completionProvider": {} });
        assert!(!supports_method(&caps, "completionItem/resolve"));
    }

    #[test]
    fn formatting_accepts_bool_or_object() {
        assert!(supports_method(
            &json!({ "documentFormattingProvider": true }),
            "textDocument/formatting"
        ));
        assert!(supports_method(
            &json!({ "documentFormattingProvider": {} }),
            "textDocument/formatting"
        ));
        assert!(!supports_method(
            &json!({ "documentFormattingProvider": false }),
            "textDocument/formatting"
        ));
    }

    #[test]
    fn execute_command_checks_command_membership() {
        let caps = json!({ "executeCommandProvider": { "commands": ["fmt", "lint"] } });
        assert!(supports_command(&caps, "fmt"));
        assert!(!supports_command(&caps, "unknown"));
    }

    #[test]
    fn unknown_method_is_unsupported_by_the_table() {
        assert!(!supports_method(&json!({}), "workspace/symbol"));
    }

    #[test]
    fn routable_set_matches_resolver_methods() {
        assert!(is_routable("textDocument/completion"));
        assert!(is_routable("workspace/executeCommand"));
        assert!(!is_routable("textDocument/hover"));
    }
}
