//! Configuration: a JSON array of backend descriptions, passed as the proxy's sole
//! command-line argument.

use std::fmt;
use std::fs;
use std::path::Path;

use serde_derive::Deserialize;
use serde_json::Value;

/// How a single backend is reached.
#[derive(Clone, Debug, PartialEq)]
pub enum Endpoint {
    Process { cmd: String, args: Vec<String> },
    Tcp { host: String, port: u16 },
}

/// One element of the configuration array, after validation.
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub endpoint: Endpoint,
    pub initialization_options: Value,
    pub use_completion: bool,
    pub use_signature_help: bool,
    pub use_formatting: bool,
    pub use_execute_command: bool,
    pub use_diagnostics: bool,
    /// `true` for the first element of the array; the primary receives every
    /// non-routable client request.
    pub is_primary: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_true() -> bool {
    true
}

/// The raw, as-written shape of one configuration element. Deserialized first, then
/// checked and turned into a [`BackendConfig`].
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
struct RawBackendConfig {
    cmd: Option<String>,
    args: Vec<String>,
    port: Option<u16>,
    #[serde(default = "default_host")]
    host: String,
    #[serde(rename = "initializationOptions")]
    initialization_options: Value,
    #[serde(rename = "useCompletion")]
    use_completion: bool,
    #[serde(rename = "useSignatureHelp")]
    use_signature_help: bool,
    #[serde(rename = "useFormatting")]
    use_formatting: bool,
    #[serde(rename = "useExecuteCommand")]
    use_execute_command: bool,
    #[serde(rename = "useDiagnostics", default = "default_true")]
    use_diagnostics: bool,
}

impl Default for RawBackendConfig {
    fn default() -> Self {
        RawBackendConfig {
            cmd: None,
            args: Vec::new(),
            port: None,
            host: default_host(),
            initialization_options: Value::Null,
            use_completion: false,
            use_signature_help: false,
            use_formatting: false,
            use_execute_command: false,
            use_diagnostics: true,
        }
    }
}

#[derive(Debug)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ConfigError {}

/// Reads and validates the configuration file at `path`.
pub fn load(path: &Path) -> Result<Vec<BackendConfig>, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("cannot read config file {}: {}", path.display(), e)))?;
    parse(&text)
}

/// Parses and validates configuration text. Split out from [`load`] for testability.
pub fn parse(text: &str) -> Result<Vec<BackendConfig>, ConfigError> {
    let raw: Vec<RawBackendConfig> = serde_json::from_str(text)
        .map_err(|e| ConfigError(format!("malformed configuration: {}", e)))?;

    if raw.is_empty() {
        return Err(ConfigError("configuration array must contain at least one backend".into()));
    }

    raw.into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let endpoint = match (&entry.cmd, entry.port) {
                (Some(cmd), None) => {
                    Endpoint::Process { cmd: cmd.clone(), args: entry.args.clone() }
                }
                (None, Some(port)) => Endpoint::Tcp { host: entry.host.clone(), port },
                (Some(_), Some(_)) => {
                    return Err(ConfigError(format!(
                        "backend {}: 'cmd' and 'port' are mutually exclusive",
                        i
                    )))
                }
                (None, None) => {
                    return Err(ConfigError(format!(
                        "backend {}: one of 'cmd' or 'port' is required",
                        i
                    )))
                }
            };

            Ok(BackendConfig {
                endpoint,
                initialization_options: entry.initialization_options,
                use_completion: entry.use_completion,
                use_signature_help: entry.use_signature_help,
                use_formatting: entry.use_formatting,
                use_execute_command: entry.use_execute_command,
                use_diagnostics: entry.use_diagnostics,
                is_primary: i == 0,
            })
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_minimal_stdio_backend() {
        let backends = parse(r#"[{"cmd": "rust-analyzer"}]"#).unwrap();
        assert_eq!(backends.len(), 1);
        assert!(backends[0].is_primary);
        assert!(backends[0].use_diagnostics);
        match &backends[0].endpoint {
            Endpoint::Process { cmd, args } => {
                assert_eq!(cmd, "rust-analyzer");
                assert!(args.is_empty());
            }
            Endpoint::Tcp { .. } => panic!("expected a process endpoint"),
        }
    }

    #[test]
    fn parses_tcp_backend_with_default_host() {
        let backends = parse(r#"[{"cmd": "a"}, {"port": 4000}]"#).unwrap();
        match &backends[1].endpoint {
            Endpoint::Tcp { host, port } => {
                assert_eq!(host, "127.0.0.1");
                assert_eq!(*port, 4000);
            }
            Endpoint::Process { .. } => panic!("expected a tcp endpoint"),
        }
        assert!(!backends[1].is_primary);
    }

    #[test]
    fn rejects_both_cmd_and_port() {
        let err = parse(r#"[{"cmd": "a", "port": 1}]"#).unwrap_err();
        assert!(err.0.contains("mutually exclusive"));
    }

    #[test]
    fn rejects_neither_cmd_nor_port() {
        let err = parse(r#"[{"useCompletion": true}]"#).unwrap_err();
        assert!(err.0.contains("required"));
    }

    #[test]
    fn rejects_empty_array() {
        let err = parse("[]").unwrap_err();
        assert!(err.0.contains("at least one"));
    }

    #[test]
    fn only_first_backend_is_primary() {
        let backends = parse(r#"[{"cmd": "a"}, {"cmd": "b"}, {"cmd": "c"}]"#).unwrap();
        assert!(backends[0].is_primary);
        assert!(!backends[1].is_primary);
        assert!(!backends[2].is_primary);
    }

    #[test]
    fn use_diagnostics_defaults_true_but_can_be_disabled() {
        let backends = parse(r#"[{"cmd": "a"}, {"cmd": "b", "useDiagnostics": false}]"#).unwrap();
        assert!(backends[0].use_diagnostics);
        assert!(!backends[1].use_diagnostics);
    }

    #[test]
    fn preference_flags_default_false() {
        let backends = parse(r#"[{"cmd": "a"}]"#).unwrap();
        assert!(!backends[0].use_completion);
        assert!(!backends[0].use_signature_help);
        assert!(!backends[0].use_formatting);
        assert!(!backends[0].use_execute_command);
    }
}
