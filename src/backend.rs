//! Per-backend runtime state: the capabilities a backend advertised at `initialize`,
//! its outbound id counter, and the map from backend-local id back to whatever the
//! proxy needs to route the eventual response.

use std::collections::HashMap;

use jsonrpc_core::Id;
use serde_json::Value;

use crate::capabilities;
use crate::config::BackendConfig;
use crate::transport::TransportWriter;

/// What a pending outbound (proxy→backend) request maps back to.
#[derive(Debug, Clone)]
pub enum Pending {
    /// Forwarded on behalf of a single client request; translate the response's id
    /// back to `id` and forward it, unless `method` says otherwise (aggregates are
    /// tracked separately by the Router).
    Client { id: Id, method: String },
    /// Issued by the Router itself on behalf of a Pending Aggregate (`initialize`,
    /// `shutdown`, `textDocument/codeAction`); `client_id` identifies which one.
    Aggregate { client_id: Id, method: String },
}

pub struct BackendState {
    pub config: BackendConfig,
    pub writer: TransportWriter,
    /// Set exactly once, from the `initialize` response, then immutable.
    capabilities: Value,
    next_id: u64,
    pending: HashMap<u64, Pending>,
    pub initialized: bool,
    pub dead: bool,
}

impl BackendState {
    pub fn new(config: BackendConfig, writer: TransportWriter) -> Self {
        BackendState {
            config,
            writer,
            capabilities: Value::Null,
            next_id: 1,
            pending: HashMap::new(),
            initialized: false,
            dead: false,
        }
    }

    pub fn is_primary(&self) -> bool {
        self.config.is_primary
    }

    /// Allocates a fresh backend-local id and records what the eventual response
    /// should map back to.
    pub fn reserve_id(&mut self, pending: Pending) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, pending);
        id
    }

    /// Pops the pending entry for a backend-local id, if any. Unknown ids (a backend
    /// replying to something it was never asked, or replying twice) return `None`;
    /// callers log and drop.
    pub fn take_pending(&mut self, backend_id: u64) -> Option<Pending> {
        self.pending.remove(&backend_id)
    }

    /// All ids still awaiting a response, used to answer them with an error when the
    /// backend dies mid-session.
    pub fn drain_pending(&mut self) -> Vec<Pending> {
        self.pending.drain().map(|(_, v)| v).collect()
    }

    /// Backend-local ids whose originating client request (or aggregate) is `target`,
    /// used to propagate `$/cancelRequest`.
    pub fn pending_ids_for_client(&self, target: &Id) -> Vec<u64> {
        self.pending
            .iter()
            .filter(|(_, pending)| match pending {
                Pending::Client { id, .. } => id == target,
                Pending::Aggregate { client_id, .. } => client_id == target,
            })
            .map(|(backend_id, _)| *backend_id)
            .collect()
    }

    pub fn set_capabilities(&mut self, capabilities: Value) {
        self.capabilities = capabilities;
    }

    pub fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    pub fn supports(&self, method: &str) -> bool {
        capabilities::supports_method(&self.capabilities, method)
    }

    pub fn supports_command(&self, command: &str) -> bool {
        capabilities::supports_command(&self.capabilities, command)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Endpoint;
    use crate::transport::Transport;
    use std::io;

    fn state() -> BackendState {
        let config = BackendConfig {
            endpoint: Endpoint::Process { cmd: "true".into(), args: vec![] },
            initialization_options: Value::Null,
            use_completion: false,
            use_signature_help: false,
            use_formatting: false,
            use_execute_command: false,
            use_diagnostics: true,
            is_primary: true,
        };
        let transport = Transport::new(
            Box::new(io::BufReader::new(io::empty())),
            Box::new(io::sink()),
        );
        let (_reader, writer) = transport.split();
        BackendState::new(config, writer)
    }

    #[test]
    fn ids_are_monotonically_increasing_and_unique() {
        let mut s = state();
        let a = s.reserve_id(Pending::Client { id: Id::Num(1), method: "x".into() });
        let b = s.reserve_id(Pending::Client { id: Id::Num(2), method: "y".into() });
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn take_pending_removes_the_entry() {
        let mut s = state();
        let id = s.reserve_id(Pending::Client { id: Id::Num(5), method: "m".into() });
        assert!(s.take_pending(id).is_some());
        assert!(s.take_pending(id).is_none());
    }

    #[test]
    fn unknown_id_is_none() {
        let mut s = state();
        assert!(s.take_pending(999).is_none());
    }

    #[test]
    fn capabilities_drive_supports() {
        let mut s = state();
        assert!(!s.supports("textDocument/completion"));
        s.set_capabilities(serde_json::json!({ "completionProvider": {} }));
        assert!(s.supports("textDocument/completion"));
    }

    #[test]
    fn drain_pending_empties_the_map() {
        let mut s = state();
        s.reserve_id(Pending::Client { id: Id::Num(1), method: "a".into() });
        s.reserve_id(Pending::Client { id: Id::Num(2), method: "b".into() });
        let drained = s.drain_pending();
        assert_eq!(drained.len(), 2);
        assert_eq!(s.drain_pending().len(), 0);
    }
}
