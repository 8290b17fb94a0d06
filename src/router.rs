//! The central state machine: demultiplexes client and backend traffic, resolves which
//! backend answers which request, synchronizes multi-backend responses, and rewrites
//! ids so each backend's id space stays independent of the client's.

use std::collections::{HashMap, HashSet};

use jsonrpc_core::Id;
use log::{error, warn};
use serde_json::Value;

use crate::backend::{BackendState, Pending};
use crate::capabilities;
use crate::message::{Message, RpcError};

/// The aggregate lifecycle state, mirroring the client-visible protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initializing,
    Running,
    ShuttingDown,
    ShutdownAcked,
    Exited,
}

/// What the event loop should do after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterOutcome {
    Continue,
    Exit(i32),
}

struct InitializeAggregate {
    client_id: Id,
    missing: HashSet<usize>,
    results: Vec<Option<Value>>,
}

struct ShutdownAggregate {
    client_id: Id,
    missing: HashSet<usize>,
}

struct CodeActionAggregate {
    client_id: Id,
    missing: HashSet<usize>,
    collected: Vec<Option<Value>>,
}

/// Provider fields whose value in the synthesized `initialize` result is taken from
/// whichever backend the Routing Resolver picked for the matching method.
///
/// `completionItem/resolve` is deliberately absent: it shares `completionProvider`
/// with `textDocument/completion` but can resolve to a different backend, so its
/// `resolveProvider` flag is folded in separately rather than wholesale-copying the
/// field twice.
const FEATURE_FIELDS: &[(&str, &str)] = &[
    ("textDocument/completion", "completionProvider"),
    ("textDocument/signatureHelp", "signatureHelpProvider"),
    ("textDocument/formatting", "documentFormattingProvider"),
    ("textDocument/rangeFormatting", "documentRangeFormattingProvider"),
];

const NON_COMMAND_ROUTABLE_METHODS: &[&str] = &[
    "textDocument/completion",
    "completionItem/resolve",
    "textDocument/signatureHelp",
    "textDocument/formatting",
    "textDocument/rangeFormatting",
];

fn id_key(id: &Id) -> String {
    match id {
        Id::Num(n) => format!("n:{}", n),
        Id::Str(s) => format!("s:{}", s),
        Id::Null => "null".to_owned(),
    }
}

pub struct Router {
    backends: Vec<BackendState>,
    client_writer: crate::transport::TransportWriter,
    state: LifecycleState,
    initialize_aggregate: Option<InitializeAggregate>,
    shutdown_aggregate: Option<ShutdownAggregate>,
    code_action_aggregates: HashMap<String, CodeActionAggregate>,
    /// Resolved once, after `initialize` completes, for every routable method except
    /// `workspace/executeCommand` (which resolves per command name instead).
    routing_table: HashMap<String, usize>,
    command_routes: HashMap<String, usize>,
    /// Backends that advertised `codeActionProvider`, in configured order.
    code_action_backends: Vec<usize>,
    /// Last diagnostics array published per (document URI, backend), kept so that a
    /// live backend's diagnostics stream stays independent of the others.
    diagnostics_last: HashMap<(String, usize), Value>,
    /// Proxy-minted client-facing id -> (backend, backend's own request id), for
    /// requests the backend initiated (e.g. `workspace/configuration`).
    server_requests: HashMap<u64, (usize, Id)>,
    next_proxy_id: u64,
}

impl Router {
    pub fn new(backends: Vec<BackendState>, client_writer: crate::transport::TransportWriter) -> Self {
        Router {
            backends,
            client_writer,
            state: LifecycleState::Uninitialized,
            initialize_aggregate: None,
            shutdown_aggregate: None,
            code_action_aggregates: HashMap::new(),
            routing_table: HashMap::new(),
            command_routes: HashMap::new(),
            code_action_backends: Vec::new(),
            diagnostics_last: HashMap::new(),
            server_requests: HashMap::new(),
            next_proxy_id: 1,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn backend_count(&self) -> usize {
        self.backends.len()
    }

    fn primary_index(&self) -> usize {
        self.backends.iter().position(BackendState::is_primary).unwrap_or(0)
    }

    fn send_to_client(&mut self, message: Message) {
        if let Err(e) = self.client_writer.write_message(&message) {
            error!("failed writing to client: {}", e);
        }
    }

    fn write_to_backend(&mut self, idx: usize, message: &Message) {
        if let Err(e) = self.backends[idx].writer.write_message(message) {
            error!("failed writing to backend {}: {}", idx, e);
        }
    }

    // ---- client -> proxy -------------------------------------------------------

    pub fn handle_client_message(&mut self, message: Message) -> RouterOutcome {
        match message {
            Message::Notification { method, params } => self.handle_client_notification(&method, params),
            Message::Request { id, method, params } => self.handle_client_request(id, &method, params),
            Message::Response { id, outcome } => self.handle_client_response(id, outcome),
        }
    }

    fn handle_client_notification(&mut self, method: &str, params: Value) -> RouterOutcome {
        match method {
            "initialized" => {
                for idx in 0..self.backends.len() {
                    if self.backends[idx].initialized && !self.backends[idx].dead {
                        let msg = Message::notification("initialized", params.clone());
                        self.write_to_backend(idx, &msg);
                    }
                }
            }
            "exit" => {
                let clean = self.state == LifecycleState::ShutdownAcked;
                for idx in 0..self.backends.len() {
                    if !self.backends[idx].dead {
                        let msg = Message::notification("exit", Value::Null);
                        self.write_to_backend(idx, &msg);
                    }
                }
                self.state = LifecycleState::Exited;
                return RouterOutcome::Exit(if clean { 0 } else { 1 });
            }
            "$/cancelRequest" => self.forward_cancel(params),
            "workspace/didChangeConfiguration" => {
                for idx in 0..self.backends.len() {
                    if self.backends[idx].dead {
                        continue;
                    }
                    let mut p = params.clone();
                    self.apply_settings_override(idx, &mut p);
                    let msg = Message::notification("workspace/didChangeConfiguration", p);
                    self.write_to_backend(idx, &msg);
                }
            }
            _ => {
                for idx in 0..self.backends.len() {
                    if self.backends[idx].dead {
                        continue;
                    }
                    let msg = Message::notification(method, params.clone());
                    self.write_to_backend(idx, &msg);
                }
            }
        }
        RouterOutcome::Continue
    }

    fn apply_settings_override(&self, idx: usize, params: &mut Value) {
        let backend = &self.backends[idx];
        if let Some(obj) = params.as_object_mut() {
            if !backend.config.initialization_options.is_null() {
                obj.insert("settings".to_owned(), backend.config.initialization_options.clone());
            } else if !backend.is_primary() {
                obj.insert("settings".to_owned(), Value::Null);
            }
        }
    }

    fn forward_cancel(&mut self, params: Value) {
        let target = params.get("id").cloned().and_then(|v| serde_json::from_value::<Id>(v).ok());
        let target = match target {
            Some(t) => t,
            None => return,
        };
        for idx in 0..self.backends.len() {
            if self.backends[idx].dead {
                continue;
            }
            for backend_local_id in self.backends[idx].pending_ids_for_client(&target) {
                let cancel =
                    Message::notification("$/cancelRequest", serde_json::json!({ "id": backend_local_id }));
                self.write_to_backend(idx, &cancel);
            }
        }
    }

    fn handle_client_request(&mut self, id: Id, method: &str, params: Value) -> RouterOutcome {
        if self.state == LifecycleState::Uninitialized && method != "initialize" {
            self.send_to_client(Message::failure(id, RpcError::server_not_initialized()));
            return RouterOutcome::Continue;
        }
        if matches!(
            self.state,
            LifecycleState::ShuttingDown | LifecycleState::ShutdownAcked | LifecycleState::Exited
        ) {
            self.send_to_client(Message::failure(
                id,
                RpcError::invalid_request(format!("request '{}' received after shutdown", method)),
            ));
            return RouterOutcome::Continue;
        }

        match method {
            "initialize" => self.start_initialize(id, params),
            "shutdown" => self.start_shutdown(id),
            "textDocument/codeAction" => self.start_code_action(id, params),
            "workspace/executeCommand" => self.route_execute_command(id, params),
            m if capabilities::is_routable(m) => self.route_feature_request(id, m, params),
            _ => self.forward_to_primary(id, method, params),
        }
    }

    fn handle_client_response(&mut self, id: Id, outcome: Result<Value, RpcError>) -> RouterOutcome {
        let proxy_id = match id {
            Id::Num(n) => n,
            _ => {
                warn!("client responded with a non-numeric id we never minted");
                return RouterOutcome::Continue;
            }
        };
        match self.server_requests.remove(&proxy_id) {
            Some((backend_idx, original_id)) => {
                let response = Message::Response { id: original_id, outcome };
                self.write_to_backend(backend_idx, &response);
            }
            None => warn!("client responded to unknown server-initiated request {}", proxy_id),
        }
        RouterOutcome::Continue
    }

    // ---- initialize -------------------------------------------------------------

    fn start_initialize(&mut self, id: Id, params: Value) -> RouterOutcome {
        if self.state != LifecycleState::Uninitialized {
            self.send_to_client(Message::failure(id, RpcError::invalid_request("already initialized")));
            return RouterOutcome::Continue;
        }
        self.state = LifecycleState::Initializing;

        let count = self.backends.len();
        for idx in 0..count {
            let mut per_backend_params = params.clone();
            self.apply_initialization_options(idx, &mut per_backend_params);
            let backend_id =
                self.backends[idx].reserve_id(Pending::Aggregate { client_id: id.clone(), method: "initialize".into() });
            let req = Message::request(Id::Num(backend_id), "initialize", per_backend_params);
            self.write_to_backend(idx, &req);
        }

        self.initialize_aggregate = Some(InitializeAggregate {
            client_id: id,
            missing: (0..count).collect(),
            results: vec![None; count],
        });
        RouterOutcome::Continue
    }

    fn apply_initialization_options(&self, idx: usize, params: &mut Value) {
        let backend = &self.backends[idx];
        if let Some(obj) = params.as_object_mut() {
            if !backend.config.initialization_options.is_null() {
                obj.insert("initializationOptions".to_owned(), backend.config.initialization_options.clone());
            } else if !backend.is_primary() {
                obj.insert("initializationOptions".to_owned(), Value::Null);
            }
        }
    }

    fn on_initialize_backend_response(&mut self, idx: usize, outcome: Result<Value, RpcError>) -> RouterOutcome {
        match outcome {
            Ok(result) => {
                self.backends[idx].set_capabilities(result.clone());
                self.backends[idx].initialized = true;
                let done = if let Some(agg) = self.initialize_aggregate.as_mut() {
                    agg.results[idx] = Some(result);
                    agg.missing.remove(&idx);
                    agg.missing.is_empty()
                } else {
                    false
                };
                if done {
                    self.finish_initialize();
                }
                RouterOutcome::Continue
            }
            Err(error) => {
                if let Some(agg) = self.initialize_aggregate.take() {
                    self.send_to_client(Message::failure(
                        agg.client_id,
                        RpcError::internal_error(format!(
                            "backend {} failed to initialize: {}",
                            idx, error.message
                        )),
                    ));
                }
                self.state = LifecycleState::Exited;
                RouterOutcome::Exit(1)
            }
        }
    }

    fn finish_initialize(&mut self) {
        let agg = match self.initialize_aggregate.take() {
            Some(agg) => agg,
            None => return,
        };
        self.resolve_routing_table();

        let primary_idx = self.primary_index();
        let mut result = agg.results[primary_idx].clone().unwrap_or(Value::Null);

        for &(method, field) in FEATURE_FIELDS {
            if let Some(&target) = self.routing_table.get(method) {
                if target != primary_idx {
                    let backend_result = agg.results[target].clone().unwrap_or(Value::Null);
                    let field_value = backend_result.get(field).cloned();
                    if let Some(obj) = result.as_object_mut() {
                        match field_value {
                            Some(v) => {
                                obj.insert(field.to_owned(), v);
                            }
                            None => {
                                obj.remove(field);
                            }
                        }
                    }
                }
            }
        }

        // `completionItem/resolve` shares `useCompletion` with `textDocument/completion`
        // but has its own capability predicate, so it can resolve to a different
        // backend than completion did. Fold its actual resolve-target support into
        // `completionProvider.resolveProvider` regardless of which backend's
        // `completionProvider` the loop above copied in.
        if let Some(&resolve_target) = self.routing_table.get("completionItem/resolve") {
            let supports_resolve = self.backends[resolve_target].supports("completionItem/resolve");
            if let Some(obj) = result.as_object_mut() {
                if supports_resolve {
                    match obj.get_mut("completionProvider") {
                        Some(Value::Object(map)) => {
                            map.insert("resolveProvider".to_owned(), Value::Bool(true));
                        }
                        Some(slot) => {
                            let mut map = serde_json::Map::new();
                            map.insert("resolveProvider".to_owned(), Value::Bool(true));
                            *slot = Value::Object(map);
                        }
                        None => {
                            let mut map = serde_json::Map::new();
                            map.insert("resolveProvider".to_owned(), Value::Bool(true));
                            obj.insert("completionProvider".to_owned(), Value::Object(map));
                        }
                    }
                } else if let Some(Value::Object(map)) = obj.get_mut("completionProvider") {
                    map.remove("resolveProvider");
                }
            }
        }

        let mut seen = HashSet::new();
        let mut merged_commands = Vec::new();
        let order = std::iter::once(primary_idx).chain((0..self.backends.len()).filter(|&i| i != primary_idx));
        for idx in order {
            if let Some(Some(backend_result)) = agg.results.get(idx) {
                if let Some(commands) =
                    backend_result.pointer("/executeCommandProvider/commands").and_then(Value::as_array)
                {
                    for c in commands {
                        if let Some(s) = c.as_str() {
                            if seen.insert(s.to_owned()) {
                                merged_commands.push(s.to_owned());
                            }
                        }
                    }
                }
            }
        }
        if !merged_commands.is_empty() {
            if let Some(obj) = result.as_object_mut() {
                let commands_value = Value::Array(merged_commands.into_iter().map(Value::String).collect());
                match obj.get_mut("executeCommandProvider") {
                    Some(Value::Object(existing)) => {
                        existing.insert("commands".to_owned(), commands_value);
                    }
                    _ => {
                        let mut m = serde_json::Map::new();
                        m.insert("commands".to_owned(), commands_value);
                        obj.insert("executeCommandProvider".to_owned(), Value::Object(m));
                    }
                }
            }
        }

        self.code_action_backends = (0..self.backends.len())
            .filter(|&idx| self.backends[idx].supports("textDocument/codeAction"))
            .collect();

        self.state = LifecycleState::Running;
        self.send_to_client(Message::success(agg.client_id, result));
    }

    fn resolve_routing_table(&mut self) {
        self.routing_table.clear();
        for &method in NON_COMMAND_ROUTABLE_METHODS {
            if let Some(idx) = self.resolve_feature(method) {
                self.routing_table.insert(method.to_owned(), idx);
            }
        }
    }

    fn preference_flag(&self, method: &str, idx: usize) -> bool {
        let config = &self.backends[idx].config;
        match method {
            "textDocument/completion" | "completionItem/resolve" => config.use_completion,
            "textDocument/signatureHelp" => config.use_signature_help,
            "textDocument/formatting" | "textDocument/rangeFormatting" => config.use_formatting,
            _ => false,
        }
    }

    fn resolve_feature(&self, method: &str) -> Option<usize> {
        if let Some(idx) =
            (0..self.backends.len()).find(|&i| self.preference_flag(method, i) && self.backends[i].supports(method))
        {
            return Some(idx);
        }
        let primary_idx = self.primary_index();
        if self.backends[primary_idx].supports(method) {
            return Some(primary_idx);
        }
        (0..self.backends.len()).find(|&i| self.backends[i].supports(method))
    }

    // ---- routable feature requests -----------------------------------------------

    fn route_feature_request(&mut self, id: Id, method: &str, params: Value) -> RouterOutcome {
        let target = self.routing_table.get(method).copied().unwrap_or_else(|| self.primary_index());
        self.forward_single(id, method, params, target)
    }

    fn route_execute_command(&mut self, id: Id, params: Value) -> RouterOutcome {
        let command = params.get("command").and_then(Value::as_str).map(str::to_owned);
        let target = match command {
            Some(cmd) => {
                if let Some(&idx) = self.command_routes.get(&cmd) {
                    idx
                } else {
                    let idx = self.resolve_command(&cmd);
                    self.command_routes.insert(cmd, idx);
                    idx
                }
            }
            None => self.primary_index(),
        };
        self.forward_single(id, "workspace/executeCommand", params, target)
    }

    fn resolve_command(&self, command: &str) -> usize {
        if let Some(idx) = (0..self.backends.len())
            .find(|&i| self.backends[i].config.use_execute_command && self.backends[i].supports_command(command))
        {
            return idx;
        }
        let primary_idx = self.primary_index();
        if self.backends[primary_idx].supports_command(command) {
            return primary_idx;
        }
        (0..self.backends.len()).find(|&i| self.backends[i].supports_command(command)).unwrap_or(primary_idx)
    }

    fn forward_single(&mut self, id: Id, method: &str, params: Value, target: usize) -> RouterOutcome {
        if self.backends[target].dead {
            self.send_to_client(Message::failure(id, RpcError::internal_error("backend is not available")));
            return RouterOutcome::Continue;
        }
        let backend_id =
            self.backends[target].reserve_id(Pending::Client { id, method: method.to_owned() });
        let req = Message::request(Id::Num(backend_id), method, params);
        self.write_to_backend(target, &req);
        RouterOutcome::Continue
    }

    fn forward_to_primary(&mut self, id: Id, method: &str, params: Value) -> RouterOutcome {
        let idx = self.primary_index();
        self.forward_single(id, method, params, idx)
    }

    // ---- shutdown -----------------------------------------------------------------

    fn start_shutdown(&mut self, id: Id) -> RouterOutcome {
        if self.state != LifecycleState::Running {
            self.send_to_client(Message::failure(id, RpcError::invalid_request("not running")));
            return RouterOutcome::Continue;
        }
        self.state = LifecycleState::ShuttingDown;

        let alive: Vec<usize> = (0..self.backends.len()).filter(|&i| !self.backends[i].dead).collect();
        if alive.is_empty() {
            self.send_to_client(Message::success(id, Value::Null));
            self.state = LifecycleState::ShutdownAcked;
            return RouterOutcome::Continue;
        }

        for &idx in &alive {
            let backend_id =
                self.backends[idx].reserve_id(Pending::Aggregate { client_id: id.clone(), method: "shutdown".into() });
            let req = Message::request(Id::Num(backend_id), "shutdown", Value::Null);
            self.write_to_backend(idx, &req);
        }
        self.shutdown_aggregate = Some(ShutdownAggregate { client_id: id, missing: alive.into_iter().collect() });
        RouterOutcome::Continue
    }

    fn complete_shutdown_participant(&mut self, idx: usize) {
        let done = if let Some(agg) = self.shutdown_aggregate.as_mut() {
            agg.missing.remove(&idx);
            agg.missing.is_empty()
        } else {
            false
        };
        if done {
            if let Some(agg) = self.shutdown_aggregate.take() {
                self.send_to_client(Message::success(agg.client_id, Value::Null));
                self.state = LifecycleState::ShutdownAcked;
            }
        }
    }

    // ---- codeAction -----------------------------------------------------------------

    fn start_code_action(&mut self, id: Id, params: Value) -> RouterOutcome {
        let targets: Vec<usize> =
            self.code_action_backends.iter().cloned().filter(|&i| !self.backends[i].dead).collect();
        if targets.is_empty() {
            self.send_to_client(Message::success(id, Value::Array(vec![])));
            return RouterOutcome::Continue;
        }

        let collected = vec![None; self.backends.len()];
        for &idx in &targets {
            let backend_id = self.backends[idx]
                .reserve_id(Pending::Aggregate { client_id: id.clone(), method: "textDocument/codeAction".into() });
            let req = Message::request(Id::Num(backend_id), "textDocument/codeAction", params.clone());
            self.write_to_backend(idx, &req);
        }

        let key = id_key(&id);
        self.code_action_aggregates
            .insert(key, CodeActionAggregate { client_id: id, missing: targets.into_iter().collect(), collected });
        RouterOutcome::Continue
    }

    fn complete_code_action_participant(&mut self, idx: usize, client_id: &Id, value: Value) {
        let key = id_key(client_id);
        let done = if let Some(agg) = self.code_action_aggregates.get_mut(&key) {
            agg.collected[idx] = Some(value);
            agg.missing.remove(&idx);
            agg.missing.is_empty()
        } else {
            false
        };
        if !done {
            return;
        }
        if let Some(agg) = self.code_action_aggregates.remove(&key) {
            let merged: Vec<Value> = self
                .code_action_backends
                .iter()
                .flat_map(|&i| match agg.collected.get(i) {
                    Some(Some(Value::Array(arr))) => arr.clone(),
                    _ => Vec::new(),
                })
                .collect();
            self.send_to_client(Message::success(agg.client_id, Value::Array(merged)));
        }
    }

    // ---- backend -> proxy -----------------------------------------------------------

    pub fn handle_backend_message(&mut self, idx: usize, message: Message) -> RouterOutcome {
        match message {
            Message::Notification { method, params } => self.handle_backend_notification(idx, &method, params),
            Message::Request { id, method, params } => self.handle_backend_request(idx, id, &method, params),
            Message::Response { id, outcome } => self.handle_backend_response(idx, id, outcome),
        }
    }

    fn handle_backend_notification(&mut self, idx: usize, method: &str, params: Value) -> RouterOutcome {
        if method == "textDocument/publishDiagnostics" {
            if self.backends[idx].config.use_diagnostics {
                if let Some(uri) = params.get("uri").and_then(Value::as_str) {
                    self.diagnostics_last.insert((uri.to_owned(), idx), params.clone());
                }
                self.send_to_client(Message::notification(method, params));
            }
            return RouterOutcome::Continue;
        }
        self.send_to_client(Message::notification(method, params));
        RouterOutcome::Continue
    }

    fn handle_backend_request(&mut self, idx: usize, id: Id, method: &str, params: Value) -> RouterOutcome {
        let proxy_id = self.next_proxy_id;
        self.next_proxy_id += 1;
        self.server_requests.insert(proxy_id, (idx, id));
        self.send_to_client(Message::request(Id::Num(proxy_id), method, params));
        RouterOutcome::Continue
    }

    fn handle_backend_response(&mut self, idx: usize, id: Id, outcome: Result<Value, RpcError>) -> RouterOutcome {
        let backend_local_id = match id {
            Id::Num(n) => n,
            _ => {
                warn!("backend {} responded with a non-numeric id", idx);
                return RouterOutcome::Continue;
            }
        };
        match self.backends[idx].take_pending(backend_local_id) {
            Some(Pending::Client { id: client_id, .. }) => {
                self.send_to_client(Message::Response { id: client_id, outcome });
                RouterOutcome::Continue
            }
            Some(Pending::Aggregate { client_id, method }) => match method.as_str() {
                "initialize" => self.on_initialize_backend_response(idx, outcome),
                "shutdown" => {
                    self.complete_shutdown_participant(idx);
                    RouterOutcome::Continue
                }
                "textDocument/codeAction" => {
                    let value = outcome.unwrap_or(Value::Null);
                    self.complete_code_action_participant(idx, &client_id, value);
                    RouterOutcome::Continue
                }
                other => {
                    warn!("unexpected aggregate method '{}'", other);
                    RouterOutcome::Continue
                }
            },
            None => {
                warn!("backend {} responded to an unknown id {}", idx, backend_local_id);
                RouterOutcome::Continue
            }
        }
    }

    /// A backend's stream ended (EOF or parse error). Marks it dead, fails any
    /// requests in flight to it, and aborts the session if the backend was the
    /// primary or we were still waiting on it for `initialize`.
    pub fn handle_backend_closed(&mut self, idx: usize) -> RouterOutcome {
        if self.backends[idx].dead {
            return RouterOutcome::Continue;
        }
        self.backends[idx].dead = true;
        warn!("backend {} closed", idx);

        if self.state == LifecycleState::Initializing {
            if let Some(agg) = self.initialize_aggregate.take() {
                self.send_to_client(Message::failure(
                    agg.client_id,
                    RpcError::internal_error(format!("backend {} failed during initialize", idx)),
                ));
            }
            self.state = LifecycleState::Exited;
            return RouterOutcome::Exit(1);
        }

        for pending in self.backends[idx].drain_pending() {
            match pending {
                Pending::Client { id, .. } => {
                    self.send_to_client(Message::failure(id, RpcError::internal_error("backend is not available")));
                }
                Pending::Aggregate { client_id, method } => match method.as_str() {
                    "shutdown" => self.complete_shutdown_participant(idx),
                    "textDocument/codeAction" => {
                        self.complete_code_action_participant(idx, &client_id, Value::Null)
                    }
                    _ => {}
                },
            }
        }

        if self.backends[idx].is_primary() {
            self.state = LifecycleState::Exited;
            return RouterOutcome::Exit(1);
        }

        RouterOutcome::Continue
    }
}
