//! End-to-end tests: drive `lsp_mux::engine::run` over real socket pairs with
//! in-process fake backends, instead of only exercising `Router` directly the
//! way the per-module unit tests do. This covers the thread/channel wiring in
//! `engine.rs`, not just the state machine.

use std::io::BufReader;
use std::os::unix::net::UnixStream;
use std::thread;

use jsonrpc_core::Id;
use serde_json::{json, Value};

use lsp_mux::config::{BackendConfig, Endpoint};
use lsp_mux::engine::BackendConnector;
use lsp_mux::message::Message;
use lsp_mux::transport::Transport;

/// One end of a socket pair, framed as an LSP transport, for driving or
/// impersonating one side of the proxy from a test thread.
struct FakeEndpoint {
    transport: Transport,
}

impl FakeEndpoint {
    fn send(&mut self, message: &Message) {
        self.transport.write_message(message).expect("write to fake endpoint");
    }

    fn recv(&mut self) -> Message {
        self.transport.read_message().expect("read from fake endpoint")
    }
}

/// Builds a connected pair: one `Transport` for the proxy to own, one
/// `FakeEndpoint` for the test to drive as the thing on the other end of the
/// wire (the editor, or a backend).
fn socket_pair() -> (Transport, FakeEndpoint) {
    let (a, b) = UnixStream::pair().expect("unix socket pair");
    let proxy_side = Transport::new(
        Box::new(BufReader::new(a.try_clone().unwrap())),
        Box::new(a),
    );
    let other_side = Transport::new(Box::new(BufReader::new(b.try_clone().unwrap())), Box::new(b));
    (proxy_side, FakeEndpoint { transport: other_side })
}

fn backend_config(primary: bool, use_completion: bool) -> BackendConfig {
    BackendConfig {
        endpoint: Endpoint::Process { cmd: "unused".into(), args: vec![] },
        initialization_options: Value::Null,
        use_completion,
        use_signature_help: false,
        use_formatting: false,
        use_execute_command: false,
        use_diagnostics: true,
        is_primary: primary,
    }
}

/// Wraps an already-open `Transport` as a `BackendConnector` that hands it back
/// immediately — the engine's deferred-connect hook has nothing to actually
/// dial in these tests, since the fake backend is already listening.
fn ready(transport: Transport) -> BackendConnector {
    Box::new(move || Ok(transport))
}

/// Waits for a backend's `initialize` request and answers it with `capabilities`.
fn answer_initialize(backend: &mut FakeEndpoint, capabilities: Value) {
    let request = backend.recv();
    match request {
        Message::Request { id, method, .. } => {
            assert_eq!(method, "initialize");
            backend.send(&Message::success(id, capabilities));
        }
        other => panic!("expected an initialize request, got {:?}", other),
    }
}

#[test]
fn full_session_routes_completion_and_shuts_down_cleanly() {
    let (client_transport, mut editor) = socket_pair();
    let (backend_a_transport, mut backend_a) = socket_pair();
    let (backend_b_transport, mut backend_b) = socket_pair();

    let backends = vec![
        (backend_config(true, false), ready(backend_a_transport)),
        (backend_config(false, true), ready(backend_b_transport)),
    ];

    let engine = thread::spawn(move || lsp_mux::engine::run(client_transport, backends));

    // initialize
    editor.send(&Message::request(Id::Num(1), "initialize", json!({})));
    answer_initialize(&mut backend_a, json!({ "completionProvider": {} }));
    answer_initialize(&mut backend_b, json!({ "completionProvider": {} }));

    let init_response = editor.recv();
    match init_response {
        Message::Response { id, outcome: Ok(result) } => {
            assert_eq!(id, Id::Num(1));
            assert!(result.get("completionProvider").is_some());
        }
        other => panic!("expected a successful initialize response, got {:?}", other),
    }

    editor.send(&Message::notification("initialized", json!({})));
    // both backends observe `initialized`
    assert_eq!(backend_a.recv().method(), Some("initialized"));
    assert_eq!(backend_b.recv().method(), Some("initialized"));

    // completion prefers backend B (useCompletion) over the primary, backend A
    editor.send(&Message::request(Id::Num(7), "textDocument/completion", json!({})));
    let forwarded = backend_b.recv();
    let backend_local_id = match &forwarded {
        Message::Request { id, method, .. } => {
            assert_eq!(method, "textDocument/completion");
            id.clone()
        }
        other => panic!("expected a completion request at backend B, got {:?}", other),
    };
    backend_b.send(&Message::success(backend_local_id, json!([{ "label": "x" }])));

    let completion_response = editor.recv();
    match completion_response {
        Message::Response { id, outcome: Ok(result) } => {
            assert_eq!(id, Id::Num(7));
            assert_eq!(result, json!([{ "label": "x" }]));
        }
        other => panic!("expected the completion result routed back to id 7, got {:?}", other),
    }

    // diagnostics from the primary are forwarded unchanged
    backend_a.send(&Message::notification(
        "textDocument/publishDiagnostics",
        json!({ "uri": "file:///x.rs", "diagnostics": [] }),
    ));
    let diagnostics = editor.recv();
    assert_eq!(diagnostics.method(), Some("textDocument/publishDiagnostics"));

    // shutdown waits for every backend
    editor.send(&Message::request(Id::Num(99), "shutdown", Value::Null));
    let shutdown_a = backend_a.recv();
    let shutdown_b = backend_b.recv();
    let id_a = match shutdown_a {
        Message::Request { id, method, .. } => {
            assert_eq!(method, "shutdown");
            id
        }
        other => panic!("expected shutdown at backend A, got {:?}", other),
    };
    let id_b = match shutdown_b {
        Message::Request { id, method, .. } => {
            assert_eq!(method, "shutdown");
            id
        }
        other => panic!("expected shutdown at backend B, got {:?}", other),
    };
    backend_a.send(&Message::success(id_a, Value::Null));
    backend_b.send(&Message::success(id_b, Value::Null));

    let shutdown_response = editor.recv();
    match shutdown_response {
        Message::Response { id, outcome: Ok(_) } => assert_eq!(id, Id::Num(99)),
        other => panic!("expected the shutdown response, got {:?}", other),
    }

    // exit is broadcast to both backends exactly once, then the proxy terminates
    editor.send(&Message::notification("exit", Value::Null));
    assert_eq!(backend_a.recv().method(), Some("exit"));
    assert_eq!(backend_b.recv().method(), Some("exit"));

    let code = engine.join().expect("engine thread should not panic");
    assert_eq!(code, 0);
}

#[test]
fn backend_connect_failure_fails_the_client_initialize_request() {
    let (client_transport, mut editor) = socket_pair();

    // A connector that fails, standing in for a `spawn_process`/`connect_tcp`
    // error that would otherwise only ever reach stderr.
    let failing: BackendConnector = Box::new(|| {
        Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such executable"))
    });
    let backends = vec![(backend_config(true, false), failing)];

    let engine = thread::spawn(move || lsp_mux::engine::run(client_transport, backends));

    editor.send(&Message::request(Id::Num(1), "initialize", json!({})));
    let response = editor.recv();
    match response {
        Message::Response { id, outcome: Err(error) } => {
            assert_eq!(id, Id::Num(1));
            assert_eq!(error.code, -32603);
            assert!(error.message.contains('0'), "error should identify the offending backend");
        }
        other => panic!("expected a JSON-RPC error for the failed backend, got {:?}", other),
    }

    let code = engine.join().expect("engine thread should not panic");
    assert_eq!(code, 1);
}

#[test]
fn uninitialized_request_is_rejected_without_reaching_any_backend() {
    let (client_transport, mut editor) = socket_pair();
    let (backend_transport, mut backend) = socket_pair();

    let backends = vec![(backend_config(true, false), ready(backend_transport))];
    let engine = thread::spawn(move || lsp_mux::engine::run(client_transport, backends));

    editor.send(&Message::request(Id::Num(1), "textDocument/hover", json!({})));
    let response = editor.recv();
    match response {
        Message::Response { id, outcome: Err(error) } => {
            assert_eq!(id, Id::Num(1));
            assert_eq!(error.code, -32002);
        }
        other => panic!("expected server-not-initialized, got {:?}", other),
    }

    editor.send(&Message::request(Id::Num(2), "initialize", json!({})));
    answer_initialize(&mut backend, json!({}));
    let _ = editor.recv();

    // exit without ever sending shutdown is a non-clean termination.
    editor.send(&Message::notification("exit", Value::Null));
    assert_eq!(backend.recv().method(), Some("exit"));
    let code = engine.join().expect("engine thread should not panic");
    assert_eq!(code, 1);
}
