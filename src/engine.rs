//! Wires one reader thread per input stream (the client plus each backend) onto a
//! single event loop thread that drives the [`Router`], following the same
//! `crossbeam_channel::Select`-based multiplexing the rest of this crate's
//! concurrency model is built on.
//!
//! Backends are not connected until the client's `initialize` request arrives: the
//! client `Transport` is already open by then, so a `spawn_process`/`connect_tcp`
//! failure can be reported back as the JSON-RPC error spec.md §7 requires, rather
//! than only ever reaching stderr.

use std::io;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Select, Sender};
use jsonrpc_core::Id;
use log::error;
use serde_json::Value;

use crate::backend::BackendState;
use crate::config::BackendConfig;
use crate::message::{Message, RpcError};
use crate::router::{Router, RouterOutcome};
use crate::transport::{ReadError, Transport, TransportReader, TransportWriter};

/// How a single backend is reached, invoked only once the client's `initialize`
/// request arrives. Boxed so callers can defer the actual `spawn_process`/
/// `connect_tcp` (production) or hand back an already-open `Transport` (tests).
pub type BackendConnector = Box<dyn FnOnce() -> io::Result<Transport> + Send>;

fn spawn_reader(mut reader: TransportReader, tx: Sender<Result<Message, ReadError>>) {
    thread::spawn(move || loop {
        let result = reader.read_message();
        let stream_ended = result.is_err();
        if tx.send(result).is_err() {
            break;
        }
        if stream_ended {
            break;
        }
    });
}

/// Runs the proxy to completion: waits for the client's `initialize` request,
/// connects every configured backend, then drives the `Router` until the session
/// reaches `Exited`, returning the process exit code.
pub fn run(client_transport: Transport, backends: Vec<(BackendConfig, BackendConnector)>) -> i32 {
    let (client_reader, mut client_writer) = client_transport.split();
    let (client_tx, client_rx) = unbounded();
    spawn_reader(client_reader, client_tx);

    let (id, params) = match wait_for_initialize(&client_rx, &mut client_writer) {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    let mut receivers: Vec<Receiver<Result<Message, ReadError>>> = vec![client_rx];
    let mut backend_states = Vec::with_capacity(backends.len());
    for (i, (config, connect)) in backends.into_iter().enumerate() {
        match connect() {
            Ok(transport) => {
                let (reader, writer) = transport.split();
                let (tx, rx) = unbounded();
                spawn_reader(reader, tx);
                receivers.push(rx);
                backend_states.push(BackendState::new(config, writer));
            }
            Err(e) => {
                let _ = client_writer.write_message(&Message::failure(
                    id,
                    RpcError::internal_error(format!("failed to reach backend {}: {}", i, e)),
                ));
                return 1;
            }
        }
    }

    let mut router = Router::new(backend_states, client_writer);
    if let RouterOutcome::Exit(code) =
        router.handle_client_message(Message::request(id, "initialize", params))
    {
        return code;
    }

    drive(&mut router, receivers)
}

/// Reads client messages until `initialize` arrives, answering anything else
/// inline (no backend exists yet to route to). Returns the `initialize` request's
/// id and params, or the process exit code if the session ends before then.
fn wait_for_initialize(
    client_rx: &Receiver<Result<Message, ReadError>>,
    client_writer: &mut TransportWriter,
) -> Result<(Id, Value), i32> {
    loop {
        match client_rx.recv() {
            Ok(Ok(Message::Request { id, method, params })) => {
                if method == "initialize" {
                    return Ok((id, params));
                }
                let _ = client_writer
                    .write_message(&Message::failure(id, RpcError::server_not_initialized()));
            }
            Ok(Ok(Message::Notification { method, .. })) => {
                if method == "exit" {
                    return Err(1);
                }
                // No backend exists yet to forward anything else to.
            }
            Ok(Ok(Message::Response { .. })) => {
                // A response to something we never asked; nothing to do with it.
            }
            Ok(Err(ReadError::Eof)) => return Err(1),
            Ok(Err(ReadError::Parse(_))) | Ok(Err(ReadError::Io(_))) => {
                error!("malformed message on the client stream before initialize");
                return Err(1);
            }
            Err(_) => return Err(1),
        }
    }
}

fn drive(router: &mut Router, receivers: Vec<Receiver<Result<Message, ReadError>>>) -> i32 {
    let mut alive = vec![true; receivers.len()];

    loop {
        let mut select = Select::new();
        let mut mapping = Vec::new();
        for (i, rx) in receivers.iter().enumerate() {
            if alive[i] {
                select.recv(rx);
                mapping.push(i);
            }
        }
        if mapping.is_empty() {
            return 1;
        }

        let oper = select.select();
        let idx = mapping[oper.index()];
        let received = oper.recv(&receivers[idx]);

        let outcome = match received {
            Ok(Ok(message)) => dispatch(router, idx, message),
            Ok(Err(ReadError::Eof)) => {
                alive[idx] = false;
                on_stream_ended(router, idx)
            }
            Ok(Err(ReadError::Parse(_))) | Ok(Err(ReadError::Io(_))) => {
                alive[idx] = false;
                on_stream_errored(router, idx)
            }
            Err(_) => {
                alive[idx] = false;
                on_stream_ended(router, idx)
            }
        };

        if let RouterOutcome::Exit(code) = outcome {
            return code;
        }
    }
}

fn dispatch(router: &mut Router, idx: usize, message: Message) -> RouterOutcome {
    if idx == 0 {
        router.handle_client_message(message)
    } else {
        router.handle_backend_message(idx - 1, message)
    }
}

fn on_stream_ended(router: &mut Router, idx: usize) -> RouterOutcome {
    if idx != 0 {
        return router.handle_backend_closed(idx - 1);
    }

    // The Router itself gates the exit code on whether `shutdown` was ever
    // acked (LifecycleState::ShutdownAcked) before synthesizing this `exit`.
    match router.handle_client_message(Message::notification("exit", Value::Null)) {
        RouterOutcome::Exit(code) => RouterOutcome::Exit(code),
        RouterOutcome::Continue => RouterOutcome::Exit(1),
    }
}

fn on_stream_errored(router: &mut Router, idx: usize) -> RouterOutcome {
    if idx != 0 {
        return router.handle_backend_closed(idx - 1);
    }
    error!("malformed message on the client stream; terminating the session");
    RouterOutcome::Exit(1)
}
