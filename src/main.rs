//! Command-line entry point: reads the configuration file named as the sole
//! argument, then hands stdio and the (not-yet-connected) backend list to the
//! engine, which defers actually spawning/connecting backends until the
//! client's `initialize` arrives.

use std::env;
use std::io;
use std::path::Path;
use std::process;

use anyhow::{Context, Result};

use lsp_mux::config::{self, Endpoint};
use lsp_mux::engine::BackendConnector;
use lsp_mux::transport::Transport;

fn main() {
    env_logger::init();
    let code = match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:?}", e);
            // Only configuration loading can fail before the engine starts
            // (and before any client communication can occur); everything
            // else is reported to the client and exits through the engine.
            2
        }
    };
    process::exit(code);
}

fn run() -> Result<i32> {
    let config_path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("usage: lsp-mux <config.json>");
            return Ok(2);
        }
    };

    let backend_configs = config::load(Path::new(&config_path))
        .with_context(|| format!("loading configuration from {}", config_path))?;

    let backends: Vec<(config::BackendConfig, BackendConnector)> = backend_configs
        .into_iter()
        .map(|backend_config| {
            let connector: BackendConnector = match &backend_config.endpoint {
                Endpoint::Process { cmd, args } => {
                    let cmd = cmd.clone();
                    let args = args.clone();
                    Box::new(move || Transport::spawn_process(&cmd, &args))
                }
                Endpoint::Tcp { host, port } => {
                    let host = host.clone();
                    let port = *port;
                    Box::new(move || Transport::connect_tcp(&host, port))
                }
            };
            (backend_config, connector)
        })
        .collect();

    let client_transport =
        Transport::new(Box::new(io::BufReader::new(io::stdin())), Box::new(io::stdout()));

    Ok(lsp_mux::engine::run(client_transport, backends))
}
