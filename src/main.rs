// SPDX-FileCopyrightText: 2026 Terrella Contributors
// SPDX-License-Identifier: MIT

//! Terrella CLI entrypoint.
//!
//! By default this runs the bridge server and serves MCP over streamable
//! HTTP at `http://127.0.0.1:<port>/mcp`, with the viewer bridge endpoints
//! under `http://127.0.0.1:<port>/bridge/...`.
//!
//! Use `--mcp` to serve MCP over stdio instead (intended for tool
//! integrations; the bridge HTTP endpoints stay up for the viewer). Use
//! `--viewer <url>` to run the headless viewer host against a bridge in
//! another process, or `--embedded` to run one in-process.

use std::error::Error;
use std::sync::Arc;

use axum::Router;
use rmcp::transport::{
    streamable_http_server::session::local::LocalSessionManager, StreamableHttpServerConfig,
    StreamableHttpService,
};

use terrella::bridge::{self, TransportStrategy, ViewerBridge, DEFAULT_COMMAND_TIMEOUT};
use terrella::capability::HandlerContext;
use terrella::engine::HeadlessEngine;
use terrella::geo::OfflineAtlas;
use terrella::host::{HostConfig, ReconnectPolicy, ViewerHost};
use terrella::mcp::TerrellaMcp;

const DEFAULT_HTTP_PORT: u16 = 27780;
const PORT_PROBE_RANGE: u16 = 16;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [--port <port>] [--strategy socket|stream] [--strict-port] [--max-reconnect <n>] [--embedded]\n  {program} --mcp [--port <port>] [--strategy socket|stream] [--strict-port] [--embedded]\n  {program} --viewer <base-url> [--strategy socket|stream] [--max-reconnect <n>]\n\nDefault mode serves MCP over streamable HTTP at `http://127.0.0.1:<port>/mcp`\nand the viewer bridge under `/bridge/<capability>/...` on the same port.\n--mcp serves MCP over stdio instead.\n--embedded runs a headless viewer host in-process against the local bridge.\n--viewer runs only the viewer host, connecting to the given bridge URL.\n\nWithout --strict-port, a busy port is probed upward ({PORT_PROBE_RANGE} candidates).\nEnvironment fallbacks: TERRELLA_PORT, TERRELLA_STRATEGY, TERRELLA_MAX_RECONNECT,\nTERRELLA_STRICT_PORT."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    mcp: bool,
    embedded: bool,
    viewer: Option<String>,
    port: Option<u16>,
    strategy: Option<String>,
    strict_port: bool,
    max_reconnect: Option<u32>,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mcp" => {
                if options.mcp {
                    return Err(());
                }
                options.mcp = true;
            }
            "--embedded" => {
                if options.embedded {
                    return Err(());
                }
                options.embedded = true;
            }
            "--viewer" => {
                if options.viewer.is_some() {
                    return Err(());
                }
                let url = args.next().ok_or(())?;
                options.viewer = Some(url);
            }
            "--port" => {
                if options.port.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let port: u16 = raw.parse().map_err(|_| ())?;
                options.port = Some(port);
            }
            "--strategy" => {
                if options.strategy.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                options.strategy = Some(raw);
            }
            "--strict-port" => {
                if options.strict_port {
                    return Err(());
                }
                options.strict_port = true;
            }
            "--max-reconnect" => {
                if options.max_reconnect.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let max: u32 = raw.parse().map_err(|_| ())?;
                options.max_reconnect = Some(max);
            }
            _ => return Err(()),
        }
    }

    if options.viewer.is_some() && (options.mcp || options.embedded || options.port.is_some()) {
        return Err(());
    }

    Ok(options)
}

/// Environment configuration fills the gaps the command line left open.
fn apply_env_fallbacks(options: &mut CliOptions) {
    if options.port.is_none() {
        if let Some(port) = std::env::var("TERRELLA_PORT")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            options.port = Some(port);
        }
    }
    if options.strategy.is_none() {
        if let Ok(strategy) = std::env::var("TERRELLA_STRATEGY") {
            options.strategy = Some(strategy);
        }
    }
    if options.max_reconnect.is_none() {
        if let Some(max) = std::env::var("TERRELLA_MAX_RECONNECT")
            .ok()
            .and_then(|raw| raw.parse().ok())
        {
            options.max_reconnect = Some(max);
        }
    }
    if !options.strict_port {
        options.strict_port = std::env::var("TERRELLA_STRICT_PORT")
            .map(|raw| raw == "1" || raw.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
    }
}

fn resolve_strategy(options: &CliOptions) -> Result<TransportStrategy, Box<dyn Error>> {
    match &options.strategy {
        Some(raw) => Ok(raw.parse()?),
        None => Ok(TransportStrategy::Socket),
    }
}

fn reconnect_policy(options: &CliOptions) -> ReconnectPolicy {
    match options.max_reconnect {
        Some(max) => ReconnectPolicy::default().with_max_retries(max),
        None => ReconnectPolicy::default(),
    }
}

/// Bind the listening port; without `--strict-port` a busy port is probed
/// upward a bounded number of times.
async fn bind_listener(
    port: u16,
    strict: bool,
) -> Result<tokio::net::TcpListener, std::io::Error> {
    let mut last_err = None;
    for candidate in port..=port.saturating_add(PORT_PROBE_RANGE) {
        match tokio::net::TcpListener::bind(("127.0.0.1", candidate)).await {
            Ok(listener) => {
                if candidate != port {
                    tracing::warn!(requested = port, bound = candidate, "port busy, probed upward");
                }
                return Ok(listener);
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse && !strict => {
                last_err = Some(err);
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.unwrap_or_else(|| std::io::Error::other("no bindable port")))
}

fn embedded_host(base_url: String, strategy: TransportStrategy, policy: ReconnectPolicy) -> ViewerHost {
    let ctx = Arc::new(HandlerContext::new(
        Arc::new(HeadlessEngine::new()),
        Arc::new(OfflineAtlas::new()),
    ));
    ViewerHost::new(
        HostConfig::new(base_url, strategy).with_reconnect(policy),
        ctx,
    )
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("terrella=info")),
            )
            .with_writer(std::io::stderr)
            .init();

        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "terrella".to_owned());

        let mut options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };
        apply_env_fallbacks(&mut options);

        let strategy = resolve_strategy(&options)?;
        let policy = reconnect_policy(&options);

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        if let Some(base_url) = options.viewer.clone() {
            return runtime.block_on(async move {
                let host = embedded_host(base_url, strategy, policy);
                for endpoint in host.connect().await {
                    tracing::info!(
                        name = %endpoint.name,
                        status = %endpoint.status,
                        "viewer endpoint"
                    );
                }
                // Serve until the process is terminated.
                std::future::pending::<Result<(), Box<dyn Error>>>().await
            });
        }

        let port = options.port.unwrap_or(DEFAULT_HTTP_PORT);
        let bridge = Arc::new(ViewerBridge::new(strategy, DEFAULT_COMMAND_TIMEOUT));
        let mcp = TerrellaMcp::new(bridge.clone());

        runtime.block_on(async move {
            let listener = bind_listener(port, options.strict_port).await?;
            let bound_port = listener.local_addr()?.port();
            let base_url = format!("http://127.0.0.1:{bound_port}");

            let config = StreamableHttpServerConfig {
                stateful_mode: true,
                ..StreamableHttpServerConfig::default()
            };
            let shutdown_token = config.cancellation_token.clone();
            let server_shutdown = shutdown_token.clone();

            let session_manager = Arc::new(LocalSessionManager::default());
            let mcp_service = {
                let mcp = mcp.clone();
                StreamableHttpService::new(move || Ok(mcp.clone()), session_manager, config)
            };

            let router = Router::new()
                .nest_service("/mcp", mcp_service)
                .merge(bridge::http::router(bridge.clone()));

            tracing::info!(%base_url, strategy = %strategy.as_str(), "bridge listening");

            let server_handle = tokio::spawn(async move {
                let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                    server_shutdown.cancelled().await;
                });
                if let Err(err) = serve.await {
                    eprintln!("terrella: HTTP server error: {err}");
                }
            });

            let host = if options.embedded {
                let host = embedded_host(base_url, strategy, policy);
                let connected = host.connect().await;
                for endpoint in &connected {
                    tracing::info!(
                        name = %endpoint.name,
                        status = %endpoint.status,
                        "embedded viewer endpoint"
                    );
                }
                Some(host)
            } else {
                None
            };

            if options.mcp {
                // stdio MCP runs in the foreground; the HTTP server keeps
                // carrying the bridge endpoints meanwhile.
                mcp.serve_stdio().await?;
                if let Some(host) = &host {
                    host.disconnect().await;
                }
                shutdown_token.cancel();
                let _ = server_handle.await;
                return Ok(());
            }

            let _ = server_handle.await;
            Ok::<(), Box<dyn Error>>(())
        })?;

        Ok(())
    })();

    if let Err(err) = result {
        eprintln!("terrella: {err}");
        std::process::exit(1);
    }
}
