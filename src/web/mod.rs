//! HTTP front end for airplot.
//!
//! A sync `tiny_http` server with a fixed pool of worker threads. Each worker
//! pulls requests off the shared listener and runs them to completion, so up
//! to `server.workers` plots are generated at once. Serves:
//! - `POST /pollution-data`, `/time-series-data`, `/ntl-data`
//! - `GET /` form page, `GET /api/weeks`, `GET /api/health`
//!
//! Every response carries `Access-Control-Allow-Origin: *`, and `OPTIONS`
//! preflights get an empty 204.

mod api;
mod frontend;

use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{Context, Result};
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

use crate::config::AirplotConfig;
use crate::error::PlotError;
use crate::pipeline::{Endpoint, PlotService};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a worker needs to answer a request.
pub struct AppState {
    pub service: PlotService,
    pub config: AirplotConfig,
}

impl AppState {
    pub fn from_config(config: AirplotConfig) -> Result<Self> {
        let service = PlotService::from_config(&config).context("failed to build script registry")?;
        Ok(Self { service, config })
    }
}

// ---------------------------------------------------------------------------
// Server entry points
// ---------------------------------------------------------------------------

/// A listening server and its workers.
pub struct RunningServer {
    server: Arc<Server>,
    addr: Option<SocketAddr>,
    workers: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// The bound address; useful when binding port 0.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Block until every worker exits.
    pub fn join(self) {
        for worker in self.workers {
            let _ = worker.join();
        }
    }

    /// Stop accepting requests and wait for in-flight ones to finish.
    pub fn shutdown(self) {
        for _ in &self.workers {
            self.server.unblock();
        }
        self.join();
    }
}

/// Bind `addr` and start `workers` request threads.
pub fn start(state: Arc<AppState>, addr: &str, workers: usize) -> Result<RunningServer> {
    let server = Server::http(addr)
        .map_err(|e| anyhow::anyhow!("failed to start HTTP server on {addr}: {e}"))?;
    let server = Arc::new(server);
    let bound = server.server_addr().to_ip();

    let workers = (0..workers.max(1))
        .map(|i| {
            let server = Arc::clone(&server);
            let state = Arc::clone(&state);
            thread::Builder::new()
                .name(format!("airplot-worker-{i}"))
                .spawn(move || {
                    // recv only fails once the server is unblocked.
                    while let Ok(request) = server.recv() {
                        handle(&state, request);
                    }
                })
                .context("failed to spawn worker thread")
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RunningServer {
        server,
        addr: bound,
        workers,
    })
}

/// Start the server from `config` and block until it stops.
pub fn serve(config: AirplotConfig) -> Result<()> {
    let addr = config.server.addr.clone();
    let workers = config.server.workers;
    let state = Arc::new(AppState::from_config(config)?);

    let missing = state.service.dispatcher().registry().missing();
    for script in &missing {
        eprintln!(
            "[airplot] warning: script {} not found at {}",
            script.key,
            script.path.display()
        );
    }

    let running = start(Arc::clone(&state), &addr, workers)?;
    let shown = running
        .addr()
        .map(|a| a.to_string())
        .unwrap_or(addr);
    println!("airplot running at http://{shown} ({workers} workers)");
    println!("Press Ctrl+C to stop.\n");

    running.join();
    Ok(())
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

fn handle(state: &AppState, mut request: Request) {
    let started = Instant::now();
    let method = request.method().clone();
    let url = request.url().to_string();

    let response = match read_body(&mut request, &method, state.config.server.max_body_bytes) {
        Ok(body) => match dispatch(state, &method, &url, body.as_deref()) {
            Ok(resp) => resp,
            Err(e) => error_response(500, "internal", &e.to_string()),
        },
        Err(resp) => resp,
    };

    let status = response.status_code().0;
    let _ = request.respond(response.with_header(cors_header()));

    if state.config.logging.access_log {
        println!(
            "{} {} {} {} {}ms",
            chrono::Local::now().format("%H:%M:%S"),
            method,
            url,
            status,
            started.elapsed().as_millis()
        );
    }
}

/// Read the body up-front for methods that carry one.
fn read_body(
    request: &mut Request,
    method: &Method,
    limit: usize,
) -> Result<Option<String>, Response<Cursor<Vec<u8>>>> {
    if !matches!(method, Method::Put | Method::Post | Method::Patch) {
        return Ok(None);
    }
    let mut buf = Vec::new();
    let read = request
        .as_reader()
        .take(limit as u64 + 1)
        .read_to_end(&mut buf);
    if read.is_err() {
        return Err(error_response(400, "validation", "failed to read request body"));
    }
    if buf.len() > limit {
        return Err(error_response(
            413,
            "payload-too-large",
            &format!("request body exceeds {limit} bytes"),
        ));
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| error_response(400, "validation", "request body is not valid UTF-8"))
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Dispatch an incoming request to the appropriate handler.
fn dispatch(
    state: &AppState,
    method: &Method,
    url: &str,
    body: Option<&str>,
) -> Result<Response<Cursor<Vec<u8>>>> {
    // Strip query string for path matching
    let path = url.split('?').next().unwrap_or(url);

    match (method, path) {
        (&Method::Options, _) => Ok(preflight()),

        // Frontend
        (&Method::Get, "/") | (&Method::Get, "/index.html") => Ok(serve_frontend()),

        // API
        (&Method::Get, "/api/weeks") => api::get_weeks(url),
        (&Method::Get, "/api/health") => api::get_health(state),

        // Plots
        (&Method::Post, _) => match Endpoint::from_path(path) {
            Some(endpoint) => Ok(api::post_plot(&state.service, endpoint, body.unwrap_or(""))),
            None => Ok(not_found()),
        },

        _ => Ok(not_found()),
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Serve the embedded form page.
fn serve_frontend() -> Response<Cursor<Vec<u8>>> {
    let html = frontend::INDEX_HTML;
    Response::from_data(html.as_bytes().to_vec())
        .with_header(content_type("text/html; charset=utf-8"))
        .with_status_code(StatusCode(200))
}

fn preflight() -> Response<Cursor<Vec<u8>>> {
    Response::from_data(Vec::new())
        .with_header(header("Access-Control-Allow-Methods", "GET, POST, OPTIONS"))
        .with_header(header("Access-Control-Allow-Headers", "Content-Type"))
        .with_status_code(StatusCode(204))
}

/// 404 response.
fn not_found() -> Response<Cursor<Vec<u8>>> {
    error_response(404, "not-found", "not found")
}

/// JSON error body `{"error": ..., "kind": ...}`.
pub(crate) fn error_response(status: u16, kind: &str, message: &str) -> Response<Cursor<Vec<u8>>> {
    let body = serde_json::json!({ "error": message, "kind": kind }).to_string();
    Response::from_data(body.into_bytes())
        .with_header(content_type_json())
        .with_status_code(StatusCode(status))
}

pub(crate) fn plot_error_response(err: &PlotError) -> Response<Cursor<Vec<u8>>> {
    error_response(err.status_code(), err.kind(), &err.to_string())
}

fn header(name: &str, value: &str) -> Header {
    Header::from_bytes(name, value).expect("static header is valid")
}

pub(crate) fn content_type(value: &str) -> Header {
    header("Content-Type", value)
}

/// JSON content type header.
pub(crate) fn content_type_json() -> Header {
    content_type("application/json; charset=utf-8")
}

fn cors_header() -> Header {
    header("Access-Control-Allow-Origin", "*")
}
