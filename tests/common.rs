#![allow(dead_code)]
//! Common test utilities for harness integration tests
//!
//! Provides a mock node RPC endpoint and a mock indexer HTTP endpoint (the
//! same trick the real stack plays with a lightweight server standing in
//! for heavyweight binaries), plus fake-binary scripts and a fast test
//! configuration.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use ord_harness::network::Network;
use ord_harness::retry::RetryPolicy;
use ord_harness::HarnessConfig;

// ----------------------------------------------------------------------
// Mock node (JSON-RPC over HTTP POST)
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct MockNodeState {
    pub height: u64,
    /// (count, address) per generatetoaddress call.
    pub mined: Vec<(u64, String)>,
    /// Every method name received, in order.
    pub calls: Vec<String>,
    /// Authorization header per request.
    pub auth_headers: Vec<Option<String>>,
    /// Node-side wallets created so far.
    pub wallets: Vec<String>,
}

pub type SharedNode = Arc<Mutex<MockNodeState>>;

async fn rpc_handler(
    State(state): State<SharedNode>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let method = body["method"].as_str().unwrap_or("").to_string();
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut node = state.lock().unwrap();
    node.calls.push(method.clone());
    node.auth_headers.push(auth);

    let error = |code: i64, message: &str| {
        Json(json!({
            "result": null,
            "error": {"code": code, "message": message},
            "id": body["id"],
        }))
    };

    let result = match method.as_str() {
        "getblockchaininfo" => json!({"chain": "regtest", "blocks": node.height}),
        "getblockcount" => json!(node.height),
        "generatetoaddress" => {
            let count = body["params"][0].as_u64().unwrap_or(0);
            let address = body["params"][1].as_str().unwrap_or("").to_string();
            node.height += count;
            node.mined.push((count, address));
            json!((0..count).map(|i| format!("{:064x}", i)).collect::<Vec<String>>())
        }
        "createwallet" => {
            let name = body["params"][0].as_str().unwrap_or("").to_string();
            if node.wallets.contains(&name) {
                return error(-4, &format!("Wallet \"{}\" already exists.", name));
            }
            node.wallets.push(name.clone());
            json!({"name": name, "warning": ""})
        }
        "loadwallet" => json!({"name": body["params"][0], "warning": ""}),
        "getnewaddress" => json!("bcrt1qmockminingaddress000000"),
        "getbalances" => json!({"mine": {"trusted": 0.0}}),
        "stop" => json!("node stopping"),
        _ => return error(-32601, "Method not found"),
    };

    Json(json!({"result": result, "error": null, "id": body["id"]}))
}

/// Start a mock node RPC server on an ephemeral port.
pub async fn start_mock_node() -> (SharedNode, u16) {
    let state: SharedNode = Arc::new(Mutex::new(MockNodeState::default()));
    let app = Router::new()
        .route("/", post(rpc_handler))
        .route("/wallet/:name", post(rpc_handler))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, port)
}

// ----------------------------------------------------------------------
// Mock indexer (plain GET endpoints)
// ----------------------------------------------------------------------

/// What `/blockcount` answers: scripted responses consumed in order, then
/// the default repeated forever.
pub struct IndexerAnswer {
    pub queue: std::collections::VecDeque<(u16, String)>,
    pub default: (u16, String),
}

pub type BlockcountAnswer = Arc<Mutex<IndexerAnswer>>;

/// Replace the default `/blockcount` answer.
pub fn set_answer(answer: &BlockcountAnswer, code: u16, body: &str) {
    answer.lock().unwrap().default = (code, body.to_string());
}

/// Queue a one-shot scripted answer ahead of the default.
pub fn push_scripted(answer: &BlockcountAnswer, code: u16, body: &str) {
    answer
        .lock()
        .unwrap()
        .queue
        .push_back((code, body.to_string()));
}

async fn blockcount_handler(State(answer): State<BlockcountAnswer>) -> (StatusCode, String) {
    let mut answer = answer.lock().unwrap();
    let scripted = answer.queue.pop_front();
    let (code, body) = scripted.unwrap_or_else(|| answer.default.clone());
    (
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        body,
    )
}

async fn inscription_handler() -> (StatusCode, String) {
    (StatusCode::OK, "content".to_string())
}

/// Start a mock indexer answering `/blockcount` with the shared answer and
/// `/inscription/{id}` with 200.
pub async fn start_mock_indexer(initial: (u16, &str)) -> (BlockcountAnswer, u16) {
    let answer: BlockcountAnswer = Arc::new(Mutex::new(IndexerAnswer {
        queue: std::collections::VecDeque::new(),
        default: (initial.0, initial.1.to_string()),
    }));
    let app = Router::new()
        .route("/blockcount", get(blockcount_handler))
        .route("/inscription/:id", get(inscription_handler))
        .with_state(Arc::clone(&answer));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (answer, port)
}

// ----------------------------------------------------------------------
// Fake binaries and configuration
// ----------------------------------------------------------------------

/// A port nothing is listening on (bound briefly, then released).
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Write an executable shell script standing in for an external binary.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// A configuration with everything under a temp dir and fast poll cadences.
pub fn test_config(root: &Path, rpc_port: u16, http_port: u16) -> HarnessConfig {
    // Fast cadence, generous attempt budget: enough headroom that a slow CI
    // machine still observes a synthetic process's exit.
    let ready = RetryPolicy::new(Duration::from_millis(10), 50);
    HarnessConfig {
        network: Network::Regtest,
        node_binary: PathBuf::from("/bin/false"),
        indexer_binary: PathBuf::from("/bin/false"),
        node_data_dir: root.join("bitcoin"),
        indexer_data_dir: root.join("ord"),
        rpc_port,
        http_port,
        state_dir: root.join("state"),
        node_ready: ready,
        indexer_ready: ready,
        sync: RetryPolicy::new(Duration::from_millis(10), 5),
        node_stop_grace: Duration::from_secs(2),
        indexer_stop_grace: Duration::from_secs(2),
        reclaim_orphans: false,
    }
}

/// Drop the node cookie where the configured network expects it.
pub fn write_cookie(config: &HarnessConfig, contents: &str) -> PathBuf {
    let path = config.cookie_path();
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}

/// A syntactically valid inscription id for fixtures.
pub fn fixture_inscription_id() -> String {
    format!("{}i0", "0123456789abcdef".repeat(4))
}
