//! The TCP tool server and client over real sockets.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use cad_bridge_mcp::config::{ScreenshotConfig, ServerConfig};
use cad_bridge_mcp::diagnostics::Diagnostics;
use cad_bridge_mcp::dispatcher::Dispatcher;
use cad_bridge_mcp::error::TransportError;
use cad_bridge_mcp::executor::{Executor, OwnerHandle};
use cad_bridge_mcp::host::{SceneBox, SimHost, Vec3};
use cad_bridge_mcp::measure::MeasurementState;
use cad_bridge_mcp::session::Session;
use cad_bridge_mcp::tcp::{ServerHandle, TcpServer, ToolClient};
use cad_bridge_mcp::tools::ToolRegistry;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Fixture {
    handle: ServerHandle,
    client: ToolClient,
    _owner: OwnerHandle,
}

async fn start(max_request_bytes: usize, read_timeout_secs: u64) -> Fixture {
    let diagnostics = Diagnostics::new();
    let session_diagnostics = diagnostics.clone();
    let (executor, owner) = Executor::spawn(
        "tcp-owner",
        move || {
            let scene = [SceneBox {
                name: "Plate".to_string(),
                min: Vec3::new(0.0, 0.0, 0.0),
                max: Vec3::new(80.0, 60.0, 5.0),
            }];
            let screenshot = ScreenshotConfig {
                width: 64,
                height: 48,
                ..ScreenshotConfig::default()
            };
            Session::new(
                Box::new(SimHost::with_scene(800, 600, &scene)),
                MeasurementState::new(8, 6),
                screenshot,
                session_diagnostics,
            )
        },
        diagnostics,
    )
    .unwrap();

    let registry = Arc::new(ToolRegistry::builtin().unwrap());
    let dispatcher = Dispatcher::new(registry, executor, TIMEOUT);
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        read_timeout_secs,
        max_request_bytes,
    };
    let handle = TcpServer::new(dispatcher, &config)
        .start("127.0.0.1:0")
        .await
        .unwrap();
    let client = ToolClient::new(handle.local_addr().to_string(), TIMEOUT);
    Fixture {
        handle,
        client,
        _owner: owner,
    }
}

async fn raw_exchange(fixture: &Fixture, bytes: &[u8]) -> String {
    let mut stream = TcpStream::connect(fixture.handle.local_addr()).await.unwrap();
    stream.write_all(bytes).await.unwrap();
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).await.unwrap();
    line
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tool_calls_round_trip() {
    let fixture = start(1024 * 1024, 5).await;

    let listed = fixture.client.call("list_tools", json!({})).await.unwrap();
    assert_eq!(listed["success"], true);
    assert_eq!(listed["count"], ToolRegistry::builtin().unwrap().len());

    let started = fixture
        .client
        .call("start_measurement", json!({}))
        .await
        .unwrap();
    assert_eq!(started["success"], true);
    assert_eq!(started["cells"], "A1-H6");
    assert_eq!(started["screenshot"]["format"], "png");

    let point = fixture
        .client
        .call("select_point", json!({"grid_cell": "D3"}))
        .await
        .unwrap();
    assert_eq!(point["point_id"], "point_1");

    // State persists across connections.
    let listed = fixture.client.call("list_points", json!({})).await.unwrap();
    assert_eq!(listed["pending"], 1);

    fixture.handle.close().await.unwrap();
}

#[tokio::test]
async fn failures_come_back_as_envelopes() {
    let fixture = start(1024 * 1024, 5).await;

    let unknown = fixture.client.call("frobnicate", json!({})).await.unwrap();
    assert_eq!(
        unknown,
        json!({"success": false, "error": "Unknown tool: frobnicate"})
    );

    let missing = fixture.client.call("confirm_point", json!({})).await.unwrap();
    assert_eq!(missing["error"], "Missing required parameter: point_id");

    let line = raw_exchange(&fixture, b"{oops\n").await;
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["success"], false);
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid JSON request"));

    fixture.handle.close().await.unwrap();
}

#[tokio::test]
async fn server_keeps_serving_after_bad_clients() {
    let fixture = start(256, 1).await;

    // Connect and hang up without sending anything.
    drop(TcpStream::connect(fixture.handle.local_addr()).await.unwrap());

    // Oversized request, sized so the server reads all of it.
    let line = raw_exchange(&fixture, &[b'x'; 258]).await;
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["error"], "Request exceeds 256 bytes");

    // Silent client.
    let mut silent = TcpStream::connect(fixture.handle.local_addr()).await.unwrap();
    let mut line = String::new();
    let mut reader = BufReader::new(&mut silent);
    reader.read_line(&mut line).await.unwrap();
    let reply: Value = serde_json::from_str(&line).unwrap();
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .starts_with("No request received"));

    let listed = fixture.client.call("list_points", json!({})).await.unwrap();
    assert_eq!(listed["success"], true);

    fixture.handle.close().await.unwrap();
}

#[tokio::test]
async fn request_at_the_size_limit_is_accepted() {
    let request = br#"{"tool":"list_tools"}"#;
    let fixture = start(request.len(), 5).await;

    let mut line = request.to_vec();
    line.push(b'\n');
    let reply: Value = serde_json::from_str(&raw_exchange(&fixture, &line).await).unwrap();
    assert_eq!(reply["success"], true, "{reply}");

    // One byte more is too much.
    let mut long = br#"{"tool": "list_tools"}"#.to_vec();
    long.push(b'\n');
    let reply: Value = serde_json::from_str(&raw_exchange(&fixture, &long).await).unwrap();
    assert_eq!(
        reply["error"],
        format!("Request exceeds {} bytes", request.len())
    );

    fixture.handle.close().await.unwrap();
}

#[tokio::test]
async fn client_reports_unreachable_server() {
    let address = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let client = ToolClient::new(address.to_string(), TIMEOUT);
    let err = client.call("list_tools", json!({})).await.unwrap_err();
    assert!(matches!(err, TransportError::Connect { .. }));
}

#[tokio::test]
async fn closed_server_stops_accepting() {
    let fixture = start(1024, 5).await;
    let address = fixture.handle.local_addr();
    fixture.handle.close().await.unwrap();

    let client = ToolClient::new(address.to_string(), TIMEOUT);
    assert!(client.call("list_tools", json!({})).await.is_err());
}
