//! Integration tests for the MCP bridge.
//!
//! These tests verify JSON-RPC 2.0 message handling and drive whole bridge
//! sessions against a real tool server on a loopback port.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::BufReader;

use cad_bridge_mcp::config::{ScreenshotConfig, ServerConfig};
use cad_bridge_mcp::diagnostics::Diagnostics;
use cad_bridge_mcp::dispatcher::Dispatcher;
use cad_bridge_mcp::executor::{Executor, OwnerHandle};
use cad_bridge_mcp::host::{SceneBox, SimHost, Vec3};
use cad_bridge_mcp::mcp::protocol::{parse_message, Incoming, RequestId};
use cad_bridge_mcp::mcp::server::ServerState;
use cad_bridge_mcp::mcp::{LineTransport, McpServer};
use cad_bridge_mcp::measure::MeasurementState;
use cad_bridge_mcp::session::Session;
use cad_bridge_mcp::tcp::{ServerHandle, TcpServer, ToolClient};
use cad_bridge_mcp::tools::ToolRegistry;

const TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    match parse_message(json).unwrap() {
        Incoming::Request { id, method, params } => {
            assert_eq!(method, "initialize");
            assert_eq!(id, RequestId::Number(1));
            assert_eq!(params.unwrap()["clientInfo"]["name"], "test-client");
        }
        Incoming::Notification { .. } => panic!("Expected Request"),
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;

    match parse_message(json).unwrap() {
        Incoming::Notification { method } => assert_eq!(method, "notifications/initialized"),
        Incoming::Request { .. } => panic!("Expected Notification"),
    }
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{"id": 1, "method": "test"}"#;
    assert!(parse_message(json).is_err());
}

// =============================================================================
// Bridge Sessions
// =============================================================================

async fn start_tool_server() -> (ServerHandle, OwnerHandle) {
    let diagnostics = Diagnostics::new();
    let session_diagnostics = diagnostics.clone();
    let (executor, owner) = Executor::spawn(
        "mcp-owner",
        move || {
            let scene = [SceneBox {
                name: "Plate".to_string(),
                min: Vec3::new(0.0, 0.0, 0.0),
                max: Vec3::new(80.0, 60.0, 5.0),
            }];
            let screenshot = ScreenshotConfig {
                attach_to_results: false,
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
    let handle = TcpServer::new(dispatcher, &ServerConfig::default())
        .start("127.0.0.1:0")
        .await
        .unwrap();
    (handle, owner)
}

fn bridge_for(address: String) -> McpServer {
    McpServer::new(
        ToolClient::new(address, TIMEOUT),
        ToolRegistry::builtin().unwrap().definitions(),
    )
}

/// Feeds `lines` to the bridge and returns everything it wrote.
async fn run_session(server: &mut McpServer, lines: &[Value]) -> Vec<Value> {
    let input: String = lines.iter().map(|l| format!("{l}\n")).collect();
    let mut transport = LineTransport::new(BufReader::new(input.as_bytes()), Vec::new());
    server.serve(&mut transport).await.unwrap();

    let (_, output) = transport.into_inner();
    String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn handshake() -> Vec<Value> {
    vec![
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {"protocolVersion": "2024-11-05", "capabilities": {}}
        }),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    ]
}

fn tool_call(id: i64, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

fn envelope(response: &Value) -> Value {
    let text = response["result"]["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_measurement_session_through_bridge() {
    let (handle, _owner) = start_tool_server().await;
    let mut server = bridge_for(handle.local_addr().to_string());

    let mut lines = handshake();
    lines.push(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}));
    lines.push(tool_call(3, "start_measurement", json!({})));
    lines.push(tool_call(4, "select_point", json!({"grid_cell": "C3"})));
    lines.push(tool_call(5, "confirm_point", json!({"point_id": "point_1"})));
    lines.push(tool_call(6, "confirm_point", json!({"point_id": "point_1"})));
    lines.push(json!({"jsonrpc": "2.0", "id": 7, "method": "ping"}));

    let responses = run_session(&mut server, &lines).await;
    // One response per request; the notification gets none.
    assert_eq!(responses.len(), 7);
    assert_eq!(server.state(), ServerState::ShuttingDown);

    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[0]["result"]["serverInfo"]["name"], "cad-bridge-mcp");

    let tools = responses[1]["result"]["tools"].as_array().unwrap();
    assert!(tools.iter().any(|t| t["name"] == "measure_distance"));

    assert_eq!(responses[2]["result"]["isError"], false);
    assert_eq!(envelope(&responses[2])["mode"], "active");

    let selected = envelope(&responses[3]);
    assert_eq!(selected["point_id"], "point_1");
    assert_eq!(selected["grid_cell"], "C3");

    assert_eq!(responses[4]["result"]["isError"], false);

    // Tool failures are results with isError, not JSON-RPC errors.
    assert_eq!(responses[5]["id"], 6);
    assert_eq!(responses[5]["result"]["isError"], true);
    assert!(envelope(&responses[5])["error"]
        .as_str()
        .unwrap()
        .contains("already confirmed"));

    assert_eq!(responses[6]["id"], 7);
    assert_eq!(responses[6]["result"], json!({}));

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_requests_before_initialisation_are_rejected() {
    let (handle, _owner) = start_tool_server().await;
    let mut server = bridge_for(handle.local_addr().to_string());

    let responses = run_session(
        &mut server,
        &[
            tool_call(1, "list_points", json!({})),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        ],
    )
    .await;
    assert_eq!(responses.len(), 2);
    for response in &responses {
        assert_eq!(response["error"]["code"], -32600);
        assert_eq!(response["error"]["message"], "Server not initialised");
    }

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_invalid_lines_get_parse_errors() {
    let (handle, _owner) = start_tool_server().await;
    let mut server = bridge_for(handle.local_addr().to_string());

    let input = "{not json\n\n";
    let mut transport = LineTransport::new(BufReader::new(input.as_bytes()), Vec::new());
    server.serve(&mut transport).await.unwrap();

    let (_, output) = transport.into_inner();
    let output = String::from_utf8(output).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 1);
    let response: Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(response["id"], Value::Null);
    assert_eq!(response["error"]["code"], -32700);

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_stopped_tool_server_is_reported_as_tool_error() {
    let (handle, _owner) = start_tool_server().await;
    let address = handle.local_addr().to_string();
    handle.close().await.unwrap();

    let mut server = bridge_for(address);
    let mut lines = handshake();
    lines.push(tool_call(2, "list_points", json!({})));
    let responses = run_session(&mut server, &lines).await;

    assert_eq!(responses[1]["result"]["isError"], true);
    let failure = envelope(&responses[1]);
    assert_eq!(failure["success"], false);
    assert!(failure["error"]
        .as_str()
        .unwrap()
        .contains("Is the tool server running?"));
}
