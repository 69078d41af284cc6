//! Integration Test: Socket Ownership
//!
//! **Policy**: Exactly one component owns the socket. Only the WebSocket
//! transport may reference the socket library; everything else talks to a
//! `Link`.

use architectural_enforcement::{production_lines, relative};

const WEBSOCKET_TRANSPORT: &str = "chatlink/core/src/transport/websocket.rs";

const SOCKET_MARKERS: &[&str] = &["tokio_tungstenite", "tungstenite::", "connect_async"];

#[test]
fn test_socket_library_confined_to_websocket_transport() {
    let violations: Vec<String> = ["chatlink/core/src", "chatlink/cli/src"]
        .into_iter()
        .flat_map(production_lines)
        .filter(|l| relative(&l.path) != WEBSOCKET_TRANSPORT)
        .filter(|l| SOCKET_MARKERS.iter().any(|m| l.code.contains(m)))
        .map(|l| format!("{}:{} - {}", relative(&l.path), l.number, l.code))
        .collect();

    assert!(
        violations.is_empty(),
        "socket library used outside {WEBSOCKET_TRANSPORT}:\n  {}",
        violations.join("\n  ")
    );
}

#[test]
fn test_cli_has_no_connection_logic() {
    let violations: Vec<String> = production_lines("chatlink/cli/src")
        .into_iter()
        .filter(|l| l.code.contains("Connector") || l.code.contains("Link"))
        .map(|l| format!("{}:{} - {}", relative(&l.path), l.number, l.code))
        .collect();

    assert!(
        violations.is_empty(),
        "CLI should only use the ConnectionManager handle:\n  {}",
        violations.join("\n  ")
    );
}
