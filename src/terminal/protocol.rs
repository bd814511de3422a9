//! Wire messages of the terminal stream endpoint.
//!
//! The protocol is server-defined: both directions are JSON objects
//! discriminated on a `type` field.

use serde::{Deserialize, Serialize};

/// Id prefix of terminals the extension created itself. This is a wire
/// convention, not a protocol guarantee; keep every use of it behind
/// [`terminal_kind`].
pub const MANAGED_ID_PREFIX: &str = "managed-";

/// Managed terminals are created by the extension and stream reliably;
/// ambient ones were opened by the user and may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Managed,
    Ambient,
}

/// Classify a terminal by its id. The single home of the `managed-` prefix
/// convention.
pub fn terminal_kind(id: &str) -> TerminalKind {
    if id.starts_with(MANAGED_ID_PREFIX) {
        TerminalKind::Managed
    } else {
        TerminalKind::Ambient
    }
}

/// Client → server messages.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    List,
    Subscribe { id: String },
    SubscribeAll,
    Unsubscribe { id: String },
    Input { id: String, data: String },
    CreateTerminal {
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// One terminal as reported by the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TerminalInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Server → client messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Terminals { terminals: Vec<TerminalInfo> },
    Output { id: String, data: String },
    TerminalOpened { id: String, #[serde(default)] name: Option<String> },
    TerminalClosed { id: String },
    TerminalCreated { id: String, #[serde(default)] name: Option<String> },
    Subscribed { id: String },
    Unsubscribed { id: String },
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_kind_prefix() {
        assert_eq!(terminal_kind("managed-build-1"), TerminalKind::Managed);
        assert_eq!(terminal_kind("zsh"), TerminalKind::Ambient);
        // Prefix must be exact: no trimming, no case folding
        assert_eq!(terminal_kind("Managed-build-1"), TerminalKind::Ambient);
        assert_eq!(terminal_kind(""), TerminalKind::Ambient);
    }

    #[test]
    fn test_client_message_wire_shape() {
        let json = serde_json::to_value(&ClientMessage::Subscribe {
            id: "managed-1".to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "subscribe");
        assert_eq!(json["id"], "managed-1");

        let json = serde_json::to_value(&ClientMessage::SubscribeAll).unwrap();
        assert_eq!(json["type"], "subscribe_all");

        let json = serde_json::to_value(&ClientMessage::CreateTerminal { name: None }).unwrap();
        assert_eq!(json["type"], "create_terminal");
        assert!(json.get("name").is_none());
    }

    #[test]
    fn test_server_message_dispatch() {
        let msg: ServerMessage = serde_json::from_str(
            r#"{"type": "output", "id": "managed-1", "data": "hello\n"}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::Output { id, data } => {
                assert_eq!(id, "managed-1");
                assert_eq!(data, "hello\n");
            }
            other => panic!("expected output, got {:?}", other),
        }

        let msg: ServerMessage = serde_json::from_str(
            r#"{"type": "terminals", "terminals": [{"id": "t1"}, {"id": "managed-2", "name": "build"}]}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::Terminals { terminals } => {
                assert_eq!(terminals.len(), 2);
                assert_eq!(terminals[1].name.as_deref(), Some("build"));
            }
            other => panic!("expected terminals, got {:?}", other),
        }
    }
}
