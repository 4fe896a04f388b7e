//! Wire protocol for graph-layout synchronization.
//!
//! Messages are JSON text frames tagged by a `messageType` field:
//!
//! - `update-node` / `update-connection` (client to server): move one
//!   element, `{ "messageType", "id", "x", "y" }`.
//! - `update-configuration` (server to client): the full configuration,
//!   `{ "messageType", "nodes", "connections" }`. Always a snapshot, never a
//!   delta.
//!
//! Any other tag decodes to [`SyncMessage::Unrecognized`] and is ignored.

use serde::{Deserialize, Serialize};

use crate::error::{KirunaError, Result};
use crate::types::{ElementId, ElementType, ElementUpdate, GraphConfiguration, Position};

/// Every message that travels over the sync channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType")]
pub enum SyncMessage {
    /// A client moved a document node.
    #[serde(rename = "update-node")]
    UpdateNode {
        /// Document id
        id: ElementId,
        /// New horizontal offset
        x: f64,
        /// New vertical offset
        y: f64,
    },

    /// A client moved a link control point.
    #[serde(rename = "update-connection")]
    UpdateConnection {
        /// Link id
        id: ElementId,
        /// New horizontal offset
        x: f64,
        /// New vertical offset
        y: f64,
    },

    /// Full configuration snapshot sent by the server.
    #[serde(rename = "update-configuration")]
    UpdateConfiguration(GraphConfiguration),

    /// Any tag this protocol does not know.
    #[serde(other, skip_serializing)]
    Unrecognized,
}

impl SyncMessage {
    /// Decode a raw text frame.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| KirunaError::MalformedMessage(e.to_string()))
    }

    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// The configuration carried by a snapshot message.
    pub fn into_configuration(self) -> Option<GraphConfiguration> {
        match self {
            SyncMessage::UpdateConfiguration(config) => Some(config),
            _ => None,
        }
    }
}

impl From<ElementUpdate> for SyncMessage {
    fn from(update: ElementUpdate) -> Self {
        let ElementUpdate {
            element_type,
            id,
            position: Position { x, y },
        } = update;
        match element_type {
            ElementType::Nodes => SyncMessage::UpdateNode { id, x, y },
            ElementType::Connections => SyncMessage::UpdateConnection { id, x, y },
        }
    }
}

/// Outcome of classifying an incoming client frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// A valid request to move one element.
    Update(ElementUpdate),
    /// A well-formed message that carries nothing for the store.
    Ignored,
}

/// Classify a raw client frame.
///
/// Malformed frames (not JSON, no `messageType`, missing or non-numeric
/// coordinates, missing id) are rejected with
/// [`KirunaError::MalformedMessage`]. Unknown message types, and snapshots a
/// client echoes back, classify as [`Classified::Ignored`].
///
/// ```
/// use kiruna_core::{Classified, ElementUpdate, classify};
///
/// let update = classify(r#"{"messageType":"update-node","id":7,"x":0.3,"y":0.6}"#).unwrap();
/// assert_eq!(update, Classified::Update(ElementUpdate::node("7", 0.3, 0.6)));
///
/// let other = classify(r#"{"messageType":"delete-node","id":7}"#).unwrap();
/// assert_eq!(other, Classified::Ignored);
///
/// assert!(classify(r#"{"messageType":"update-node","id":"7"}"#).is_err());
/// ```
pub fn classify(raw: &str) -> Result<Classified> {
    let (element_type, id, x, y) = match SyncMessage::decode(raw)? {
        SyncMessage::UpdateNode { id, x, y } => (ElementType::Nodes, id, x, y),
        SyncMessage::UpdateConnection { id, x, y } => (ElementType::Connections, id, x, y),
        SyncMessage::UpdateConfiguration(_) | SyncMessage::Unrecognized => {
            return Ok(Classified::Ignored);
        }
    };

    let position = Position::new(x, y);
    if !position.is_finite() {
        return Err(KirunaError::MalformedMessage(format!(
            "non-finite position for {} {}",
            element_type, id
        )));
    }

    Ok(Classified::Update(ElementUpdate {
        element_type,
        id,
        position,
    }))
}

/// Wrap a configuration in the `update-configuration` envelope.
pub fn build_snapshot(config: GraphConfiguration) -> SyncMessage {
    SyncMessage::UpdateConfiguration(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_update_node() {
        let classified =
            classify(r#"{"messageType":"update-node","id":"7","x":0.3,"y":0.6}"#).unwrap();

        assert_eq!(
            classified,
            Classified::Update(ElementUpdate::node("7", 0.3, 0.6))
        );
    }

    #[test]
    fn test_classify_update_connection_with_numeric_id() {
        let classified =
            classify(r#"{"messageType":"update-connection","id":12,"x":-40,"y":15.5}"#).unwrap();

        assert_eq!(
            classified,
            Classified::Update(ElementUpdate::connection("12", -40.0, 15.5))
        );
    }

    #[test]
    fn test_unrecognized_type_is_ignored() {
        assert_eq!(
            classify(r#"{"messageType":"delete-node","id":5}"#).unwrap(),
            Classified::Ignored
        );
        assert_eq!(
            classify(r#"{"messageType":"cursor","user":"a","x":1,"y":2}"#).unwrap(),
            Classified::Ignored
        );
    }

    #[test]
    fn test_client_sent_snapshot_is_ignored() {
        let raw = r#"{"messageType":"update-configuration","nodes":{},"connections":{}}"#;
        assert_eq!(classify(raw).unwrap(), Classified::Ignored);
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        let cases = [
            "not json",
            "[1,2,3]",
            r#"{"id":"7","x":1,"y":2}"#,
            r#"{"messageType":"update-node","id":"7","y":2}"#,
            r#"{"messageType":"update-node","id":"7","x":"left","y":2}"#,
            r#"{"messageType":"update-node","x":1,"y":2}"#,
            r#"{"messageType":"update-connection","id":null,"x":1,"y":2}"#,
            r#"{"messageType":"update-node","id":"7","x":1e999,"y":2}"#,
        ];

        for raw in cases {
            assert!(
                matches!(classify(raw), Err(KirunaError::MalformedMessage(_))),
                "expected {raw} to be rejected"
            );
        }
    }

    #[test]
    fn test_snapshot_wire_format() {
        let mut config = GraphConfiguration::new();
        config.set(ElementType::Nodes, "7".into(), Position::new(0.3, 0.6));

        let json = build_snapshot(config).encode().unwrap();

        assert_eq!(
            json,
            r#"{"messageType":"update-configuration","nodes":{"7":{"x":0.3,"y":0.6}},"connections":{}}"#
        );
    }

    #[test]
    fn test_snapshot_decodes_back_to_configuration() {
        let raw = r#"{"messageType":"update-configuration","nodes":{"1":{"x":1.0,"y":2.0}},"connections":{"1-2":{"x":3.0,"y":4.0}}}"#;

        let config = SyncMessage::decode(raw)
            .unwrap()
            .into_configuration()
            .unwrap();

        assert_eq!(config.get(ElementType::Nodes, &"1".into()), Some(Position::new(1.0, 2.0)));
        assert_eq!(
            config.get(ElementType::Connections, &"1-2".into()),
            Some(Position::new(3.0, 4.0))
        );
    }

    #[test]
    fn test_update_message_from_element_update() {
        let json = SyncMessage::from(ElementUpdate::connection(4u64, 0.5, 0.25))
            .encode()
            .unwrap();
        assert_eq!(
            json,
            r#"{"messageType":"update-connection","id":"4","x":0.5,"y":0.25}"#
        );
    }

    #[test]
    fn test_unrecognized_cannot_be_encoded() {
        assert!(SyncMessage::Unrecognized.encode().is_err());
    }
}
