use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{NodeId, SocketId};

/// How a relayed message is applied on the receiving node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Room-scoped broadcast, replayed through membership resolution.
    Room,
    /// Server-wide write, replayed against every local connection.
    Server,
    /// Anything a peer sent that this build does not understand. Dropped on
    /// receipt.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Delivery method invoked on matching local connections.
///
/// A closed set; names a peer sends that fall outside it decode to
/// [`DeliveryMethod::Unknown`] and no-op instead of duck-typing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    /// Plain data write, always available on a connection.
    #[default]
    Write,
    /// Structured event emit, an optional connection capability.
    Send,
    #[serde(other)]
    Unknown,
}

/// Options attached to a broadcast, normalized before publishing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastOptions {
    pub method: DeliveryMethod,
    pub except: Vec<SocketId>,
    pub rooms: Vec<String>,
}

impl BroadcastOptions {
    /// Options targeting the given rooms with the default write method.
    pub fn rooms<I, S>(rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rooms: rooms.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_method(mut self, method: DeliveryMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_except<I, S>(mut self, except: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<SocketId>,
    {
        self.except = except.into_iter().map(Into::into).collect();
        self
    }
}

/// Message unit relayed between nodes over the shared channel.
///
/// Transient and wire-only; never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    /// Identity of the emitting node.
    pub id: NodeId,
    /// The payload exactly as the originating call received it.
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub opts: BroadcastOptions,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_round_trip() {
        let envelope = Envelope {
            id: NodeId::from_raw(7),
            data: json!(["hello"]),
            kind: MessageKind::Room,
            opts: BroadcastOptions::rooms(["sport"])
                .with_method(DeliveryMethod::Send)
                .with_except(["jose"]),
        };

        let wire = serde_json::to_string(&envelope).unwrap();
        assert!(wire.contains("\"type\":\"room\""));
        assert!(wire.contains("\"method\":\"send\""));

        let back: Envelope = serde_json::from_str(&wire).unwrap();
        assert_eq!(back.id, envelope.id);
        assert_eq!(back.kind, MessageKind::Room);
        assert_eq!(back.opts, envelope.opts);
    }

    #[test]
    fn missing_kind_decodes_to_unknown() {
        let back: Envelope = serde_json::from_str(r#"{"id":1}"#).unwrap();
        assert_eq!(back.kind, MessageKind::Unknown);
        assert_eq!(back.data, Value::Null);
    }

    #[test]
    fn unrecognized_kind_decodes_to_unknown() {
        let back: Envelope =
            serde_json::from_str(r#"{"id":1,"data":null,"type":"gossip"}"#).unwrap();
        assert_eq!(back.kind, MessageKind::Unknown);
    }

    #[test]
    fn unrecognized_method_decodes_to_unknown() {
        let opts: BroadcastOptions = serde_json::from_str(r#"{"method":"yell"}"#).unwrap();
        assert_eq!(opts.method, DeliveryMethod::Unknown);
    }

    #[test]
    fn options_default_to_empty() {
        let opts = BroadcastOptions::default();
        assert_eq!(opts.method, DeliveryMethod::Write);
        assert!(opts.except.is_empty());
        assert!(opts.rooms.is_empty());

        let parsed: BroadcastOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, opts);
    }
}
