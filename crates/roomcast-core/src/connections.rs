use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::envelope::DeliveryMethod;
use crate::ids::SocketId;

/// Capability interface of one locally-connected client.
///
/// `write` is always available. `send` is an optional capability whose
/// default implementation reports it as absent; a handle without the
/// requested capability is skipped for that delivery, never an error.
pub trait ConnectionHandle: Send + Sync {
    /// Deliver raw data to the client.
    fn write(&self, data: &Value);

    /// Deliver a structured event to the client. Returns false when the
    /// capability is not implemented.
    fn send(&self, data: &Value) -> bool {
        let _ = data;
        false
    }

    /// Route a delivery method to its explicit function.
    fn dispatch(&self, method: DeliveryMethod, data: &Value) {
        match method {
            DeliveryMethod::Write => self.write(data),
            DeliveryMethod::Send => {
                self.send(data);
            }
            DeliveryMethod::Unknown => {}
        }
    }
}

/// Read view over one node's id-to-connection table.
pub trait ConnectionRegistry: Send + Sync {
    fn get(&self, id: &SocketId) -> Option<Arc<dyn ConnectionHandle>>;

    /// Snapshot of every locally-connected socket id.
    fn ids(&self) -> Vec<SocketId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Connection table owned by one node.
#[derive(Default)]
pub struct LocalConnections {
    handles: DashMap<SocketId, Arc<dyn ConnectionHandle>>,
}

impl LocalConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: SocketId, handle: Arc<dyn ConnectionHandle>) {
        self.handles.insert(id, handle);
    }

    pub fn remove(&self, id: &SocketId) {
        self.handles.remove(id);
    }
}

impl ConnectionRegistry for LocalConnections {
    fn get(&self, id: &SocketId) -> Option<Arc<dyn ConnectionHandle>> {
        self.handles.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn ids(&self) -> Vec<SocketId> {
        self.handles.iter().map(|entry| entry.key().clone()).collect()
    }

    fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Apply `method` with `data` to every target id present in the local table.
///
/// Ids without a local connection belong to other nodes and are skipped.
/// Returns how many connections were invoked.
pub fn deliver<'a>(
    targets: impl IntoIterator<Item = &'a SocketId>,
    method: DeliveryMethod,
    data: &Value,
    connections: &dyn ConnectionRegistry,
) -> usize {
    let mut delivered = 0;
    for id in targets {
        if let Some(handle) = connections.get(id) {
            handle.dispatch(method, data);
            delivered += 1;
        }
    }
    delivered
}

/// Apply `method` with `data` to every local connection.
pub fn deliver_all(
    connections: &dyn ConnectionRegistry,
    method: DeliveryMethod,
    data: &Value,
) -> usize {
    deliver(connections.ids().iter(), method, data, connections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingConnection;
    use serde_json::json;

    #[test]
    fn insert_get_remove() {
        let table = LocalConnections::new();
        assert!(table.is_empty());

        let conn = RecordingConnection::new();
        table.insert("a".into(), conn);
        assert_eq!(table.len(), 1);
        assert!(table.get(&"a".into()).is_some());
        assert!(table.get(&"b".into()).is_none());

        table.remove(&"a".into());
        assert!(table.is_empty());
    }

    #[test]
    fn deliver_skips_absent_ids() {
        let table = LocalConnections::new();
        let here = RecordingConnection::new();
        table.insert("here".into(), Arc::clone(&here) as Arc<dyn ConnectionHandle>);

        let targets = [SocketId::from_raw("here"), SocketId::from_raw("elsewhere")];
        let delivered = deliver(targets.iter(), DeliveryMethod::Write, &json!("hi"), &table);

        assert_eq!(delivered, 1);
        assert_eq!(here.writes(), vec![json!("hi")]);
    }

    #[test]
    fn missing_send_capability_is_a_no_op() {
        let table = LocalConnections::new();
        let plain = RecordingConnection::write_only();
        table.insert("p".into(), Arc::clone(&plain) as Arc<dyn ConnectionHandle>);

        let targets = [SocketId::from_raw("p")];
        deliver(targets.iter(), DeliveryMethod::Send, &json!("hi"), &table);

        assert!(plain.sends().is_empty());
        assert!(plain.writes().is_empty());
    }

    #[test]
    fn unknown_method_is_a_no_op() {
        let table = LocalConnections::new();
        let conn = RecordingConnection::new();
        table.insert("c".into(), Arc::clone(&conn) as Arc<dyn ConnectionHandle>);

        let targets = [SocketId::from_raw("c")];
        deliver(targets.iter(), DeliveryMethod::Unknown, &json!("hi"), &table);

        assert_eq!(conn.total(), 0);
    }

    #[test]
    fn deliver_all_reaches_every_connection() {
        let table = LocalConnections::new();
        let a = RecordingConnection::new();
        let b = RecordingConnection::new();
        table.insert("a".into(), Arc::clone(&a) as Arc<dyn ConnectionHandle>);
        table.insert("b".into(), Arc::clone(&b) as Arc<dyn ConnectionHandle>);

        let delivered = deliver_all(&table, DeliveryMethod::Write, &json!("all"));

        assert_eq!(delivered, 2);
        assert_eq!(a.writes(), vec![json!("all")]);
        assert_eq!(b.writes(), vec![json!("all")]);
    }
}
