use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use roomcast_core::clock::Clock;
use roomcast_core::connections::{deliver, ConnectionRegistry};
use roomcast_core::envelope::{BroadcastOptions, MessageKind};
use roomcast_core::ids::SocketId;
use roomcast_store::{Batch, Store, StoreError};

use crate::error::RoomsError;
use crate::keys::KeyScheme;

/// Publish hook the directory calls before resolving a broadcast.
///
/// The single coupling point between the membership directory and the
/// cluster relay.
#[async_trait]
pub trait BroadcastPublish: Send + Sync {
    async fn publish(
        &self,
        data: &Value,
        kind: MessageKind,
        opts: &BroadcastOptions,
    ) -> Result<(), StoreError>;
}

/// Distributed membership directory over socket-to-room relations.
///
/// Both sides of a relation always mutate together in one atomic batch, so
/// no observer ever sees a socket registered in a room without the mirrored
/// room-to-socket entry.
pub struct Directory {
    store: Arc<dyn Store>,
    keys: KeyScheme,
    clock: Arc<dyn Clock>,
    publish: Arc<dyn BroadcastPublish>,
    ttl: Option<Duration>,
}

impl Directory {
    pub fn new(
        store: Arc<dyn Store>,
        keys: KeyScheme,
        clock: Arc<dyn Clock>,
        publish: Arc<dyn BroadcastPublish>,
        ttl: Option<Duration>,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            publish,
            ttl,
        }
    }

    /// Register `id` in `room`.
    ///
    /// Writes land in the current time bucket, whose expiry is refreshed to
    /// the full TTL. Idempotent.
    pub async fn add(&self, id: &SocketId, room: &str) -> Result<(), RoomsError> {
        let now = self.clock.now_ms();
        let socket_key = self.keys.socket_key(id, now, 0);
        let room_key = self.keys.room_key(room, now, 0);

        let mut batch = Batch::new()
            .set_add(socket_key.as_str(), room)
            .set_add(room_key.as_str(), id.as_str());
        if let Some(ttl) = self.ttl {
            batch = batch.expire(socket_key, ttl).expire(room_key, ttl);
        }

        self.store.apply(batch).await?;
        debug!(socket = %id, room, "joined room");
        Ok(())
    }

    /// Rooms `id` currently belongs to, unioned across live buckets.
    pub async fn rooms(&self, id: &SocketId) -> Result<Vec<String>, RoomsError> {
        let now = self.clock.now_ms();
        Ok(self.store.set_union(&self.keys.socket_keys(id, now)).await?)
    }

    /// Every room name known anywhere in the fleet.
    ///
    /// Maintenance/debug path: enumerates the keyspace by prefix, so its
    /// cost scales with total rooms times buckets. Keep it off hot paths.
    pub async fn all_rooms(&self) -> Result<Vec<String>, RoomsError> {
        let keys = self
            .store
            .keys_with_prefix(&self.keys.room_key_prefix())
            .await?;
        let mut seen = HashSet::new();
        let mut rooms = Vec::new();
        for key in keys {
            if let Some(room) = self.keys.room_of(&key) {
                if seen.insert(room.clone()) {
                    rooms.push(room);
                }
            }
        }
        Ok(rooms)
    }

    /// Remove `id` from `room`.
    ///
    /// The pair may live in any still-alive bucket, so every bucket key on
    /// both sides is scrubbed in one atomic batch.
    pub async fn del(&self, id: &SocketId, room: &str) -> Result<(), RoomsError> {
        let now = self.clock.now_ms();
        let mut batch = Batch::new();
        for offset in 0..self.keys.sets() {
            batch = batch
                .set_remove(self.keys.socket_key(id, now, offset), room)
                .set_remove(self.keys.room_key(room, now, offset), id.as_str());
        }
        self.store.apply(batch).await?;
        debug!(socket = %id, room, "left room");
        Ok(())
    }

    /// Remove `id` from every room it joined and forget the socket.
    ///
    /// Rooms that already expired simply drop out as no-ops.
    pub async fn del_all(&self, id: &SocketId) -> Result<(), RoomsError> {
        let rooms = self.rooms(id).await?;
        let now = self.clock.now_ms();

        let mut batch = Batch::new();
        for room in &rooms {
            for offset in 0..self.keys.sets() {
                batch = batch.set_remove(self.keys.room_key(room, now, offset), id.as_str());
            }
        }
        for key in self.keys.socket_keys(id, now) {
            batch = batch.delete(key);
        }

        self.store.apply(batch).await?;
        debug!(socket = %id, rooms = rooms.len(), "left all rooms");
        Ok(())
    }

    /// Socket ids currently in `room`, unioned across live buckets.
    pub async fn clients(&self, room: &str) -> Result<Vec<SocketId>, RoomsError> {
        let now = self.clock.now_ms();
        let members = self.store.set_union(&self.keys.room_keys(room, now)).await?;
        Ok(members.into_iter().map(SocketId::from_raw).collect())
    }

    /// Drop every membership record for `room`, unconditionally.
    pub async fn empty(&self, room: &str) -> Result<(), RoomsError> {
        let now = self.clock.now_ms();
        let mut batch = Batch::new();
        for key in self.keys.room_keys(room, now) {
            batch = batch.delete(key);
        }
        self.store.apply(batch).await?;
        Ok(())
    }

    /// True when no socket is registered in `room`.
    pub async fn is_empty(&self, room: &str) -> Result<bool, RoomsError> {
        Ok(self.clients(room).await?.is_empty())
    }

    /// Fan a message out to the audience described by `opts`.
    ///
    /// The intent is published to every peer first, unconditionally; then
    /// the audience is resolved and delivered to whatever subset is
    /// connected to this node. Peers replay the same resolution against
    /// their own connections.
    pub async fn broadcast(
        &self,
        data: &Value,
        opts: BroadcastOptions,
        connections: &dyn ConnectionRegistry,
    ) -> Result<(), RoomsError> {
        self.publish
            .publish(data, MessageKind::Room, &opts)
            .await?;
        self.deliver_local(data, &opts, connections).await
    }

    /// Resolve the audience of `opts` and deliver to local connections.
    ///
    /// With no rooms listed, the audience is every known socket id in the
    /// fleet, resolved through the debug-grade keyspace scan.
    async fn deliver_local(
        &self,
        data: &Value,
        opts: &BroadcastOptions,
        connections: &dyn ConnectionRegistry,
    ) -> Result<(), RoomsError> {
        let mut seen = HashSet::new();
        let mut targets = Vec::new();

        if opts.rooms.is_empty() {
            let keys = self
                .store
                .keys_with_prefix(&self.keys.socket_key_prefix())
                .await?;
            for key in keys {
                if let Some(id) = self.keys.socket_id_of(&key) {
                    if seen.insert(id.clone()) {
                        targets.push(id);
                    }
                }
            }
        } else {
            for room in &opts.rooms {
                for id in self.clients(room).await? {
                    if seen.insert(id.clone()) {
                        targets.push(id);
                    }
                }
            }
        }

        let except: HashSet<&SocketId> = opts.except.iter().collect();
        let delivered = deliver(
            targets.iter().filter(|id| !except.contains(id)),
            opts.method,
            data,
            connections,
        );
        debug!(
            targets = targets.len(),
            delivered,
            rooms = opts.rooms.len(),
            "room fan-out"
        );
        Ok(())
    }
}
