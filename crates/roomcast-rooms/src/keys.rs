use std::time::Duration;

use roomcast_core::ids::SocketId;

const SOCKET_NS: &str = "socket:";
const ROOM_NS: &str = "room:";

/// Maps (entity, time) onto the bucketed storage key layout.
///
/// A logical key is `sets` physical keys, one per time bucket of width
/// `interval_ms`: writes land in the current bucket only, reads union every
/// bucket that can still be alive, and old buckets age out through native
/// key expiry. This keeps membership writes O(1) instead of refreshing the
/// expiry of every key an entity appears in, at the cost of TTL accuracy of
/// plus or minus one bucket width.
#[derive(Clone, Debug)]
pub struct KeyScheme {
    prefix: String,
    interval_ms: i64,
    sets: u32,
}

impl KeyScheme {
    pub fn new(prefix: impl Into<String>, ttl: Duration, sets: u32) -> Self {
        let sets = sets.max(1);
        let ttl_ms = ttl.as_millis() as i64;
        Self {
            prefix: prefix.into(),
            interval_ms: (ttl_ms / i64::from(sets)).max(1),
            sets,
        }
    }

    pub fn sets(&self) -> u32 {
        self.sets
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    /// Bucket index `offset` steps behind the current one.
    pub fn bucket_index(&self, now_ms: i64, offset: u32) -> i64 {
        now_ms.div_euclid(self.interval_ms) - i64::from(offset)
    }

    pub fn socket_key(&self, id: &SocketId, now_ms: i64, offset: u32) -> String {
        format!(
            "{}{}{}:{}",
            self.prefix,
            SOCKET_NS,
            id.as_str(),
            self.bucket_index(now_ms, offset)
        )
    }

    pub fn room_key(&self, room: &str, now_ms: i64, offset: u32) -> String {
        format!(
            "{}{}{}:{}",
            self.prefix,
            ROOM_NS,
            room,
            self.bucket_index(now_ms, offset)
        )
    }

    /// Every physical key for `id` that can still hold live members, current
    /// bucket first.
    pub fn socket_keys(&self, id: &SocketId, now_ms: i64) -> Vec<String> {
        (0..self.sets)
            .map(|offset| self.socket_key(id, now_ms, offset))
            .collect()
    }

    pub fn room_keys(&self, room: &str, now_ms: i64) -> Vec<String> {
        (0..self.sets)
            .map(|offset| self.room_key(room, now_ms, offset))
            .collect()
    }

    /// Prefix every socket key starts with.
    pub fn socket_key_prefix(&self) -> String {
        format!("{}{}", self.prefix, SOCKET_NS)
    }

    pub fn room_key_prefix(&self) -> String {
        format!("{}{}", self.prefix, ROOM_NS)
    }

    /// Socket id encoded in a physical key, if the key is one of ours.
    ///
    /// Ids may contain `:`, so only the trailing bucket segment is stripped.
    pub fn socket_id_of(&self, key: &str) -> Option<SocketId> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix(SOCKET_NS)?;
        let (id, _bucket) = rest.rsplit_once(':')?;
        (!id.is_empty()).then(|| SocketId::from_raw(id))
    }

    /// Room name encoded in a physical key, if the key is one of ours.
    pub fn room_of(&self, key: &str) -> Option<String> {
        let rest = key.strip_prefix(&self.prefix)?.strip_prefix(ROOM_NS)?;
        let (room, _bucket) = rest.rsplit_once(':')?;
        (!room.is_empty()).then(|| room.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme(ttl_secs: u64, sets: u32) -> KeyScheme {
        KeyScheme::new("", Duration::from_secs(ttl_secs), sets)
    }

    #[test]
    fn one_interval_advances_the_bucket_by_one() {
        // ttl=100s over 10 sets: 10s buckets.
        let keys = scheme(100, 10);
        assert_eq!(keys.interval_ms(), 10_000);

        let now = 1_000_000;
        let before = keys.bucket_index(now, 0);
        let after = keys.bucket_index(now + 10_000, 0);
        assert_eq!(after, before + 1);
    }

    #[test]
    fn default_interval_advances_the_bucket_by_one() {
        // Defaults: 86400s over 10 sets, so 2h24m buckets.
        let keys = scheme(86_400, 10);
        assert_eq!(keys.interval_ms(), 8_640_000);

        let now = 1_700_000_000_000;
        assert_eq!(
            keys.bucket_index(now + keys.interval_ms(), 0),
            keys.bucket_index(now, 0) + 1
        );
    }

    #[test]
    fn offset_shifts_the_index_back() {
        let keys = scheme(100, 10);
        let now = 123_456_789;
        assert_eq!(keys.bucket_index(now, 0) - 1, keys.bucket_index(now, 1));
        for offset in 0..10 {
            assert_eq!(
                keys.bucket_index(now, 0) - i64::from(offset),
                keys.bucket_index(now, offset)
            );
        }
    }

    #[test]
    fn key_layout() {
        let keys = KeyScheme::new("app:", Duration::from_secs(100), 10);
        let now = 50_000; // bucket 5
        assert_eq!(
            keys.socket_key(&SocketId::from_raw("12"), now, 0),
            "app:socket:12:5"
        );
        assert_eq!(keys.room_key("news", now, 1), "app:room:news:4");
    }

    #[test]
    fn live_keys_walk_backwards_from_the_current_bucket() {
        let keys = scheme(100, 3);
        let now = 200_000; // interval 33_333ms, bucket 6
        let socket_keys = keys.socket_keys(&SocketId::from_raw("a"), now);
        assert_eq!(socket_keys, vec!["socket:a:6", "socket:a:5", "socket:a:4"]);
        assert_eq!(socket_keys.len(), keys.sets() as usize);
    }

    #[test]
    fn parse_is_the_inverse_of_format() {
        let keys = KeyScheme::new("app:", Duration::from_secs(100), 10);
        let id = SocketId::from_raw("spark:a:b");
        let key = keys.socket_key(&id, 42_000, 0);
        assert_eq!(keys.socket_id_of(&key), Some(id));

        let room_key = keys.room_key("my:room:name", 42_000, 0);
        assert_eq!(keys.room_of(&room_key), Some("my:room:name".to_string()));
    }

    #[test]
    fn parse_rejects_foreign_keys() {
        let keys = KeyScheme::new("app:", Duration::from_secs(100), 10);
        assert_eq!(keys.socket_id_of("other:socket:12:5"), None);
        assert_eq!(keys.socket_id_of("app:room:news:5"), None);
        assert_eq!(keys.room_of("app:socket:12:5"), None);
    }

    #[test]
    fn zero_sets_is_clamped_to_one() {
        let keys = scheme(100, 0);
        assert_eq!(keys.sets(), 1);
        assert_eq!(keys.interval_ms(), 100_000);
    }
}
