//! Shard actor: an independent owner of one keyspace slice.
//!
//! Each shard runs as its own tokio task, owning a [`Keyspace`] with no
//! locking. Requests arrive over a bounded mpsc mailbox and replies go
//! back on per-request oneshot channels, so all mutations serialize in
//! mailbox arrival order. The same loop runs the active-expiration tick,
//! which keeps the sweep serialized with command execution.
//!
//! Before dispatching an external request the shard checks the ring: a
//! key that now belongs to another live shard is forwarded there on a
//! fresh reply slot and the answer relayed back, so clients never
//! observe a stale routing decision. Internal requests (migration
//! primitives, readiness probes) skip the check.

use std::sync::Weak;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::dump::KeyDump;
use crate::error::{RouterError, WrongType};
use crate::expiry;
use crate::keyspace::{Keyspace, TtlResult};
use crate::router::Topology;

/// A typed command sent to a shard.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardRequest {
    Set {
        key: String,
        value: Bytes,
        expire: Option<Duration>,
    },
    Get {
        key: String,
    },
    Del {
        key: String,
    },
    Ttl {
        key: String,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    SRem {
        key: String,
        members: Vec<String>,
    },
    SMembers {
        key: String,
    },
    SCard {
        key: String,
    },
    SIsMember {
        key: String,
        member: String,
    },
    SUnion {
        key: String,
        others: Vec<String>,
    },
    SInter {
        key: String,
        others: Vec<String>,
    },
    SDiff {
        key: String,
        others: Vec<String>,
    },
    SPop {
        key: String,
        count: usize,
    },
    SRandMember {
        key: String,
        count: i64,
    },
    HSet {
        key: String,
        field: String,
        value: String,
    },
    HGet {
        key: String,
        field: String,
    },
    HDel {
        key: String,
        fields: Vec<String>,
    },
    HGetAll {
        key: String,
    },
    LPush {
        key: String,
        values: Vec<String>,
    },
    RPush {
        key: String,
        values: Vec<String>,
    },
    LPop {
        key: String,
    },
    RPop {
        key: String,
    },
    LLen {
        key: String,
    },
    LRange {
        key: String,
        start: i64,
        stop: i64,
    },
    ZAdd {
        key: String,
        members: Vec<(f64, String)>,
    },
    ZScore {
        key: String,
        member: String,
    },
    ZCard {
        key: String,
    },
    ZRank {
        key: String,
        member: String,
    },
    ZRange {
        key: String,
        start: i64,
        stop: i64,
    },
    CmsIncr {
        key: String,
        item: String,
        count: u32,
    },
    CmsQuery {
        key: String,
        item: String,
    },
    BfAdd {
        key: String,
        item: String,
    },
    BfExists {
        key: String,
        item: String,
    },
    /// Serialize a key for migration. Read-only.
    DumpKey {
        key: String,
    },
    /// Install a migrated key, replacing any existing value.
    MigrateRestore {
        dump: KeyDump,
    },
    /// Remove a key after its migration completed.
    MigrateDelete {
        key: String,
    },
    /// Enumerate up to `limit` live keys on this shard.
    ScanKeys {
        limit: usize,
    },
    /// Readiness probe answered once the serving loop runs.
    Ready,
}

impl ShardRequest {
    /// The key this request routes on. `None` for requests that don't
    /// target a key (the ring check is skipped for those).
    pub fn key(&self) -> Option<&str> {
        use ShardRequest::*;
        match self {
            Set { key, .. }
            | Get { key }
            | Del { key }
            | Ttl { key }
            | SAdd { key, .. }
            | SRem { key, .. }
            | SMembers { key }
            | SCard { key }
            | SIsMember { key, .. }
            | SUnion { key, .. }
            | SInter { key, .. }
            | SDiff { key, .. }
            | SPop { key, .. }
            | SRandMember { key, .. }
            | HSet { key, .. }
            | HGet { key, .. }
            | HDel { key, .. }
            | HGetAll { key }
            | LPush { key, .. }
            | RPush { key, .. }
            | LPop { key }
            | RPop { key }
            | LLen { key }
            | LRange { key, .. }
            | ZAdd { key, .. }
            | ZScore { key, .. }
            | ZCard { key }
            | ZRank { key, .. }
            | ZRange { key, .. }
            | CmsIncr { key, .. }
            | CmsQuery { key, .. }
            | BfAdd { key, .. }
            | BfExists { key, .. }
            | DumpKey { key }
            | MigrateRestore { dump: KeyDump { key, .. } }
            | MigrateDelete { key } => Some(key.as_str()),
            ScanKeys { .. } | Ready => None,
        }
    }

    /// Whether this command creates the key when it is absent. These
    /// get a deterministic fallback shard when the ring is empty.
    pub fn creates_key(&self) -> bool {
        matches!(
            self,
            ShardRequest::Set { .. }
                | ShardRequest::HSet { .. }
                | ShardRequest::SAdd { .. }
                | ShardRequest::ZAdd { .. }
                | ShardRequest::LPush { .. }
                | ShardRequest::RPush { .. }
        )
    }
}

/// The shard's answer, one variant per result shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Plain acknowledgement (SET, CMSINCR, restore).
    Ok,
    /// String payload or nil (GET).
    Bytes(Option<Bytes>),
    /// Counts and lengths.
    Int(i64),
    /// Boolean results (DEL, SISMEMBER, BFADD, BFEXISTS).
    Bool(bool),
    /// Optional single element (HGET, LPOP, RPOP).
    Str(Option<String>),
    /// Member/element lists (SMEMBERS, LRANGE, SPOP, SCANKEYS).
    Strings(Vec<String>),
    /// Field/value pairs (HGETALL).
    Pairs(Vec<(String, String)>),
    /// (member, score) pairs in rank order (ZRANGE).
    Scored(Vec<(String, f64)>),
    /// Optional score (ZSCORE).
    Score(Option<f64>),
    /// Optional rank (ZRANK).
    Rank(Option<i64>),
    /// TTL query result.
    Ttl(TtlResult),
    /// Migration dump, `None` when the key is absent.
    Dump(Option<KeyDump>),
    /// Command hit a key of another type.
    WrongType,
    /// The key's ring owner could not be resolved to a live shard.
    Moved { key: String, node: String },
    /// Catch-all failure carried back to the caller.
    Error(String),
}

/// A request bundled with its reply slot and routing mode.
#[derive(Debug)]
pub(crate) struct ShardMessage {
    pub(crate) request: ShardRequest,
    /// Internal requests (migration, probes) skip the ring check.
    pub(crate) internal: bool,
    pub(crate) reply: oneshot::Sender<Reply>,
}

/// Cloneable sender for one shard's mailbox.
#[derive(Debug, Clone)]
pub struct ShardHandle {
    tx: mpsc::Sender<ShardMessage>,
}

impl ShardHandle {
    /// Sends an external request and awaits the reply. Blocks while
    /// the mailbox is full; errors when the shard has stopped.
    pub async fn send(&self, request: ShardRequest) -> Result<Reply, RouterError> {
        self.send_raw(request, false).await
    }

    /// Sends an internal request (no ring check at the shard).
    pub(crate) async fn send_internal(&self, request: ShardRequest) -> Result<Reply, RouterError> {
        self.send_raw(request, true).await
    }

    async fn send_raw(&self, request: ShardRequest, internal: bool) -> Result<Reply, RouterError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let msg = ShardMessage {
            request,
            internal,
            reply: reply_tx,
        };
        self.tx
            .send(msg)
            .await
            .map_err(|_| RouterError::ShardUnavailable)?;
        reply_rx.await.map_err(|_| RouterError::ShardUnavailable)
    }
}

/// A running shard: its mailbox, quit signal, and serving task.
#[derive(Debug)]
pub(crate) struct ShardSlot {
    pub(crate) handle: ShardHandle,
    pub(crate) quit: watch::Sender<bool>,
    pub(crate) task: JoinHandle<()>,
}

/// Spawns a shard's serving task.
///
/// `parent` is a weak reference to the router topology used for ring
/// checks; a dead reference (router dropped, or standalone tests)
/// disables forwarding and the shard serves everything locally.
pub(crate) fn spawn(
    node: String,
    parent: Weak<RwLock<Topology>>,
    config: &StoreConfig,
) -> ShardSlot {
    let (tx, rx) = mpsc::channel(config.mailbox_capacity);
    let (quit_tx, quit_rx) = watch::channel(false);
    let task = tokio::spawn(run_shard(node, rx, quit_rx, parent, config.clone()));
    ShardSlot {
        handle: ShardHandle { tx },
        quit: quit_tx,
        task,
    }
}

/// The serving loop: dispatch messages, tick expiration, drain on quit.
async fn run_shard(
    node: String,
    mut rx: mpsc::Receiver<ShardMessage>,
    mut quit: watch::Receiver<bool>,
    parent: Weak<RwLock<Topology>>,
    config: StoreConfig,
) {
    let mut ks = Keyspace::with_config(config.clone());

    let mut ttl_tick = tokio::time::interval(config.ttl_interval);
    ttl_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    debug!(node, "shard serving");
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(msg) => handle_message(&node, &mut ks, &parent, msg).await,
                None => break, // all senders gone
            },
            _ = quit.changed() => {
                // serve whatever is already queued, then stop
                while let Ok(msg) = rx.try_recv() {
                    handle_message(&node, &mut ks, &parent, msg).await;
                }
                break;
            }
            _ = ttl_tick.tick() => {
                let removed = expiry::run_expiration_cycle(&mut ks, config.ttl_sample_size);
                if removed > 0 {
                    debug!(node, removed, "active expiration swept keys");
                }
            }
        }
    }
    debug!(node, keys = ks.len(), "shard stopped");
}

/// Where a key's ring owner turned out to live.
enum Owner {
    /// This shard (or no routing context): serve locally.
    Local,
    /// Another live shard: forward there.
    Remote(ShardHandle, String),
    /// The ring names an owner with no live shard behind it.
    Unresolved(String),
}

async fn handle_message(
    node: &str,
    ks: &mut Keyspace,
    parent: &Weak<RwLock<Topology>>,
    msg: ShardMessage,
) {
    if !msg.internal {
        if let Some(key) = msg.request.key() {
            match resolve_owner(node, parent, key).await {
                Owner::Local => {}
                Owner::Remote(dest, owner) => {
                    forward(node, dest, owner, msg).await;
                    return;
                }
                Owner::Unresolved(owner) => {
                    warn!(node, key, owner = %owner, "ring names a node with no live shard");
                    let _ = msg.reply.send(Reply::Moved {
                        key: key.to_owned(),
                        node: owner,
                    });
                    return;
                }
            }
        }
    }

    let reply = dispatch(ks, msg.request);
    let _ = msg.reply.send(reply);
}

/// Resolves the authoritative location for `key`. The topology lock is
/// held only for the lookup, never across dispatch or a mailbox await.
async fn resolve_owner(node: &str, parent: &Weak<RwLock<Topology>>, key: &str) -> Owner {
    let Some(shared) = parent.upgrade() else {
        return Owner::Local;
    };
    let top = shared.read().await;
    match top.ring.get_node(key) {
        // empty ring: no authority to defer to
        None => Owner::Local,
        Some(owner) if owner == node => Owner::Local,
        Some(owner) => match top.shards.get(owner) {
            Some(slot) => Owner::Remote(slot.handle.clone(), owner.to_owned()),
            None => Owner::Unresolved(owner.to_owned()),
        },
    }
}

/// Forwards a misrouted request to its owner on a fresh reply slot and
/// relays the answer; the caller's slot is never handed downstream.
async fn forward(node: &str, dest: ShardHandle, owner: String, msg: ShardMessage) {
    debug!(node, owner = %owner, "forwarding misrouted request");
    let reply = match dest.send_raw(msg.request, msg.internal).await {
        Ok(reply) => reply,
        Err(e) => Reply::Error(e.to_string()),
    };
    let _ = msg.reply.send(reply);
}

/// Executes one request against the keyspace.
fn dispatch(ks: &mut Keyspace, request: ShardRequest) -> Reply {
    use ShardRequest::*;
    match request {
        Set { key, value, expire } => {
            ks.set(key, value, expire);
            Reply::Ok
        }
        Get { key } => typed(ks.get(&key), Reply::Bytes),
        Del { key } => Reply::Bool(ks.del(&key)),
        Ttl { key } => Reply::Ttl(ks.ttl(&key)),

        SAdd { key, members } => typed(ks.sadd(&key, &members), count),
        SRem { key, members } => typed(ks.srem(&key, &members), count),
        SMembers { key } => typed(ks.smembers(&key), Reply::Strings),
        SCard { key } => typed(ks.scard(&key), count),
        SIsMember { key, member } => typed(ks.sismember(&key, &member), Reply::Bool),
        SUnion { key, others } => typed(ks.sunion(&join_keys(key, others)), Reply::Strings),
        SInter { key, others } => typed(ks.sinter(&join_keys(key, others)), Reply::Strings),
        SDiff { key, others } => typed(ks.sdiff(&join_keys(key, others)), Reply::Strings),
        SPop { key, count: n } => typed(ks.spop(&key, n), Reply::Strings),
        SRandMember { key, count: n } => typed(ks.srandmember(&key, n), Reply::Strings),

        HSet { key, field, value } => typed(ks.hset(&key, &field, &value), Reply::Int),
        HGet { key, field } => typed(ks.hget(&key, &field), Reply::Str),
        HDel { key, fields } => typed(ks.hdel(&key, &fields), count),
        HGetAll { key } => typed(ks.hgetall(&key), Reply::Pairs),

        LPush { key, values } => typed(ks.lpush(&key, &values), count),
        RPush { key, values } => typed(ks.rpush(&key, &values), count),
        LPop { key } => typed(ks.lpop(&key), Reply::Str),
        RPop { key } => typed(ks.rpop(&key), Reply::Str),
        LLen { key } => typed(ks.llen(&key), count),
        LRange { key, start, stop } => typed(ks.lrange(&key, start, stop), Reply::Strings),

        ZAdd { key, members } => typed(ks.zadd(&key, &members), count),
        ZScore { key, member } => typed(ks.zscore(&key, &member), Reply::Score),
        ZCard { key } => typed(ks.zcard(&key), count),
        ZRank { key, member } => typed(ks.zrank(&key, &member), |rank| {
            Reply::Rank(rank.map(|r| r as i64))
        }),
        ZRange { key, start, stop } => typed(ks.zrange(&key, start, stop), Reply::Scored),

        CmsIncr { key, item, count: n } => typed(ks.cms_incr(&key, &item, n), |()| Reply::Ok),
        CmsQuery { key, item } => typed(ks.cms_query(&key, &item), |n| Reply::Int(i64::from(n))),
        BfAdd { key, item } => typed(ks.bf_add(&key, &item), Reply::Bool),
        BfExists { key, item } => typed(ks.bf_exists(&key, &item), Reply::Bool),

        DumpKey { key } => Reply::Dump(ks.dump(&key)),
        MigrateRestore { dump } => match ks.restore(dump) {
            Ok(()) => Reply::Ok,
            Err(e) => Reply::Error(format!("restore failed: {e}")),
        },
        MigrateDelete { key } => Reply::Bool(ks.del(&key)),
        ScanKeys { limit } => Reply::Strings(ks.scan_keys(limit)),
        Ready => Reply::Ok,
    }
}

/// Maps a typed keyspace result into a reply, folding `WrongType`.
fn typed<T>(result: Result<T, WrongType>, to_reply: impl FnOnce(T) -> Reply) -> Reply {
    match result {
        Ok(value) => to_reply(value),
        Err(WrongType) => Reply::WrongType,
    }
}

fn count(n: usize) -> Reply {
    Reply::Int(n as i64)
}

fn join_keys(first: String, rest: Vec<String>) -> Vec<String> {
    let mut keys = Vec::with_capacity(1 + rest.len());
    keys.push(first);
    keys.extend(rest);
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standalone(config: &StoreConfig) -> ShardSlot {
        spawn("test-node".into(), Weak::new(), config)
    }

    #[test]
    fn dispatch_set_and_get() {
        let mut ks = Keyspace::new();
        let reply = dispatch(
            &mut ks,
            ShardRequest::Set {
                key: "k".into(),
                value: Bytes::from("v"),
                expire: None,
            },
        );
        assert_eq!(reply, Reply::Ok);

        let reply = dispatch(&mut ks, ShardRequest::Get { key: "k".into() });
        assert_eq!(reply, Reply::Bytes(Some(Bytes::from("v"))));
    }

    #[test]
    fn dispatch_get_missing() {
        let mut ks = Keyspace::new();
        let reply = dispatch(&mut ks, ShardRequest::Get { key: "nope".into() });
        assert_eq!(reply, Reply::Bytes(None));
    }

    #[test]
    fn dispatch_wrong_type() {
        let mut ks = Keyspace::new();
        dispatch(
            &mut ks,
            ShardRequest::SAdd {
                key: "s".into(),
                members: vec!["a".into()],
            },
        );
        let reply = dispatch(&mut ks, ShardRequest::Get { key: "s".into() });
        assert_eq!(reply, Reply::WrongType);
    }

    #[test]
    fn dispatch_zrank_shapes() {
        let mut ks = Keyspace::new();
        dispatch(
            &mut ks,
            ShardRequest::ZAdd {
                key: "z".into(),
                members: vec![(1.0, "a".into())],
            },
        );
        assert_eq!(
            dispatch(
                &mut ks,
                ShardRequest::ZRank {
                    key: "z".into(),
                    member: "a".into()
                }
            ),
            Reply::Rank(Some(0))
        );
        assert_eq!(
            dispatch(
                &mut ks,
                ShardRequest::ZRank {
                    key: "z".into(),
                    member: "missing".into()
                }
            ),
            Reply::Rank(None)
        );
    }

    #[test]
    fn dispatch_migration_primitives() {
        let mut src = Keyspace::new();
        dispatch(
            &mut src,
            ShardRequest::Set {
                key: "k".into(),
                value: Bytes::from("v"),
                expire: Some(Duration::from_secs(60)),
            },
        );

        let dump = match dispatch(&mut src, ShardRequest::DumpKey { key: "k".into() }) {
            Reply::Dump(Some(dump)) => dump,
            other => panic!("expected dump, got {other:?}"),
        };

        // dump is read-only
        assert_eq!(
            dispatch(&mut src, ShardRequest::Get { key: "k".into() }),
            Reply::Bytes(Some(Bytes::from("v")))
        );

        let mut dst = Keyspace::new();
        assert_eq!(
            dispatch(&mut dst, ShardRequest::MigrateRestore { dump }),
            Reply::Ok
        );
        assert_eq!(
            dispatch(&mut dst, ShardRequest::Get { key: "k".into() }),
            Reply::Bytes(Some(Bytes::from("v")))
        );
        match dispatch(&mut dst, ShardRequest::Ttl { key: "k".into() }) {
            Reply::Ttl(TtlResult::Seconds(s)) => assert!((58..=60).contains(&s)),
            other => panic!("expected seconds, got {other:?}"),
        }

        assert_eq!(
            dispatch(&mut src, ShardRequest::MigrateDelete { key: "k".into() }),
            Reply::Bool(true)
        );
        assert_eq!(
            dispatch(&mut src, ShardRequest::MigrateDelete { key: "k".into() }),
            Reply::Bool(false)
        );
    }

    #[test]
    fn dispatch_dump_missing_key() {
        let mut ks = Keyspace::new();
        assert_eq!(
            dispatch(&mut ks, ShardRequest::DumpKey { key: "nope".into() }),
            Reply::Dump(None)
        );
    }

    #[test]
    fn request_key_and_creates_key() {
        let get = ShardRequest::Get { key: "k".into() };
        assert_eq!(get.key(), Some("k"));
        assert!(!get.creates_key());

        let set = ShardRequest::Set {
            key: "k".into(),
            value: Bytes::new(),
            expire: None,
        };
        assert!(set.creates_key());

        assert_eq!(ShardRequest::Ready.key(), None);
        assert_eq!(ShardRequest::ScanKeys { limit: 10 }.key(), None);
    }

    #[tokio::test]
    async fn shard_round_trip() {
        let config = StoreConfig::default();
        let slot = standalone(&config);

        let reply = slot
            .handle
            .send(ShardRequest::Set {
                key: "hello".into(),
                value: Bytes::from("world"),
                expire: None,
            })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Ok);

        let reply = slot
            .handle
            .send(ShardRequest::Get { key: "hello".into() })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Bytes(Some(Bytes::from("world"))));
    }

    #[tokio::test]
    async fn ready_probe_answers() {
        let config = StoreConfig::default();
        let slot = standalone(&config);
        let reply = slot.handle.send_internal(ShardRequest::Ready).await.unwrap();
        assert_eq!(reply, Reply::Ok);
    }

    #[tokio::test]
    async fn expired_key_through_shard() {
        let config = StoreConfig::default();
        let slot = standalone(&config);

        slot.handle
            .send(ShardRequest::Set {
                key: "temp".into(),
                value: Bytes::from("gone"),
                expire: Some(Duration::from_millis(10)),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let reply = slot
            .handle
            .send(ShardRequest::Get { key: "temp".into() })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Bytes(None));
    }

    #[tokio::test]
    async fn active_expiration_sweeps_without_access() {
        let config = StoreConfig {
            ttl_interval: Duration::from_millis(50),
            ..StoreConfig::default()
        };
        let slot = standalone(&config);

        slot.handle
            .send(ShardRequest::Set {
                key: "ephemeral".into(),
                value: Bytes::from("temp"),
                expire: Some(Duration::from_millis(10)),
            })
            .await
            .unwrap();
        slot.handle
            .send(ShardRequest::Set {
                key: "persistent".into(),
                value: Bytes::from("stays"),
                expire: None,
            })
            .await
            .unwrap();

        // long enough for the TTL to pass and a tick to fire
        tokio::time::sleep(Duration::from_millis(150)).await;

        // scan (not get) so the removal can't be blamed on lazy expiry
        let reply = slot
            .handle
            .send_internal(ShardRequest::ScanKeys { limit: usize::MAX })
            .await
            .unwrap();
        assert_eq!(reply, Reply::Strings(vec!["persistent".into()]));
    }

    #[tokio::test]
    async fn quit_stops_the_shard_after_serving() {
        let config = StoreConfig::default();
        let slot = standalone(&config);

        let handle = slot.handle.clone();
        let pending = tokio::spawn(async move {
            handle
                .send(ShardRequest::Set {
                    key: "k".into(),
                    value: Bytes::from("v"),
                    expire: None,
                })
                .await
        });
        // let the write reach the mailbox before signalling quit
        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.quit.send(true).unwrap();

        assert_eq!(pending.await.unwrap().unwrap(), Reply::Ok);
        slot.task.await.unwrap();
    }

    #[tokio::test]
    async fn send_to_stopped_shard_errors() {
        let config = StoreConfig::default();
        let slot = standalone(&config);
        slot.quit.send(true).unwrap();
        slot.task.await.unwrap();

        let err = slot
            .handle
            .send(ShardRequest::Get { key: "k".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::ShardUnavailable));
    }
}
