//! The sharded store: hash ring plus node → shard topology.
//!
//! `ShardedStore` owns the ring and the live shard actors behind one
//! reader-writer lock. Command routing takes the read side for just
//! long enough to resolve a handle; `add_node`/`remove_node` take the
//! write side. The lock is never held across a mailbox await, so a
//! slow shard can't stall routing for everyone else.

use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::RouterError;
use crate::hashing::fnv1a_32;
use crate::migrate::{self, MigrationStats};
use crate::ring::HashRing;
use crate::shard::{self, Reply, ShardHandle, ShardRequest, ShardSlot};

/// How long a new shard gets to answer the readiness probe before the
/// node addition is rolled back.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared routing state: the ring and the shard actors it points at.
/// Mutations keep both in lockstep: every ring node has a live shard.
#[derive(Debug)]
pub(crate) struct Topology {
    pub(crate) ring: HashRing,
    pub(crate) shards: AHashMap<String, ShardSlot>,
}

/// Handle to the sharded store. Cheap to clone; all clones share the
/// same topology.
#[derive(Debug, Clone)]
pub struct ShardedStore {
    pub(crate) shared: Arc<RwLock<Topology>>,
    pub(crate) config: StoreConfig,
}

impl ShardedStore {
    /// Creates a store with no nodes. Add at least one before serving
    /// traffic.
    pub fn new(config: StoreConfig) -> Self {
        let topology = Topology {
            ring: HashRing::new(config.replicas),
            shards: AHashMap::new(),
        };
        Self {
            shared: Arc::new(RwLock::new(topology)),
            config,
        }
    }

    /// Adds a node: spawns its shard actor, registers it on the ring,
    /// and waits up to five seconds for the actor to acknowledge a
    /// readiness probe. A shard that never comes up is rolled back out
    /// of the ring and the map atomically.
    ///
    /// On success a background migration toward the new node is
    /// scheduled; the returned join handle resolves when that
    /// migration finishes (callers are free to drop it).
    pub async fn add_node(&self, id: &str) -> Result<JoinHandle<()>, RouterError> {
        let handle = {
            let mut top = self.shared.write().await;
            if top.shards.contains_key(id) {
                return Err(RouterError::DuplicateNode { node: id.to_owned() });
            }
            let slot = shard::spawn(id.to_owned(), Arc::downgrade(&self.shared), &self.config);
            let handle = slot.handle.clone();
            top.shards.insert(id.to_owned(), slot);
            top.ring.add_node(id);
            handle
        };

        let probe = tokio::time::timeout(READY_TIMEOUT, handle.send_internal(ShardRequest::Ready));
        match probe.await {
            Ok(Ok(Reply::Ok)) => {}
            _ => {
                let mut top = self.shared.write().await;
                top.ring.remove_node(id);
                if let Some(slot) = top.shards.remove(id) {
                    let _ = slot.quit.send(true);
                }
                warn!(node = id, "shard failed readiness probe, rolled back");
                return Err(RouterError::NodeNotReady { node: id.to_owned() });
            }
        }
        info!(node = id, "node added");

        let store = self.clone();
        let dest = id.to_owned();
        Ok(tokio::spawn(async move {
            let token = CancellationToken::new();
            match migrate::migrate_to(&store, &dest, &token).await {
                Ok(stats) => {
                    info!(
                        node = %dest,
                        moved = stats.moved,
                        skipped = stats.skipped,
                        "background migration finished"
                    );
                }
                Err(e) => warn!(node = %dest, "background migration failed: {e}"),
            }
        }))
    }

    /// Removes a node: signals its shard to drain and stop, and drops
    /// it from the ring and the map. Resident keys are *not*
    /// redistributed; callers that need the data use
    /// [`remove_node_drained`](Self::remove_node_drained) instead.
    ///
    /// Returns whether the node existed.
    pub async fn remove_node(&self, id: &str) -> bool {
        let mut top = self.shared.write().await;
        top.ring.remove_node(id);
        match top.shards.remove(id) {
            Some(slot) => {
                let _ = slot.quit.send(true);
                info!(node = id, "node removed");
                true
            }
            None => false,
        }
    }

    /// Data-preserving removal: takes the node off the ring first,
    /// drains every resident key to its new ring owner, then tears
    /// the shard down. Returns the number of keys moved.
    pub async fn remove_node_drained(&self, id: &str) -> Result<usize, RouterError> {
        let handle = {
            let mut top = self.shared.write().await;
            let Some(slot) = top.shards.get(id) else {
                return Err(RouterError::UnknownNode { node: id.to_owned() });
            };
            let handle = slot.handle.clone();
            // off the ring: new writes re-home immediately, while the
            // shard itself stays alive for the outbound drain
            top.ring.remove_node(id);
            handle
        };

        let keys = match handle
            .send_internal(ShardRequest::ScanKeys { limit: usize::MAX })
            .await?
        {
            Reply::Strings(keys) => keys,
            other => {
                warn!(node = id, ?other, "unexpected scan reply during drain");
                Vec::new()
            }
        };

        let mut moved = 0;
        for key in &keys {
            let dest = {
                let top = self.shared.read().await;
                top.ring
                    .get_node(key)
                    .and_then(|owner| top.shards.get(owner))
                    .map(|slot| slot.handle.clone())
            };
            let Some(dest) = dest else {
                warn!(node = id, key = %key, "no surviving owner, key dropped with node");
                continue;
            };
            if migrate::move_key(&handle, &dest, key, self.config.migration.request_timeout).await {
                moved += 1;
            }
            tokio::time::sleep(self.config.migration.inter_key_yield).await;
        }
        debug!(node = id, moved, total = keys.len(), "drain complete");

        let slot = self.shared.write().await.shards.remove(id);
        if let Some(slot) = slot {
            let _ = slot.quit.send(true);
        }
        info!(node = id, "node removed after drain");
        Ok(moved)
    }

    /// Runs an outbound migration toward `dest` with an explicit
    /// cancellation token. `add_node` schedules this automatically;
    /// this entry point exists for admin-driven rebalancing.
    pub async fn migrate_to(
        &self,
        dest: &str,
        token: &CancellationToken,
    ) -> Result<MigrationStats, RouterError> {
        migrate::migrate_to(self, dest, token).await
    }

    /// Routes a keyed request to the shard owning its key and awaits
    /// the reply.
    ///
    /// When the ring is empty, write-creating commands fall back to a
    /// deterministic pick over the live nodes so fresh writes get a
    /// home; everything else fails with `NoShard`.
    pub async fn execute(&self, request: ShardRequest) -> Result<Reply, RouterError> {
        let handle = {
            let top = self.shared.read().await;
            let key = match request.key() {
                Some(key) => key,
                None => {
                    return Err(RouterError::NoShard {
                        key: String::new(),
                    })
                }
            };
            let node = match top.ring.get_node(key) {
                Some(node) => Some(node.to_owned()),
                None if request.creates_key() => fallback_node(&top, key),
                None => None,
            };
            let node = node.ok_or_else(|| RouterError::NoShard {
                key: key.to_owned(),
            })?;
            top.shards
                .get(&node)
                .ok_or_else(|| RouterError::NoShard {
                    key: key.to_owned(),
                })?
                .handle
                .clone()
        };
        handle.send(request).await
    }

    /// Signals every shard to quit and waits for all serving tasks to
    /// finish, failing with `Timeout` when the deadline elapses first.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), RouterError> {
        let slots: Vec<ShardSlot> = {
            let mut top = self.shared.write().await;
            top.ring = HashRing::new(self.config.replicas);
            top.shards.drain().map(|(_, slot)| slot).collect()
        };
        for slot in &slots {
            let _ = slot.quit.send(true);
        }

        let drain = async move {
            for slot in slots {
                let _ = slot.task.await;
            }
        };
        tokio::time::timeout(deadline, drain)
            .await
            .map_err(|_| RouterError::Timeout)
    }

    /// Live node ids, in no particular order.
    pub async fn nodes(&self) -> Vec<String> {
        self.shared.read().await.ring.nodes()
    }

    /// Number of live nodes.
    pub async fn node_count(&self) -> usize {
        self.shared.read().await.ring.len()
    }

    /// The mailbox handle for a specific node, when it exists.
    pub(crate) async fn shard_handle(&self, node: &str) -> Option<ShardHandle> {
        self.shared
            .read()
            .await
            .shards
            .get(node)
            .map(|slot| slot.handle.clone())
    }
}

/// Deterministic home for a fresh write when the ring is empty: hash
/// the key over the sorted live node list.
fn fallback_node(top: &Topology, key: &str) -> Option<String> {
    if top.shards.is_empty() {
        return None;
    }
    let mut nodes: Vec<&String> = top.shards.keys().collect();
    nodes.sort();
    let idx = fnv1a_32(key.as_bytes()) as usize % nodes.len();
    Some(nodes[idx].clone())
}
