//! Background key migration between shards.
//!
//! Given a destination node, scan every other shard and move the keys
//! whose ring owner is now that destination. Each key moves through
//! three internal primitives (dump at the source, restore at the
//! destination, delete at the source) in that order, so the key is
//! observable on at least one shard at every instant and its absolute
//! TTL deadline rides along in the dump.
//!
//! Per-key failures are logged and skipped: the ring keeps pointing
//! wherever it points, the source copy stays intact, and a later
//! migration pass picks the key up again. Only cancellation aborts
//! the whole procedure.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RouterError;
use crate::router::ShardedStore;
use crate::shard::{Reply, ShardHandle, ShardRequest};

/// Outcome counters for one migration pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStats {
    /// Keys selected for the destination across all source shards.
    pub scanned: usize,
    /// Keys that completed dump → restore → delete.
    pub moved: usize,
    /// Keys skipped: vanished, re-homed mid-flight, or failed a
    /// primitive.
    pub skipped: usize,
}

/// Moves every key whose ring owner is `dest` onto `dest`'s shard.
///
/// Cancellation is honored between keys; an in-flight primitive is
/// allowed to finish. Returns `UnknownNode` when `dest` isn't
/// registered.
pub async fn migrate_to(
    store: &ShardedStore,
    dest: &str,
    token: &CancellationToken,
) -> Result<MigrationStats, RouterError> {
    let cfg = store.config.migration.clone();

    let (nodes, dest_handle) = {
        let top = store.shared.read().await;
        let dest_handle = top
            .shards
            .get(dest)
            .ok_or_else(|| RouterError::UnknownNode {
                node: dest.to_owned(),
            })?
            .handle
            .clone();
        (top.ring.nodes(), dest_handle)
    };

    info!(dest, sources = nodes.len() - 1, "migration scan starting");
    let mut stats = MigrationStats::default();

    for node in nodes.iter().filter(|node| node.as_str() != dest) {
        let Some(src) = store.shard_handle(node).await else {
            warn!(dest, source = %node, "source shard disappeared before scan");
            continue;
        };

        let keys = match src
            .send_internal(ShardRequest::ScanKeys { limit: usize::MAX })
            .await
        {
            Ok(Reply::Strings(keys)) => keys,
            Ok(other) => {
                warn!(source = %node, ?other, "unexpected scan reply");
                continue;
            }
            Err(e) => {
                warn!(source = %node, "scan failed: {e}");
                continue;
            }
        };

        // keep only keys the ring now assigns to the destination
        let pending: Vec<String> = {
            let top = store.shared.read().await;
            keys.into_iter()
                .filter(|key| top.ring.get_node(key) == Some(dest))
                .collect()
        };
        stats.scanned += pending.len();
        debug!(dest, source = %node, keys = pending.len(), "source scan done");

        for batch in pending.chunks(cfg.batch_size.max(1)) {
            for key in batch {
                if token.is_cancelled() {
                    info!(dest, moved = stats.moved, "migration cancelled");
                    return Err(RouterError::Cancelled);
                }

                // the scan may be stale: re-check ownership per key
                let still_ours = {
                    let top = store.shared.read().await;
                    top.ring.get_node(key) == Some(dest)
                };
                if !still_ours {
                    stats.skipped += 1;
                    continue;
                }

                if move_key(&src, &dest_handle, key, cfg.request_timeout).await {
                    stats.moved += 1;
                } else {
                    stats.skipped += 1;
                }

                // micro-yield so a long migration doesn't monopolize
                // the source or destination mailbox
                tokio::time::sleep(cfg.inter_key_yield).await;
            }
        }
    }

    info!(dest, moved = stats.moved, skipped = stats.skipped, "migration pass done");
    Ok(stats)
}

/// Moves one key: dump at `src`, restore at `dest`, delete at `src`.
///
/// Returns `true` when the key now lives at the destination. Any
/// failure before the restore leaves the source copy authoritative
/// and returns `false`.
pub(crate) async fn move_key(
    src: &ShardHandle,
    dest: &ShardHandle,
    key: &str,
    request_timeout: Duration,
) -> bool {
    let dump_req = src.send_internal(ShardRequest::DumpKey {
        key: key.to_owned(),
    });
    let dump = match tokio::time::timeout(request_timeout, dump_req).await {
        Ok(Ok(Reply::Dump(Some(dump)))) => dump,
        Ok(Ok(Reply::Dump(None))) => {
            debug!(key, "key vanished before dump, skipping");
            return false;
        }
        Ok(Ok(other)) => {
            warn!(key, ?other, "unexpected dump reply, skipping");
            return false;
        }
        Ok(Err(e)) => {
            warn!(key, "dump failed: {e}");
            return false;
        }
        Err(_) => {
            warn!(key, "dump timed out, skipping");
            return false;
        }
    };

    // restore strictly before delete: a concurrent reader sees the key
    // on the source until the restore lands, and on the destination
    // afterwards, never on neither
    let restore_req = dest.send_internal(ShardRequest::MigrateRestore { dump });
    match tokio::time::timeout(request_timeout, restore_req).await {
        Ok(Ok(Reply::Ok)) => {}
        Ok(Ok(other)) => {
            warn!(key, ?other, "restore rejected, source copy intact");
            return false;
        }
        Ok(Err(e)) => {
            warn!(key, "restore failed: {e}");
            return false;
        }
        Err(_) => {
            warn!(key, "restore timed out, source copy intact");
            return false;
        }
    }

    let delete_req = src.send_internal(ShardRequest::MigrateDelete {
        key: key.to_owned(),
    });
    match tokio::time::timeout(request_timeout, delete_req).await {
        Ok(Ok(Reply::Bool(_))) => true,
        // the destination copy is live either way; a stray source
        // copy gets cleaned up by the next migration pass
        _ => {
            warn!(key, "source delete failed after restore");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::keyspace::TtlResult;
    use bytes::Bytes;

    async fn seeded_store(keys: usize) -> ShardedStore {
        let store = ShardedStore::new(StoreConfig::default());
        store.add_node("n1").await.unwrap();
        store.add_node("n2").await.unwrap();
        for i in 0..keys {
            store
                .execute(ShardRequest::Set {
                    key: format!("key:{i}"),
                    value: Bytes::from(format!("val:{i}")),
                    expire: None,
                })
                .await
                .unwrap();
        }
        store
    }

    async fn shard_keys(store: &ShardedStore, node: &str) -> Vec<String> {
        let handle = store.shard_handle(node).await.unwrap();
        match handle
            .send_internal(ShardRequest::ScanKeys { limit: usize::MAX })
            .await
            .unwrap()
        {
            Reply::Strings(keys) => keys,
            other => panic!("expected key list, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn migration_rebalances_onto_new_node() {
        let store = seeded_store(60).await;

        let migration = store.add_node("n3").await.unwrap();
        migration.await.unwrap();

        // every key is readable afterwards
        for i in 0..60 {
            let reply = store
                .execute(ShardRequest::Get {
                    key: format!("key:{i}"),
                })
                .await
                .unwrap();
            assert_eq!(reply, Reply::Bytes(Some(Bytes::from(format!("val:{i}")))));
        }

        // single owner: each key lives on exactly one shard, and that
        // shard is the ring's answer for it
        let mut seen = std::collections::HashMap::new();
        for node in ["n1", "n2", "n3"] {
            for key in shard_keys(&store, node).await {
                assert!(
                    seen.insert(key.clone(), node).is_none(),
                    "key {key} on two shards"
                );
            }
        }
        assert_eq!(seen.len(), 60);
        let top = store.shared.read().await;
        for (key, node) in &seen {
            assert_eq!(top.ring.get_node(key), Some(*node), "key {key} misplaced");
        }
    }

    #[tokio::test]
    async fn migration_preserves_ttls() {
        let store = ShardedStore::new(StoreConfig::default());
        store.add_node("n1").await.unwrap();

        store
            .execute(ShardRequest::Set {
                key: "k".into(),
                value: Bytes::from("v"),
                expire: Some(Duration::from_secs(60)),
            })
            .await
            .unwrap();

        let migration = store.add_node("n2").await.unwrap();
        migration.await.unwrap();

        assert_eq!(
            store
                .execute(ShardRequest::Get { key: "k".into() })
                .await
                .unwrap(),
            Reply::Bytes(Some(Bytes::from("v")))
        );
        match store
            .execute(ShardRequest::Ttl { key: "k".into() })
            .await
            .unwrap()
        {
            Reply::Ttl(TtlResult::Seconds(s)) => assert!((55..=60).contains(&s), "ttl {s}"),
            other => panic!("expected seconds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn migration_preserves_collection_values() {
        let store = ShardedStore::new(StoreConfig::default());
        store.add_node("n1").await.unwrap();

        store
            .execute(ShardRequest::SAdd {
                key: "s".into(),
                members: vec!["a".into(), "b".into(), "c".into()],
            })
            .await
            .unwrap();
        store
            .execute(ShardRequest::ZAdd {
                key: "z".into(),
                members: vec![(1.0, "b".into()), (1.0, "a".into()), (2.0, "c".into())],
            })
            .await
            .unwrap();
        for _ in 0..10 {
            store
                .execute(ShardRequest::CmsIncr {
                    key: "c".into(),
                    item: "hot".into(),
                    count: 1,
                })
                .await
                .unwrap();
        }
        store
            .execute(ShardRequest::BfAdd {
                key: "b".into(),
                item: "present".into(),
            })
            .await
            .unwrap();

        let migration = store.add_node("n2").await.unwrap();
        migration.await.unwrap();

        assert_eq!(
            store
                .execute(ShardRequest::SCard { key: "s".into() })
                .await
                .unwrap(),
            Reply::Int(3)
        );
        assert_eq!(
            store
                .execute(ShardRequest::ZRange {
                    key: "z".into(),
                    start: 0,
                    stop: -1
                })
                .await
                .unwrap(),
            Reply::Scored(vec![
                ("a".into(), 1.0),
                ("b".into(), 1.0),
                ("c".into(), 2.0)
            ])
        );
        match store
            .execute(ShardRequest::CmsQuery {
                key: "c".into(),
                item: "hot".into(),
            })
            .await
            .unwrap()
        {
            Reply::Int(n) => assert!(n >= 10),
            other => panic!("expected count, got {other:?}"),
        }
        assert_eq!(
            store
                .execute(ShardRequest::BfExists {
                    key: "b".into(),
                    item: "present".into(),
                })
                .await
                .unwrap(),
            Reply::Bool(true)
        );
    }

    #[tokio::test]
    async fn no_key_is_ever_absent_from_every_shard() {
        let store = seeded_store(80).await;

        // while the migration toward n3 runs, repeatedly scan all
        // shards: restore-before-delete means the union always holds
        // every key, at every instant
        let watcher = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..25 {
                    let mut union = std::collections::HashSet::new();
                    for node in ["n1", "n2", "n3"] {
                        if let Some(handle) = store.shard_handle(node).await {
                            if let Ok(Reply::Strings(keys)) = handle
                                .send_internal(ShardRequest::ScanKeys { limit: usize::MAX })
                                .await
                            {
                                union.extend(keys);
                            }
                        }
                    }
                    for i in 0..80 {
                        assert!(
                            union.contains(&format!("key:{i}")),
                            "key:{i} absent from every shard mid-migration"
                        );
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        let migration = store.add_node("n3").await.unwrap();
        migration.await.unwrap();
        watcher.await.unwrap();

        // once the pass settles, routed reads see every key
        for i in 0..80 {
            let reply = store
                .execute(ShardRequest::Get {
                    key: format!("key:{i}"),
                })
                .await
                .unwrap();
            assert_eq!(reply, Reply::Bytes(Some(Bytes::from(format!("val:{i}")))));
        }
    }

    #[tokio::test]
    async fn cancelled_migration_returns_promptly() {
        let store = seeded_store(30).await;
        store.add_node("n3").await.unwrap().await.unwrap();

        let token = CancellationToken::new();
        token.cancel();
        // a fresh pass with a cancelled token stops at the first key
        // of any non-empty source
        let result = store.migrate_to("n3", &token).await;
        match result {
            Err(RouterError::Cancelled) => {}
            Ok(stats) => assert_eq!(stats.moved, 0, "cancelled pass must not move keys"),
            Err(other) => panic!("expected cancellation, got {other}"),
        }
    }

    #[tokio::test]
    async fn migrating_to_unknown_node_fails() {
        let store = seeded_store(5).await;
        let token = CancellationToken::new();
        let err = store.migrate_to("ghost", &token).await.unwrap_err();
        assert!(matches!(err, RouterError::UnknownNode { .. }));
    }

    #[tokio::test]
    async fn drained_removal_preserves_data() {
        let store = seeded_store(40).await;

        let before = shard_keys(&store, "n1").await.len() + shard_keys(&store, "n2").await.len();
        assert_eq!(before, 40);

        store.remove_node_drained("n1").await.unwrap();
        assert_eq!(store.nodes().await, vec!["n2".to_string()]);

        for i in 0..40 {
            let reply = store
                .execute(ShardRequest::Get {
                    key: format!("key:{i}"),
                })
                .await
                .unwrap();
            assert_eq!(reply, Reply::Bytes(Some(Bytes::from(format!("val:{i}")))));
        }
    }
}
