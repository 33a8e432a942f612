//! The membership manager: the authoritative cluster view, the discovery
//! loop, and the node lifecycle state machine. This is the core of the
//! router.

use crate::config::RouterConfig;
use crate::error::Result;
use crate::listener::ClusterListener;
use crate::node::{NodeHandle, NodeHandleFactory, NodeId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock as SyncRwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

/// Owns `nodes`, `active`, and `downed`, and drives the periodic discovery
/// pass that keeps them consistent.
pub struct MembershipManager {
    nodes: DashMap<NodeId, Arc<dyn NodeHandle>>,
    active: SyncRwLock<Arc<Vec<NodeId>>>,
    downed: SyncRwLock<Arc<Vec<NodeId>>>,
    config: Arc<RouterConfig>,
    handle_factory: Arc<dyn NodeHandleFactory>,
    listener: Arc<dyn ClusterListener>,
    scheduler: AsyncMutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

impl MembershipManager {
    pub fn new(config: Arc<RouterConfig>, handle_factory: Arc<dyn NodeHandleFactory>) -> Self {
        let listener = Arc::clone(&config.listener);
        Self {
            nodes: DashMap::new(),
            active: SyncRwLock::new(Arc::new(Vec::new())),
            downed: SyncRwLock::new(Arc::new(Vec::new())),
            config,
            handle_factory,
            listener,
            scheduler: AsyncMutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Current active snapshot: a cheap `Arc` clone, safe to iterate without
    /// holding any lock.
    pub fn snapshot_active(&self) -> Arc<Vec<NodeId>> {
        Arc::clone(&self.active.read())
    }

    /// Current downed snapshot, same representation as `snapshot_active`.
    pub fn snapshot_downed(&self) -> Arc<Vec<NodeId>> {
        Arc::clone(&self.downed.read())
    }

    /// Look up a handle by id, for the election path. Returns `None` if the
    /// node was removed between the policy call and this lookup.
    pub fn handle(&self, node_id: &NodeId) -> Option<Arc<dyn NodeHandle>> {
        self.nodes.get(node_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn known_node_count(&self) -> usize {
        self.nodes.len()
    }

    fn is_active(&self, node_id: &NodeId) -> bool {
        self.active.read().contains(node_id)
    }

    fn is_downed(&self, node_id: &NodeId) -> bool {
        self.downed.read().contains(node_id)
    }

    /// Registers a seed set exactly once each, then discovers outward from
    /// them.
    pub async fn register(&self, seeds: impl IntoIterator<Item = NodeId>) {
        let worklist = AsyncMutex::new(VecDeque::new());
        {
            let mut wl = worklist.lock().await;
            for seed in seeds {
                if let Entry::Vacant(e) = self.nodes.entry(seed.clone()) {
                    e.insert(self.handle_factory.create(seed.clone()));
                    wl.push_back(seed);
                }
            }
        }
        self.drain_worklist(&worklist).await;
    }

    /// Runs one discovery pass: active probes, then downed probes, draining
    /// newly discovered peers within each phase before moving on.
    pub async fn tick(&self) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }

        let worklist = AsyncMutex::new(VecDeque::new());

        let active_snapshot = self.snapshot_active();
        futures::future::join_all(
            active_snapshot.iter().map(|n| self.discover(n, &worklist)),
        )
        .await;
        self.drain_worklist(&worklist).await;

        let downed_snapshot = self.snapshot_downed();
        futures::future::join_all(
            downed_snapshot.iter().map(|n| self.discover(n, &worklist)),
        )
        .await;
        self.drain_worklist(&worklist).await;
    }

    async fn drain_worklist(&self, worklist: &AsyncMutex<VecDeque<NodeId>>) {
        loop {
            let next = {
                let mut wl = worklist.lock().await;
                wl.pop_front()
            };
            match next {
                Some(id) => {
                    let _ = self.discover(&id, worklist).await;
                }
                None => break,
            }
        }
    }

    /// The classification function: refresh a node's status, then reconcile
    /// membership based on what it reports.
    async fn discover(&self, node_id: &NodeId, worklist: &AsyncMutex<VecDeque<NodeId>>) -> Result<()> {
        let handle = match self.handle(node_id) {
            Some(h) => h,
            None => return Ok(()), // removed concurrently; nothing to do
        };

        let status = match handle.refresh_status().await {
            Ok(status) => status,
            Err(e) => {
                self.down(node_id, &format!("probe failed: {e}")).await;
                return Err(e);
            }
        };

        if !status.is_primary {
            self.down(node_id, "non Primary").await;
            return Ok(());
        }

        if !status.is_synced && (self.config.ignore_donor || !status.is_donor) {
            self.down(node_id, &format!("state not ready: {}", status.state)).await;
            return Ok(());
        }

        // Step 4: auto-register newly observed peers (worklist, not recursion).
        let mut newly_seen = Vec::new();
        for peer in &status.cluster_nodes {
            if let Entry::Vacant(e) = self.nodes.entry(peer.clone()) {
                e.insert(self.handle_factory.create(peer.clone()));
                newly_seen.push(peer.clone());
            }
        }
        if !newly_seen.is_empty() {
            worklist.lock().await.extend(newly_seen);
        }

        // Step 5: vanished member.
        if !status.cluster_nodes.contains(node_id) {
            self.remove(node_id).await;
            return Ok(());
        }

        // Step 6: promote if eligible.
        let donor_held_back = status.is_donor && self.config.ignore_donor;
        if !self.is_active(node_id) && !donor_held_back {
            self.activate(node_id).await;
        }

        Ok(())
    }

    /// Idempotent: a no-op if `node_id` is already active.
    async fn activate(&self, node_id: &NodeId) {
        if self.is_active(node_id) {
            return;
        }
        if let Some(handle) = self.handle(node_id) {
            handle.on_activate().await;
        }
        self.move_to_active(node_id);
        self.listener.on_activating_node(node_id);
    }

    /// Idempotent: a no-op if `node_id` is already downed.
    async fn down(&self, node_id: &NodeId, cause: &str) {
        if self.is_downed(node_id) {
            return;
        }
        if let Some(handle) = self.handle(node_id) {
            handle.on_down().await;
        }
        self.move_to_downed(node_id);
        self.listener.on_marking_node_as_down(node_id, cause);
    }

    /// Removes `node_id` from all three collections in one logical step and
    /// shuts its handle down.
    async fn remove(&self, node_id: &NodeId) {
        if let Some((_, handle)) = self.nodes.remove(node_id) {
            handle.shutdown().await;
        }
        self.remove_from_lists(node_id);
        self.listener.on_removing_node(node_id);
    }

    fn move_to_active(&self, node_id: &NodeId) {
        {
            let mut downed = self.downed.write();
            if downed.contains(node_id) {
                let mut updated = (**downed).clone();
                updated.retain(|id| id != node_id);
                *downed = Arc::new(updated);
            }
        }
        let mut active = self.active.write();
        if !active.contains(node_id) {
            let mut updated = (**active).clone();
            updated.push(node_id.clone());
            *active = Arc::new(updated);
        }
    }

    fn move_to_downed(&self, node_id: &NodeId) {
        {
            let mut active = self.active.write();
            if active.contains(node_id) {
                let mut updated = (**active).clone();
                updated.retain(|id| id != node_id);
                *active = Arc::new(updated);
            }
        }
        let mut downed = self.downed.write();
        if !downed.contains(node_id) {
            let mut updated = (**downed).clone();
            updated.push(node_id.clone());
            *downed = Arc::new(updated);
        }
    }

    fn remove_from_lists(&self, node_id: &NodeId) {
        {
            let mut active = self.active.write();
            if active.contains(node_id) {
                let mut updated = (**active).clone();
                updated.retain(|id| id != node_id);
                *active = Arc::new(updated);
            }
        }
        let mut downed = self.downed.write();
        if downed.contains(node_id) {
            let mut updated = (**downed).clone();
            updated.retain(|id| id != node_id);
            *downed = Arc::new(updated);
        }
    }

    /// Starts the background discovery task at `config.discover_period`.
    /// Non-overlapping: an overrunning tick delays the next one rather than
    /// bursting. A no-op if `test_mode` is set or the scheduler already runs.
    pub async fn start_scheduler(self: &Arc<Self>) {
        if self.config.test_mode {
            return;
        }
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_some() {
            return;
        }

        let manager = Arc::clone(self);
        let period = self.config.discover_period;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if manager.shut_down.load(Ordering::SeqCst) {
                    break;
                }
                manager.tick().await;
            }
        });
        *scheduler = Some(handle);
    }

    /// Stops future ticks; an in-flight tick is allowed to finish.
    pub async fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        if let Some(handle) = self.scheduler.lock().await.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::listener::test_support::RecordingListener;
    use crate::node::{NodeHandleFactory, PooledNodeHandle};
    use crate::pool::{Connection, ConnectionFactory, PoolConfig};
    use crate::probe::{NodeStatusProbe, ScriptedProbe};
    use crate::status::ClusterStatus;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct FakeConnection;

    #[async_trait]
    impl Connection for FakeConnection {
        async fn is_healthy(&self) -> bool {
            true
        }
        async fn close(&mut self) {}
        fn connection_id(&self) -> u64 {
            1
        }
        fn node_id(&self) -> &NodeId {
            unreachable!()
        }
    }

    struct FakeFactory;

    #[async_trait]
    impl ConnectionFactory for FakeFactory {
        async fn connect(&self, _node_id: &NodeId) -> Result<Box<dyn Connection>> {
            Ok(Box::new(FakeConnection))
        }
    }

    fn node(name: &str) -> NodeId {
        NodeId::new(name)
    }

    fn ids(names: &[&str]) -> HashSet<NodeId> {
        names.iter().map(|n| node(n)).collect()
    }

    struct TestHandleFactory {
        probe: Arc<dyn NodeStatusProbe>,
    }

    impl NodeHandleFactory for TestHandleFactory {
        fn create(&self, node_id: NodeId) -> Arc<dyn NodeHandle> {
            Arc::new(PooledNodeHandle::new(
                node_id,
                PoolConfig::default(),
                PooledNodeHandle::default_internal_pool_config(),
                Arc::new(FakeFactory),
                Arc::clone(&self.probe),
            ))
        }
    }

    fn manager_with_probe(
        probe: Arc<dyn NodeStatusProbe>,
    ) -> (Arc<MembershipManager>, Arc<RecordingListener>) {
        let listener = Arc::new(RecordingListener::default());
        let mut config = RouterConfig::default();
        config.listener = Arc::clone(&listener) as Arc<dyn ClusterListener>;
        config.test_mode = true;
        let manager = Arc::new(MembershipManager::new(
            Arc::new(config),
            Arc::new(TestHandleFactory { probe }),
        ));
        (manager, listener)
    }

    #[tokio::test]
    async fn cold_start_single_seed_discovers_full_cluster() {
        let cluster = ids(&["a", "b", "c"]);
        let probe = Arc::new(ScriptedProbe::new(move |_n: &NodeId| {
            Ok(ClusterStatus::healthy(cluster.clone()))
        }));
        let (manager, listener) = manager_with_probe(probe);

        manager.register([node("a")]).await;
        manager.tick().await;

        let active = manager.snapshot_active();
        let mut names: Vec<_> = active.iter().map(|n| n.as_str().to_string()).collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(manager.snapshot_downed().is_empty());
        assert_eq!(listener.activated.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn node_leaving_is_marked_down() {
        let healthy = ids(&["a", "b", "c"]);
        let fail_b = Arc::new(AtomicBool::new(false));
        let fail_b_probe = Arc::clone(&fail_b);
        let probe = Arc::new(ScriptedProbe::new(move |n: &NodeId| {
            if n.as_str() == "b" && fail_b_probe.load(Ordering::SeqCst) {
                return Err(crate::error::RouterError::Probe {
                    node: n.clone(),
                    source: "connection refused".into(),
                });
            }
            Ok(ClusterStatus::healthy(healthy.clone()))
        }));
        let (manager, listener) = manager_with_probe(probe);

        manager.register([node("a")]).await;
        manager.tick().await;
        assert_eq!(manager.snapshot_active().len(), 3);

        fail_b.store(true, Ordering::SeqCst);
        manager.tick().await;

        let active: Vec<_> = manager.snapshot_active().iter().map(|n| n.as_str().to_string()).collect();
        let downed: Vec<_> = manager.snapshot_downed().iter().map(|n| n.as_str().to_string()).collect();
        assert_eq!(active, vec!["a", "c"]);
        assert_eq!(downed, vec!["b"]);
        assert_eq!(listener.downed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn donor_ignored_stays_downed_without_promotion() {
        let listener = Arc::new(RecordingListener::default());
        let mut config = RouterConfig::default();
        config.ignore_donor = true;
        config.test_mode = true;
        config.listener = Arc::clone(&listener) as Arc<dyn ClusterListener>;

        let probe = Arc::new(ScriptedProbe::new(move |_n: &NodeId| {
            let mut status = ClusterStatus::healthy(ids(&["a"]));
            status.is_donor = true;
            status.is_synced = false;
            Ok(status)
        }));
        let manager = Arc::new(MembershipManager::new(
            Arc::new(config),
            Arc::new(TestHandleFactory { probe }),
        ));

        manager.register([node("a")]).await;
        manager.tick().await;

        assert!(manager.snapshot_active().is_empty());
        assert_eq!(manager.snapshot_downed().len(), 1);
        assert!(listener.activated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn not_ready_node_is_marked_down_without_promotion() {
        let probe = Arc::new(ScriptedProbe::new(move |_n: &NodeId| {
            Ok(ClusterStatus::not_ready(ids(&["a"])))
        }));
        let (manager, listener) = manager_with_probe(probe);

        manager.register([node("a")]).await;
        manager.tick().await;

        assert!(manager.snapshot_active().is_empty());
        assert_eq!(manager.snapshot_downed().len(), 1);
        assert!(listener.activated.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn vanished_member_is_removed() {
        let members = Arc::new(std::sync::Mutex::new(ids(&["a", "b", "c"])));
        let members_for_probe = Arc::clone(&members);
        let probe = Arc::new(ScriptedProbe::new(move |_n: &NodeId| {
            Ok(ClusterStatus::healthy(members_for_probe.lock().unwrap().clone()))
        }));
        let (manager, _listener) = manager_with_probe(probe);

        manager.register([node("a")]).await;
        manager.tick().await;
        assert_eq!(manager.snapshot_active().len(), 3);

        // Peers now agree b is gone; b's own probe will say the same.
        members.lock().unwrap().remove(&node("b"));
        manager.tick().await;

        let active: Vec<_> = manager
            .snapshot_active()
            .iter()
            .map(|n| n.as_str().to_string())
            .collect();
        assert_eq!(active, vec!["a", "c"]);
        assert_eq!(manager.known_node_count(), 2);
    }

    #[tokio::test]
    async fn recovery_reactivates_a_downed_node() {
        let cluster = ids(&["a", "b"]);
        let b_ready = Arc::new(AtomicBool::new(false));
        let b_ready_probe = Arc::clone(&b_ready);
        let cluster_for_probe = cluster.clone();
        let probe = Arc::new(ScriptedProbe::new(move |n: &NodeId| {
            if n.as_str() == "b" && !b_ready_probe.load(Ordering::SeqCst) {
                return Err(crate::error::RouterError::Probe {
                    node: n.clone(),
                    source: "unreachable".into(),
                });
            }
            Ok(ClusterStatus::healthy(cluster_for_probe.clone()))
        }));
        let (manager, listener) = manager_with_probe(probe);

        manager.register([node("a"), node("b")]).await;
        assert_eq!(manager.snapshot_downed().len(), 1);

        b_ready.store(true, Ordering::SeqCst);
        manager.tick().await;

        assert!(manager.snapshot_downed().is_empty());
        let active: Vec<_> = manager.snapshot_active().iter().map(|n| n.as_str().to_string()).collect();
        assert!(active.contains(&"b".to_string()));
        assert!(listener.activated.lock().unwrap().contains(&node("b")));
    }

    #[tokio::test]
    async fn shutdown_stops_the_scheduler_without_panicking() {
        let cluster = ids(&["a"]);
        let probe = Arc::new(ScriptedProbe::new(move |_n: &NodeId| {
            Ok(ClusterStatus::healthy(cluster.clone()))
        }));
        let (manager, _listener) = manager_with_probe(probe);
        manager.register([node("a")]).await;
        manager.shutdown().await;
        // Second shutdown must also be safe (idempotent best-effort).
        manager.shutdown().await;
    }
}
