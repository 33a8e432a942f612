//! Client facade: the external entry point. Routes `get_connection`
//! calls through the membership manager and an election policy to a node
//! handle.

use crate::config::RouterConfig;
use crate::error::{Result, RouterError};
use crate::membership::MembershipManager;
use crate::node::{ConsistencyLevel, NodeHandleFactory};
use crate::policy::ElectionPolicy;
use crate::pool::Connection;
use std::sync::Arc;

/// The external data-source contract. Construct with [`GaleraRouter::connect`],
/// then call `get_connection` from as many concurrent tasks as needed.
pub struct GaleraRouter {
    config: Arc<RouterConfig>,
    membership: Arc<MembershipManager>,
    log_writer: parking_lot::RwLock<Option<tracing::Dispatch>>,
}

impl GaleraRouter {
    /// Validates `config`, registers the seed list, and — unless
    /// `config.test_mode` is set — starts the background discovery scheduler.
    pub async fn connect(
        config: RouterConfig,
        handle_factory: Arc<dyn NodeHandleFactory>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let membership = Arc::new(MembershipManager::new(
            Arc::clone(&config),
            handle_factory,
        ));

        membership.register(config.seeds.clone()).await;
        membership.start_scheduler().await;

        Ok(Self {
            config,
            membership,
            log_writer: parking_lot::RwLock::new(None),
        })
    }

    /// Returns the `tracing::Dispatch` events are sent to, if one has been
    /// installed via [`Self::set_log_writer`].
    pub fn log_writer(&self) -> Option<tracing::Dispatch> {
        self.log_writer.read().clone()
    }

    /// Scopes subsequent discovery-loop and election logging to the given
    /// `tracing::Dispatch` instead of the global default.
    pub fn set_log_writer(&self, dispatch: tracing::Dispatch) {
        *self.log_writer.write() = Some(dispatch);
    }

    /// `getConnection()`: default consistency, default policy.
    pub async fn get_connection(&self) -> Result<Box<dyn Connection>> {
        self.get_connection_with(
            ConsistencyLevel(self.config.session_defaults.consistency_level.clone()),
            None,
        )
        .await
    }

    /// Chooses a node via `policy_override` (falling back to the configured
    /// default policy) and borrows a connection from it with `consistency`.
    pub async fn get_connection_with(
        &self,
        consistency: ConsistencyLevel,
        policy_override: Option<&dyn ElectionPolicy>,
    ) -> Result<Box<dyn Connection>> {
        let handle = self.select_node(policy_override)?;
        handle.get_connection(consistency).await
    }

    /// Bounded-retry election loop: tries up to `retries_to_get_connection`
    /// times to pick a node that is still known by the time it's looked up.
    fn select_node(
        &self,
        policy_override: Option<&dyn ElectionPolicy>,
    ) -> Result<Arc<dyn crate::node::NodeHandle>> {
        let policy = policy_override.unwrap_or_else(|| self.config.node_selection_policy.as_ref());
        let retries = self.config.retries_to_get_connection;

        for _ in 0..retries {
            let active = self.membership.snapshot_active();
            let chosen = match policy.choose_node(&active) {
                Ok(id) => id,
                Err(_) => continue, // policy error counts as a failed attempt
            };
            if let Some(handle) = self.membership.handle(&chosen) {
                return Ok(handle);
            }
            // chosen id vanished between the policy call and the lookup; retry
        }

        Err(RouterError::NoHostAvailable { attempts: retries })
    }

    /// Stops scheduling; in-flight `get_connection` calls still operate on
    /// whatever snapshot exists.
    pub async fn shutdown(&self) {
        self.membership.shutdown().await;
    }

    /// Diagnostic accessor used by callers that want to report cluster health
    /// without going through the election path.
    pub fn known_node_count(&self) -> usize {
        self.membership.known_node_count()
    }
}
