//! Operator-facing configuration surface.

use crate::error::{Result, RouterError};
use crate::listener::{ClusterListener, LoggingListener};
use crate::node_id::NodeId;
use crate::policy::{ElectionPolicy, RoundRobinPolicy};
use std::sync::Arc;
use std::time::Duration;

/// Default session attributes and wire-format knobs forwarded to node pools.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SessionDefaults {
    pub autocommit: bool,
    pub read_only: bool,
    pub isolation_level: String,
    pub consistency_level: String,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            autocommit: true,
            read_only: false,
            isolation_level: "REPEATABLE READ".to_string(),
            consistency_level: "EVENTUAL".to_string(),
        }
    }
}

/// Top-level router configuration.
pub struct RouterConfig {
    pub seeds: Vec<NodeId>,
    pub database: String,
    pub user: String,
    pub password: String,
    pub url_prefix: String,
    pub url_separator: String,
    pub max_connections_per_host: usize,
    pub min_connections_idle_per_host: usize,
    pub connect_timeout: Duration,
    pub connection_timeout: Duration,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
    pub discover_period: Duration,
    pub ignore_donor: bool,
    pub retries_to_get_connection: usize,
    pub session_defaults: SessionDefaults,
    pub listener: Arc<dyn ClusterListener>,
    pub node_selection_policy: Arc<dyn ElectionPolicy>,
    pub test_mode: bool,
}

impl std::fmt::Debug for RouterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterConfig")
            .field("seeds", &self.seeds)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("url_prefix", &self.url_prefix)
            .field("url_separator", &self.url_separator)
            .field("max_connections_per_host", &self.max_connections_per_host)
            .field(
                "min_connections_idle_per_host",
                &self.min_connections_idle_per_host,
            )
            .field("connect_timeout", &self.connect_timeout)
            .field("connection_timeout", &self.connection_timeout)
            .field("read_timeout", &self.read_timeout)
            .field("idle_timeout", &self.idle_timeout)
            .field("discover_period", &self.discover_period)
            .field("ignore_donor", &self.ignore_donor)
            .field("retries_to_get_connection", &self.retries_to_get_connection)
            .field("session_defaults", &self.session_defaults)
            .field("test_mode", &self.test_mode)
            .finish_non_exhaustive()
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            seeds: Vec::new(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            url_prefix: "jdbc:mysql://".to_string(),
            url_separator: ",".to_string(),
            max_connections_per_host: 10,
            min_connections_idle_per_host: 1,
            connect_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(300),
            discover_period: Duration::from_secs(5),
            ignore_donor: false,
            retries_to_get_connection: 3,
            session_defaults: SessionDefaults::default(),
            listener: Arc::new(LoggingListener),
            node_selection_policy: Arc::new(RoundRobinPolicy::new()),
            test_mode: false,
        }
    }
}

impl RouterConfig {
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// Reject configurations that could never serve a connection.
    pub fn validate(&self) -> Result<()> {
        if self.seeds.is_empty() {
            return Err(RouterError::Configuration(
                "at least one seed is required".to_string(),
            ));
        }
        if self.retries_to_get_connection == 0 {
            return Err(RouterError::Configuration(
                "retries_to_get_connection must be greater than zero".to_string(),
            ));
        }
        if self.max_connections_per_host == 0 {
            return Err(RouterError::Configuration(
                "max_connections_per_host must be greater than zero".to_string(),
            ));
        }
        if self.min_connections_idle_per_host > self.max_connections_per_host {
            return Err(RouterError::Configuration(
                "min_connections_idle_per_host cannot exceed max_connections_per_host"
                    .to_string(),
            ));
        }
        if self.discover_period.is_zero() {
            return Err(RouterError::Configuration(
                "discover_period must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`RouterConfig`].
#[derive(Default)]
pub struct RouterConfigBuilder {
    config: RouterConfig,
}

macro_rules! setter {
    ($name:ident, $ty:ty) => {
        pub fn $name(mut self, value: $ty) -> Self {
            self.config.$name = value;
            self
        }
    };
}

impl RouterConfigBuilder {
    pub fn seeds(mut self, seeds: impl IntoIterator<Item = impl Into<NodeId>>) -> Self {
        self.config.seeds = seeds.into_iter().map(Into::into).collect();
        self
    }

    setter!(database, String);
    setter!(user, String);
    setter!(password, String);
    setter!(url_prefix, String);
    setter!(url_separator, String);
    setter!(max_connections_per_host, usize);
    setter!(min_connections_idle_per_host, usize);
    setter!(connect_timeout, Duration);
    setter!(connection_timeout, Duration);
    setter!(read_timeout, Duration);
    setter!(idle_timeout, Duration);
    setter!(discover_period, Duration);
    setter!(ignore_donor, bool);
    setter!(retries_to_get_connection, usize);
    setter!(session_defaults, SessionDefaults);
    setter!(test_mode, bool);

    pub fn listener(mut self, listener: Arc<dyn ClusterListener>) -> Self {
        self.config.listener = listener;
        self
    }

    pub fn node_selection_policy(mut self, policy: Arc<dyn ElectionPolicy>) -> Self {
        self.config.node_selection_policy = policy;
        self
    }

    pub fn build(self) -> Result<RouterConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
