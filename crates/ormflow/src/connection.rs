//! Connections: metadata built once, a driver, and an entity manager.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ormflow_core::metadata::{MetadataBuilder, NamingStrategy, NamingStrategyRegistry};
use ormflow_core::{
    ConfigurationError, Driver, EntityDescriptor, EntityManager, EntitySchema, MetadataRegistry,
    QueryBuilder, Reporter, TracingReporter,
};
use ormflow_sqlite::SqliteDriver;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::options::{ConnectionOptions, DriverKind};
use crate::repository::{Repository, TreeRepository};

/// Collects entities and strategies, then opens a [`Connection`].
pub struct ConnectionBuilder {
    options: ConnectionOptions,
    naming: NamingStrategyRegistry,
    descriptors: Vec<EntityDescriptor>,
    reporter: Arc<dyn Reporter>,
}

impl ConnectionBuilder {
    fn new(options: ConnectionOptions) -> Self {
        Self {
            options,
            naming: NamingStrategyRegistry::new(),
            descriptors: Vec::new(),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Register an entity.
    pub fn with_entity(mut self, descriptor: EntityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Register several entities.
    pub fn with_entities(mut self, descriptors: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        self.descriptors.extend(descriptors);
        self
    }

    /// Register an entity described by a JSON schema file.
    pub fn with_schema_json(self, json: &str) -> Result<Self> {
        let schema = EntitySchema::from_json(json)?;
        Ok(self.with_entity(schema.into_descriptor()))
    }

    /// Make a naming strategy available under its own name.
    pub fn with_naming_strategy(mut self, strategy: Arc<dyn NamingStrategy>) -> Self {
        self.naming.register(strategy);
        self
    }

    /// Send listener reports somewhere other than `tracing`.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Build the metadata and open the driver named in the options.
    pub async fn connect(self) -> Result<Connection> {
        let driver = create_driver(&self.options)?;
        self.connect_with_driver(driver).await
    }

    /// Build the metadata and open the given driver.
    pub async fn connect_with_driver(self, driver: Arc<dyn Driver>) -> Result<Connection> {
        let naming = self
            .naming
            .resolve(self.options.naming_strategy.as_deref(), &self.options.name)?;
        let registry = MetadataBuilder::new(naming).build(&self.descriptors)?;
        debug!(
            connection = %self.options.name,
            entities = registry.len(),
            "metadata built"
        );

        driver.connect().await?;
        info!(
            connection = %self.options.name,
            driver = driver.name(),
            "connection established"
        );

        let manager = EntityManager::with_reporter(driver, Arc::new(registry), self.reporter);
        Ok(Connection {
            options: self.options,
            manager,
            closed: AtomicBool::new(false),
        })
    }
}

fn create_driver(options: &ConnectionOptions) -> Result<Arc<dyn Driver>> {
    match options.driver.kind {
        DriverKind::Sqlite => Ok(Arc::new(
            SqliteDriver::open(options.driver.database_path()).with_logging(options.logging),
        )),
        kind => Err(ConfigurationError::UnsupportedDriver(kind.to_string()).into()),
    }
}

/// An open database connection with its entity metadata.
pub struct Connection {
    options: ConnectionOptions,
    manager: EntityManager,
    closed: AtomicBool,
}

impl Connection {
    /// Start configuring a connection.
    pub fn builder(options: ConnectionOptions) -> ConnectionBuilder {
        ConnectionBuilder::new(options)
    }

    /// Connection name.
    pub fn name(&self) -> &str {
        &self.options.name
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Check if the connection is open.
    pub fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.manager.driver().is_connected()
    }

    /// Entity metadata of this connection.
    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        self.manager.registry()
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        self.manager.driver()
    }

    /// Entity manager bound to this connection.
    pub fn manager(&self) -> Result<&EntityManager> {
        self.ensure_open()?;
        Ok(&self.manager)
    }

    /// Repository of one entity.
    pub fn repository(&self, entity: &str) -> Result<Repository> {
        Repository::new(self.manager()?.clone(), entity)
    }

    /// Repository of a closure-table tree entity.
    pub fn tree_repository(&self, entity: &str) -> Result<TreeRepository> {
        TreeRepository::new(self.manager()?.clone(), entity)
    }

    /// Query builder rooted at `entity` under `alias`.
    pub fn query_builder(&self, entity: &str, alias: &str) -> Result<QueryBuilder> {
        Ok(self.manager()?.query_builder(entity, alias)?)
    }

    /// Run `work` as one transaction. Persist and remove calls made through
    /// the given manager join it.
    pub async fn transaction<F, Fut, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(EntityManager) -> Fut,
        Fut: Future<Output = ormflow_core::Result<T>>,
    {
        Ok(self.manager()?.transaction(work).await?)
    }

    /// Close the driver. Later calls fail with [`Error::Closed`].
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.manager.driver().disconnect().await?;
        info!(connection = %self.options.name, "connection closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Closed(self.options.name.clone()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.options.name)
            .field("manager", &self.manager)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
