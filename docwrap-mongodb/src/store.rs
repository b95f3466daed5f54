//! MongoDB driver backend: dialer, pooled connection and collection adapter.

use std::time::Duration;
use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, doc};
use mongodb::{
    Client, Collection as MongoCollection, Database, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::ClientOptions,
};
use tracing::{debug, info, instrument};

use docwrap_core::{
    backend::{StoreCollection, StoreConnection, StoreDialer, StoreSession},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Change, ChangeInfo, FindQuery, is_operator_document, sort_document},
};

use crate::query::{find_and_modify_command, index_keys, parse_find_and_modify_reply};

/// Server error code for a missing namespace.
const NAMESPACE_NOT_FOUND: i32 = 26;

fn backend_error(error: MongoError) -> DocumentStoreError {
    DocumentStoreError::Backend(error.to_string())
}

fn is_namespace_not_found(error: &MongoError) -> bool {
    matches!(error.kind.as_ref(), ErrorKind::Command(command) if command.code == NAMESPACE_NOT_FOUND)
}

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// Write failures carried by `error` as (batch index, server code) pairs.
fn write_failures(error: &MongoError) -> Vec<(Option<usize>, i32)> {
    match error.kind.as_ref() {
        ErrorKind::InsertMany(failure) => failure
            .write_errors
            .iter()
            .flatten()
            .map(|write_error| (Some(write_error.index), write_error.code))
            .collect(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => vec![(None, write_error.code)],
        _ => vec![],
    }
}

/// Maps the first duplicate key failure to the `_id` of the offending document.
fn duplicate_identity(ids: &[Bson], failures: &[(Option<usize>, i32)], collection: &str) -> Option<DocumentStoreError> {
    failures
        .iter()
        .find(|(_, code)| *code == DUPLICATE_KEY)
        .map(|(index, _)| {
            let id = index
                .and_then(|index| ids.get(index))
                .or_else(|| ids.first().filter(|_| ids.len() == 1))
                .map(Bson::to_string)
                .unwrap_or_default();

            DocumentStoreError::DocumentAlreadyExists(id, collection.to_string())
        })
}


/// Connection pool configuration applied to every dialed client.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool.
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool.
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed.
    pub max_idle_time: Option<Duration>,
    /// Connection timeout.
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout.
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs.
    pub app_name: Option<String>,
    /// Ping the server while dialing so unreachable endpoints fail fast.
    pub verify_on_dial: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: None,
            max_pool_size: Some(10),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(10)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("docwrap".to_string()),
            verify_on_dial: true,
        }
    }
}

impl PoolConfig {
    fn apply(&self, options: &mut ClientOptions) {
        if let Some(min) = self.min_pool_size {
            options.min_pool_size = Some(min);
        }
        if let Some(max) = self.max_pool_size {
            options.max_pool_size = Some(max);
        }
        if let Some(idle) = self.max_idle_time {
            options.max_idle_time = Some(idle);
        }
        if let Some(connect) = self.connect_timeout {
            options.connect_timeout = Some(connect);
        }
        if let Some(selection) = self.server_selection_timeout {
            options.server_selection_timeout = Some(selection);
        }
        if let Some(app) = &self.app_name {
            options.app_name = Some(app.clone());
        }
    }
}


/// Dials MongoDB endpoints with a shared [`PoolConfig`].
#[derive(Debug, Clone, Default)]
pub struct MongoDbDialer {
    config: PoolConfig,
}

impl MongoDbDialer {
    /// Creates a dialer applying `config` to every client it builds.
    pub fn new(config: PoolConfig) -> Self {
        Self { config }
    }

    /// Starts a builder seeded with the default pool configuration.
    pub fn builder() -> MongoDbDialerBuilder {
        MongoDbDialerBuilder::default()
    }

    /// Returns the pool configuration applied on dial.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

#[async_trait]
impl StoreDialer for MongoDbDialer {
    type Connection = MongoDbConnection;

    #[instrument(skip(self, endpoint), fields(max_pool_size = self.config.max_pool_size))]
    async fn dial(&self, endpoint: &str) -> DocumentStoreResult<MongoDbConnection> {
        let mut options = ClientOptions::parse(endpoint)
            .await
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;
        self.config.apply(&mut options);

        let client = Client::with_options(options)
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?;

        if self.config.verify_on_dial {
            client
                .database("admin")
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|e| DocumentStoreError::Initialization(format!("failed to verify connection: {}", e)))?;
        }

        info!("mongodb client initialized");
        Ok(MongoDbConnection { client })
    }
}

/// Builder for [`MongoDbDialer`].
#[derive(Debug, Default)]
pub struct MongoDbDialerBuilder {
    config: PoolConfig,
}

impl MongoDbDialerBuilder {
    /// Replaces the whole pool configuration.
    pub fn pool(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the minimum pool size.
    pub fn min_pool_size(mut self, size: u32) -> Self {
        self.config.min_pool_size = Some(size);
        self
    }

    /// Sets the maximum pool size.
    pub fn max_pool_size(mut self, size: u32) -> Self {
        self.config.max_pool_size = Some(size);
        self
    }

    /// Sets how long an idle pooled connection is kept.
    pub fn max_idle_time(mut self, idle: Duration) -> Self {
        self.config.max_idle_time = Some(idle);
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Sets the server selection timeout.
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.config.server_selection_timeout = Some(timeout);
        self
    }

    /// Sets the application name reported to the server.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.config.app_name = Some(name.into());
        self
    }

    /// Enables or disables the ping issued while dialing.
    pub fn verify_on_dial(mut self, verify: bool) -> Self {
        self.config.verify_on_dial = verify;
        self
    }

    /// Builds the dialer.
    pub fn build(self) -> MongoDbDialer {
        MongoDbDialer::new(self.config)
    }
}


/// A pooled MongoDB client shared by every operation against one endpoint.
#[derive(Debug, Clone)]
pub struct MongoDbConnection {
    client: Client,
}

impl MongoDbConnection {
    /// Returns the underlying driver client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Closes every pooled connection.
    pub async fn shutdown(self) {
        self.client.shutdown().await;
    }
}

impl StoreConnection for MongoDbConnection {
    type Session = MongoDbSession;

    fn clone_session(&self) -> DocumentStoreResult<MongoDbSession> {
        Ok(MongoDbSession { client: self.client.clone() })
    }
}

/// A session clone; the driver checks sockets out of the pool per operation.
#[derive(Debug)]
pub struct MongoDbSession {
    client: Client,
}

#[async_trait]
impl StoreSession for MongoDbSession {
    type Collection = MongoDbCollection;

    fn collection(&self, database: &str, name: &str) -> MongoDbCollection {
        let database = self.client.database(database);

        MongoDbCollection {
            inner: database.collection(name),
            database,
            name: name.to_string(),
        }
    }

    async fn drop_database(&self, database: &str) -> DocumentStoreResult<()> {
        self.client
            .database(database)
            .drop()
            .await
            .map_err(backend_error)
    }

    fn release(&mut self) {
        debug!("mongodb session released");
    }
}


/// A MongoDB collection of untyped documents.
#[derive(Debug, Clone)]
pub struct MongoDbCollection {
    inner: MongoCollection<Document>,
    database: Database,
    name: String,
}

impl MongoDbCollection {
    fn receipt(result: mongodb::results::UpdateResult) -> ChangeInfo {
        ChangeInfo {
            matched: result.matched_count,
            updated: result.modified_count,
            removed: 0,
            upserted_id: result.upserted_id,
        }
    }

    async fn update_with(&self, selector: Document, changer: Document, upsert: bool) -> DocumentStoreResult<ChangeInfo> {
        let result = if is_operator_document(&changer) {
            self.inner
                .update_one(selector, changer)
                .upsert(upsert)
                .await
        } else {
            self.inner
                .replace_one(selector, changer)
                .upsert(upsert)
                .await
        };

        result
            .map(Self::receipt)
            .map_err(backend_error)
    }
}

#[async_trait]
impl StoreCollection for MongoDbCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, documents: Vec<Document>) -> DocumentStoreResult<()> {
        let ids = documents
            .iter()
            .map(|document| document.get("_id").cloned().unwrap_or(Bson::Null))
            .collect::<Vec<_>>();

        self.inner
            .insert_many(documents)
            .ordered(false)
            .await
            .map_err(|error| {
                duplicate_identity(&ids, &write_failures(&error), &self.name)
                    .unwrap_or_else(|| backend_error(error))
            })?;

        Ok(())
    }

    async fn find(&self, query: FindQuery) -> DocumentStoreResult<Vec<Document>> {
        let mut action = self.inner.find(query.filter);

        if let Some(projection) = query.projection {
            action = action.projection(projection);
        }
        if !query.sort.is_empty() {
            action = action.sort(sort_document(&query.sort));
        }
        if let Some(skip) = query.skip {
            action = action.skip(skip);
        }
        if let Some(limit) = query.limit {
            action = action.limit(limit as i64);
        }

        action
            .await
            .map_err(backend_error)?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(backend_error)
    }

    async fn count(&self, selector: Document) -> DocumentStoreResult<u64> {
        self.inner
            .count_documents(selector)
            .await
            .map_err(backend_error)
    }

    async fn update(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo> {
        self.update_with(selector, changer, false).await
    }

    async fn update_all(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo> {
        self.inner
            .update_many(selector, changer)
            .await
            .map(Self::receipt)
            .map_err(backend_error)
    }

    async fn upsert(&self, selector: Document, changer: Document) -> DocumentStoreResult<ChangeInfo> {
        self.update_with(selector, changer, true).await
    }

    async fn remove(&self, selector: Document) -> DocumentStoreResult<ChangeInfo> {
        let result = self.inner
            .delete_one(selector)
            .await
            .map_err(backend_error)?;

        Ok(ChangeInfo { matched: result.deleted_count, removed: result.deleted_count, ..Default::default() })
    }

    async fn remove_all(&self, selector: Document) -> DocumentStoreResult<ChangeInfo> {
        let result = self.inner
            .delete_many(selector)
            .await
            .map_err(backend_error)?;

        Ok(ChangeInfo { matched: result.deleted_count, removed: result.deleted_count, ..Default::default() })
    }

    async fn find_and_modify(
        &self,
        query: FindQuery,
        change: Change,
    ) -> DocumentStoreResult<(Option<Document>, ChangeInfo)> {
        let command = find_and_modify_command(&self.name, &query, &change)?;

        let reply = self.database
            .run_command(command)
            .await
            .map_err(backend_error)?;

        Ok(parse_find_and_modify_reply(&reply, &change))
    }

    async fn drop_collection(&self) -> DocumentStoreResult<()> {
        match self.inner.drop().await {
            Ok(()) => Ok(()),
            Err(error) if is_namespace_not_found(&error) => Ok(()),
            Err(error) => Err(backend_error(error)),
        }
    }

    async fn ensure_index(&self, keys: &[String]) -> DocumentStoreResult<()> {
        self.inner
            .create_index(IndexModel::builder().keys(index_keys(keys)?).build())
            .await
            .map_err(backend_error)?;

        Ok(())
    }
}
