//! Per-resource orchestration of remote calls
//!
//! An [`Endpoint`] binds a URI to an [`EntitySchema`]. It lists, retrieves,
//! creates, updates and deletes entities of that schema, remembers the last
//! payload retrieved for every identity, and wraps queued mutations in
//! [`Operation`]s.

mod completion;

pub use completion::{Deleted, FieldEquals, Retrieved};

use crate::client::Client;
use crate::error::{Error, Result};
use crate::http::{Method, RequestParams};
use crate::model::{Collection, Entity, EntityLoader, EntitySchema};
use crate::operation::{Completion, Operation};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, info};

/// Query parameter carrying the configured list page size.
pub const PAGE_SIZE_PARAM: &str = "per_page";

type CompletionFactory = Arc<dyn Fn(&Endpoint) -> Box<dyn Completion> + Send + Sync>;

/// Entity or bare identity to delete.
#[derive(Debug, Clone)]
pub enum DeleteTarget {
    /// An entity, returned with its identity cleared once deleted
    Entity(Entity),
    /// An identity
    Id(u64),
}

impl From<Entity> for DeleteTarget {
    fn from(entity: Entity) -> Self {
        DeleteTarget::Entity(entity)
    }
}

impl From<&Entity> for DeleteTarget {
    fn from(entity: &Entity) -> Self {
        DeleteTarget::Entity(entity.clone())
    }
}

impl From<u64> for DeleteTarget {
    fn from(id: u64) -> Self {
        DeleteTarget::Id(id)
    }
}

/// Remote calls for one resource type.
///
/// Clones share the retrieved-payload cache.
///
/// # Example
///
/// ```rust,no_run
/// use remodel::Client;
/// use serde_json::json;
///
/// # async fn example(client: Client) -> remodel::Result<()> {
/// let servers = client.servers();
/// let mut server = servers.retrieve(7).await?;
///
/// let changes = json!({"name": "web-2"});
/// let sent = servers.update(&mut server, changes.as_object().unwrap()).await?;
/// assert!(sent);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
    create_check: Option<CompletionFactory>,
}

struct EndpointInner {
    client: Client,
    uri: String,
    schema: &'static EntitySchema,
    cache: Mutex<HashMap<u64, Value>>,
}

impl Endpoint {
    pub(crate) fn new(client: Client, uri: impl Into<String>, schema: &'static EntitySchema) -> Self {
        Self {
            inner: Arc::new(EndpointInner {
                client,
                uri: uri.into().trim_matches('/').to_string(),
                schema,
                cache: Mutex::new(HashMap::new()),
            }),
            create_check: None,
        }
    }

    /// Replace the creation completion check used by [`create`](Self::create).
    ///
    /// ```rust,no_run
    /// # fn example(client: remodel::Client) {
    /// let widgets = client
    ///     .endpoint("widgets", &remodel::resources::SERVER)
    ///     .with_create_completion(|widgets| {
    ///         Box::new(widgets.until_field_equals("state", "active"))
    ///     });
    /// # }
    /// ```
    pub fn with_create_completion(
        mut self,
        factory: impl Fn(&Endpoint) -> Box<dyn Completion> + Send + Sync + 'static,
    ) -> Self {
        self.create_check = Some(Arc::new(factory));
        self
    }

    /// Entity kind handled by this endpoint.
    pub fn kind(&self) -> &'static str {
        self.inner.schema.kind
    }

    /// Base path of the resource.
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// Schema of the handled entities.
    pub fn schema(&self) -> &'static EntitySchema {
        self.inner.schema
    }

    /// Owning client.
    pub fn client(&self) -> &Client {
        &self.inner.client
    }

    /// A draft bound to this endpoint.
    pub fn new_entity(&self) -> Entity {
        let mut entity = Entity::new(self.inner.schema);
        entity.bind(self.loader());
        entity
    }

    /// An id-only entity that hydrates from this endpoint on first read.
    pub fn stub(&self, id: u64) -> Entity {
        let mut entity = Entity::with_id(self.inner.schema, id);
        entity.bind(self.loader());
        entity
    }

    /// An empty collection of this endpoint's kind.
    pub fn new_collection(&self) -> Collection {
        Collection::new(self.inner.schema)
    }

    /// Last payload retrieved for `id`.
    pub fn cached(&self, id: u64) -> Option<Value> {
        self.cache().get(&id).cloned()
    }

    /// Fail with [`Error::WrongModelForEndpoint`] unless `entity` is of this
    /// endpoint's kind.
    pub fn check_model_type(&self, entity: &Entity) -> Result<()> {
        if entity.schema().same_kind(self.inner.schema) {
            Ok(())
        } else {
            Err(Error::WrongModelForEndpoint {
                expected: self.kind(),
                actual: entity.kind(),
            })
        }
    }

    /// Completion that re-fetches the subject until `field` equals `expected`.
    pub fn until_field_equals(&self, field: &str, expected: impl Into<Value>) -> FieldEquals {
        FieldEquals::new(self.clone(), field, expected.into())
    }

    /// List entities matching `filter`.
    ///
    /// The filter is sent as the query string, with the configured page size
    /// added when absent. Since the remote side may ignore some filters, the
    /// result is filtered again locally on every key naming a declared field.
    pub async fn list(&self, filter: &Map<String, Value>) -> Result<Collection> {
        let mut params = RequestParams::new().query_object(filter);
        if let Some(size) = self.client().page_size()
            && !params.has_query(PAGE_SIZE_PARAM)
        {
            params = params.query(PAGE_SIZE_PARAM, size.to_string());
        }

        let items = match self.send(Method::GET, self.uri(), params).await? {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(Error::MalformedRecord(format!(
                        "expected a list of {} records",
                        self.kind()
                    )));
                }
            },
            _ => {
                return Err(Error::MalformedRecord(format!(
                    "expected a list of {} records",
                    self.kind()
                )));
            }
        };

        let mut collection = self.new_collection();
        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(record) = item else {
                return Err(Error::MalformedList { index });
            };
            let mut entity = self.new_entity();
            entity.sync(&record, true)?;
            collection.add(entity)?;
        }

        let local: Map<String, Value> = filter
            .iter()
            .filter(|(key, value)| {
                self.inner.schema.resolve(key).is_some()
                    && !matches!(value, Value::Null | Value::Array(_))
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let collection = if local.is_empty() {
            collection
        } else {
            collection.filter_fields(&local)
        };

        debug!(kind = self.kind(), count = collection.len(), "Listed entities");
        Ok(collection)
    }

    /// Fetch one entity, replacing its cache entry.
    pub async fn retrieve(&self, id: u64) -> Result<Entity> {
        let record = self.fetch(id).await?;
        let mut entity = self.new_entity();
        entity.sync(&record, true)?;
        Ok(entity)
    }

    /// Re-fetch `entity` by identity and hard-sync it in place.
    pub async fn sync(&self, entity: &mut Entity) -> Result<()> {
        self.check_model_type(entity)?;
        let id = entity.id().ok_or(Error::MissingIdentity(entity.kind()))?;
        let record = self.fetch(id).await?;
        entity.sync(&record, true)?;
        Ok(())
    }

    /// Create an entity, gated by the endpoint's creation check.
    ///
    /// The default check succeeds once the new entity can be retrieved.
    pub async fn create(&self, data: &Map<String, Value>) -> Result<Operation> {
        let completion = match &self.create_check {
            Some(factory) => factory(self),
            None => Box::new(Retrieved::new(self.clone())),
        };
        self.create_with(data, completion).await
    }

    /// Create an entity, gated by `completion`.
    pub async fn create_until(
        &self,
        data: &Map<String, Value>,
        completion: impl Completion + 'static,
    ) -> Result<Operation> {
        self.create_with(data, Box::new(completion)).await
    }

    async fn create_with(
        &self,
        data: &Map<String, Value>,
        completion: Box<dyn Completion>,
    ) -> Result<Operation> {
        let params = RequestParams::new().json(Value::Object(data.clone()));
        let response = self.send(Method::POST, self.uri(), params).await?;

        let mut entity = self.new_entity();
        entity.sync(self.record(&response)?, true)?;
        info!(kind = self.kind(), id = entity.id(), "Created entity");

        let operation = Operation::new(
            entity,
            Some(completion),
            self.client().wait_config().clone(),
        );
        self.settle(operation).await
    }

    /// Apply `data`, then send whatever differs from the last retrieved copy.
    ///
    /// Returns `false` without calling the remote side when nothing changed.
    /// Without a cached copy the whole write form is sent. On success the
    /// response is hard-synced into `entity`.
    pub async fn update(&self, entity: &mut Entity, data: &Map<String, Value>) -> Result<bool> {
        let id = entity.id().ok_or(Error::MissingIdentity(entity.kind()))?;
        self.check_model_type(entity)?;

        let snapshot = entity.clone();
        for (field, value) in data {
            let applied = entity.set(field, value).map(|_| ());
            if let Err(error) = applied {
                *entity = snapshot;
                return Err(error);
            }
        }

        let current = entity.to_collapsed_array()?;
        let diff: Map<String, Value> = match self.cached(id) {
            Some(Value::Object(cached)) => {
                let baseline = entity.to_collapsed_array_of(&cached)?;
                current
                    .into_iter()
                    .filter(|(key, value)| baseline.get(key) != Some(value))
                    .collect()
            }
            _ => current,
        };

        if diff.is_empty() {
            debug!(kind = self.kind(), id, "Nothing to update");
            return Ok(false);
        }

        debug!(
            kind = self.kind(),
            id,
            fields = ?diff.keys().collect::<Vec<_>>(),
            "Updating entity"
        );
        let params = RequestParams::new().json(Value::Object(diff));
        let response = self
            .send(Method::PATCH, &self.item_path(id), params)
            .await?;

        match response {
            Value::Object(record) if record.contains_key(self.inner.schema.id_field) => {
                entity.sync(&record, true)?;
            }
            _ => self.sync(entity).await?,
        }
        Ok(true)
    }

    /// Delete an entity, settling once it can no longer be retrieved.
    ///
    /// The resolved subject has its identity cleared.
    pub async fn delete(&self, target: impl Into<DeleteTarget>) -> Result<Operation> {
        let subject = match target.into() {
            DeleteTarget::Entity(entity) => {
                self.check_model_type(&entity)?;
                entity
            }
            DeleteTarget::Id(id) => self.stub(id),
        };
        let id = subject
            .id()
            .filter(|id| *id > 0)
            .ok_or(Error::MissingIdentity(subject.kind()))?;

        self.send(Method::DELETE, &self.item_path(id), RequestParams::new())
            .await?;
        info!(kind = self.kind(), id, "Deleted entity");

        let operation = Operation::pending(
            subject,
            Deleted::new(self.clone(), id),
            self.client().wait_config().clone(),
        );
        self.settle(operation).await
    }

    /// Trigger a custom action at `<uri>/<id>/<name>`.
    ///
    /// A response carrying the record is hard-synced into the operation's
    /// subject. Without a completion the operation is already resolved.
    pub async fn action(
        &self,
        entity: &Entity,
        name: &str,
        body: Option<&Map<String, Value>>,
        completion: Option<Box<dyn Completion>>,
    ) -> Result<Operation> {
        self.check_model_type(entity)?;
        let id = entity.id().ok_or(Error::MissingIdentity(entity.kind()))?;

        let mut params = RequestParams::new();
        if let Some(body) = body {
            params = params.json(Value::Object(body.clone()));
        }
        let path = format!("{}/{}", self.item_path(id), name.trim_matches('/'));
        let response = self.send(Method::POST, &path, params).await?;

        let mut subject = entity.clone();
        if let Value::Object(record) = &response
            && record.contains_key(self.inner.schema.id_field)
        {
            subject.sync(record, true)?;
        }
        debug!(kind = self.kind(), id, action = name, "Triggered action");

        let operation = Operation::new(subject, completion, self.client().wait_config().clone());
        self.settle(operation).await
    }

    async fn settle(&self, operation: Operation) -> Result<Operation> {
        if operation.wait_config().always {
            Ok(Operation::resolved(operation.wait().await?))
        } else {
            Ok(operation)
        }
    }

    async fn fetch(&self, id: u64) -> Result<Map<String, Value>> {
        let response = self
            .send(Method::GET, &self.item_path(id), RequestParams::new())
            .await?;
        let record = self.record(&response)?.clone();
        self.cache().insert(id, Value::Object(record.clone()));
        Ok(record)
    }

    async fn send(&self, method: Method, path: &str, params: RequestParams) -> Result<Value> {
        self.client()
            .request(method, path, params)
            .await?
            .into_data()
    }

    fn record<'a>(&self, response: &'a Value) -> Result<&'a Map<String, Value>> {
        response.as_object().ok_or_else(|| {
            Error::MalformedRecord(format!("expected a {} record", self.kind()))
        })
    }

    fn item_path(&self, id: u64) -> String {
        format!("{}/{}", self.inner.uri, id)
    }

    fn loader(&self) -> Arc<dyn EntityLoader> {
        Arc::new(EndpointLoader {
            inner: Arc::downgrade(&self.inner),
            kind: self.kind(),
        })
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, HashMap<u64, Value>> {
        self.inner
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl EntityLoader for Endpoint {
    fn kind(&self) -> &'static str {
        self.inner.schema.kind
    }

    async fn load(&self, id: u64) -> Result<Value> {
        self.fetch(id).await.map(Value::Object)
    }
}

/// Loader bound into entities handed out by an endpoint.
///
/// Holds the endpoint weakly so entities never keep it alive.
#[derive(Debug)]
struct EndpointLoader {
    inner: Weak<EndpointInner>,
    kind: &'static str,
}

#[async_trait]
impl EntityLoader for EndpointLoader {
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn load(&self, id: u64) -> Result<Value> {
        let inner = self.inner.upgrade().ok_or_else(|| {
            Error::Other(anyhow::anyhow!("{} endpoint dropped before hydration", self.kind))
        })?;
        let endpoint = Endpoint {
            inner,
            create_check: None,
        };
        endpoint.load(id).await
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("uri", &self.inner.uri)
            .field("kind", &self.kind())
            .field("create_check", &self.create_check.is_some())
            .finish()
    }
}
