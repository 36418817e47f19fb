//! The resource lifecycle contract and its JSON adapter.
//!
//! Each resource implements [`Resource`] over a typed `Model`. The service
//! layer only sees [`DynResource`], produced by [`erase_resource`], which
//! handles everything that is the same for every resource:
//!
//! - schema defaults and validation before any remote call
//! - the per-operation deadline and provider cancellation
//! - the `timeouts` override block
//! - planning and replacement detection
//!
//! [`DataSource`] and [`DynDataSource`] do the same for data sources.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{ArmTransport, TypedClient};
use crate::error::ProviderError;
use crate::locks::LockRegistry;
use crate::plan;
use crate::poller::StateChangeConf;
use crate::schema::{Attribute, Diagnostic, DiagnosticSeverity, Schema};
use crate::timeouts::{Operation, Timeouts};
use crate::types::{AttributeChange, PlanResult};
use crate::validation;

const TIMEOUTS_KEY: &str = "timeouts";

/// Everything a lifecycle call needs besides its own model.
#[derive(Debug, Clone)]
pub struct ResourceContext {
    arm: Arc<dyn ArmTransport>,
    subscription_id: String,
    locks: LockRegistry,
    poll_interval: Option<Duration>,
    cancel: CancellationToken,
    deadline: Instant,
}

impl ResourceContext {
    /// Create a context for `subscription_id` with no deadline.
    pub fn new(arm: Arc<dyn ArmTransport>, subscription_id: impl Into<String>) -> Self {
        Self {
            arm,
            subscription_id: subscription_id.into(),
            locks: LockRegistry::new(),
            poll_interval: None,
            cancel: CancellationToken::new(),
            deadline: Instant::now() + Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Share `locks` with other contexts.
    pub fn with_locks(mut self, locks: LockRegistry) -> Self {
        self.locks = locks;
        self
    }

    /// Override the poll interval of every property convergence wait.
    pub fn with_poll_interval(mut self, interval: Option<Duration>) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Abort waits when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// A copy whose deadline is `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Instant::now() + timeout;
        ctx
    }

    /// The management plane.
    pub fn arm(&self) -> &Arc<dyn ArmTransport> {
        &self.arm
    }

    /// The subscription new resources are created in.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Named locks shared across resources.
    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// The provider-wide cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Time left before the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// A typed client for one entity kind.
    pub fn client<M>(&self, api_version: &'static str) -> TypedClient<M>
    where
        M: Serialize + DeserializeOwned,
    {
        TypedClient::new(Arc::clone(&self.arm), api_version)
    }

    /// A poller bounded by this context's deadline and cancellation.
    pub fn state_change(
        &self,
        pending: &[&str],
        target: &[&str],
        default_interval: Duration,
    ) -> StateChangeConf {
        StateChangeConf::new(pending, target)
            .with_min_interval(self.poll_interval.unwrap_or(default_interval))
            .with_timeout(self.remaining())
            .with_cancellation(self.cancel.clone())
    }
}

/// A managed resource over a typed model.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// The resource's state, deserialized from configuration with
    /// `#[serde(default)]` so absent attributes take their zero value.
    type Model: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static;

    /// The resource type name, e.g. `azurerm_postgresql_server`.
    fn type_name(&self) -> &'static str;

    /// Attributes and blocks, excluding `id` and `timeouts`.
    fn schema(&self) -> Schema;

    /// Default deadlines.
    fn timeouts(&self) -> Timeouts;

    /// Check that `id` is an identifier for this resource type.
    fn validate_id(&self, id: &str) -> Result<(), ProviderError>;

    /// Checks that need more than one attribute.
    fn validate_model(&self, model: &Self::Model) -> Vec<Diagnostic> {
        let _ = model;
        Vec::new()
    }

    /// Adjust the planned model. Returns attribute paths whose change
    /// forces replacement beyond those marked `force_new` in the schema.
    fn customize_plan(
        &self,
        prior: Option<&Self::Model>,
        planned: &mut Self::Model,
    ) -> Result<Vec<String>, ProviderError> {
        let _ = (prior, planned);
        Ok(Vec::new())
    }

    /// Create the resource and return its refreshed state.
    async fn create(
        &self,
        ctx: &ResourceContext,
        model: Self::Model,
    ) -> Result<Self::Model, ProviderError>;

    /// Refresh state. `None` means the resource is gone.
    async fn read(
        &self,
        ctx: &ResourceContext,
        model: Self::Model,
    ) -> Result<Option<Self::Model>, ProviderError>;

    /// Update in place and return the refreshed state.
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: Self::Model,
        planned: Self::Model,
    ) -> Result<Self::Model, ProviderError> {
        let _ = (ctx, prior, planned);
        Err(ProviderError::InvalidRequest(format!(
            "{} does not support in-place updates",
            self.type_name()
        )))
    }

    /// Delete the resource. A resource that is already gone is not an error.
    async fn delete(&self, ctx: &ResourceContext, model: Self::Model) -> Result<(), ProviderError>;

    /// Build state for an existing resource from its ID.
    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<Self::Model>, ProviderError> {
        self.validate_id(id)?;
        let model: Self::Model = serde_json::from_value(json!({ "id": id }))?;
        self.read(ctx, model).await
    }
}

/// A read-only data source over a typed model.
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// The lookup arguments and computed results.
    type Model: Serialize + DeserializeOwned + Default + Send + Sync + 'static;

    /// The data source type name.
    fn type_name(&self) -> &'static str;

    /// Attributes, excluding `id` and `timeouts`.
    fn schema(&self) -> Schema;

    /// Deadline for a read.
    fn read_timeout(&self) -> Duration {
        Duration::from_secs(5 * 60)
    }

    /// Look the entity up.
    async fn read(
        &self,
        ctx: &ResourceContext,
        model: Self::Model,
    ) -> Result<Self::Model, ProviderError>;
}

/// A resource as seen by the provider service: JSON in, JSON out.
#[async_trait]
pub trait DynResource: Send + Sync {
    /// The resource type name.
    fn type_name(&self) -> &'static str;

    /// The full schema, including `id` and `timeouts`.
    fn schema(&self) -> Schema;

    /// Validate configuration without touching the remote API.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;

    /// Plan the transition from `prior` to `proposed`; `Value::Null`
    /// proposed means destroy.
    fn plan(&self, prior: Option<&Value>, proposed: Value) -> Result<PlanResult, ProviderError>;

    /// Create and return the new state.
    async fn create(&self, ctx: &ResourceContext, planned: Value) -> Result<Value, ProviderError>;

    /// Refresh; `Value::Null` when the resource is gone.
    async fn read(&self, ctx: &ResourceContext, state: Value) -> Result<Value, ProviderError>;

    /// Update in place and return the new state.
    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete.
    async fn delete(&self, ctx: &ResourceContext, state: Value) -> Result<(), ProviderError>;

    /// Import by ID.
    async fn import(&self, ctx: &ResourceContext, id: &str) -> Result<Value, ProviderError>;
}

/// A data source as seen by the provider service.
#[async_trait]
pub trait DynDataSource: Send + Sync {
    /// The data source type name.
    fn type_name(&self) -> &'static str;

    /// The full schema, including `id`.
    fn schema(&self) -> Schema;

    /// Validate configuration.
    fn validate(&self, config: &Value) -> Vec<Diagnostic>;

    /// Read and return the populated state.
    async fn read(&self, ctx: &ResourceContext, config: Value) -> Result<Value, ProviderError>;
}

/// Adapt a typed resource to [`DynResource`].
pub fn erase_resource<R: Resource>(resource: R) -> Arc<dyn DynResource> {
    Arc::new(ErasedResource(resource))
}

/// Adapt a typed data source to [`DynDataSource`].
pub fn erase_data_source<D: DataSource>(data_source: D) -> Arc<dyn DynDataSource> {
    Arc::new(ErasedDataSource(data_source))
}

/// Drop `null` object members so unset attributes take their model default.
fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(obj) => {
            obj.retain(|_, v| !v.is_null());
            obj.values_mut().for_each(strip_nulls);
        },
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {},
    }
}

struct ErasedResource<R>(R);

impl<R: Resource> ErasedResource<R> {
    fn full_schema(&self) -> Schema {
        let mut schema = self.0.schema();
        schema
            .block
            .attributes
            .entry("id".to_string())
            .or_insert_with(|| Attribute::computed_string().with_description("The resource ID"));
        schema
            .block
            .blocks
            .insert(TIMEOUTS_KEY.to_string(), Timeouts::block());
        schema
    }

    fn timeouts_for(&self, state: &Value) -> Result<Timeouts, ProviderError> {
        self.0.timeouts().with_overrides(state.get(TIMEOUTS_KEY))
    }

    fn decode(&self, state: &Value) -> Result<R::Model, ProviderError> {
        let mut state = state.clone();
        self.full_schema().block.apply_defaults(&mut state);
        if let Value::Object(obj) = &mut state {
            obj.remove(TIMEOUTS_KEY);
        }
        strip_nulls(&mut state);
        serde_json::from_value(state).map_err(|e| {
            ProviderError::Validation(format!("decoding {} state: {e}", self.0.type_name()))
        })
    }

    fn encode(&self, model: &R::Model, source: &Value) -> Result<Value, ProviderError> {
        let mut value = serde_json::to_value(model)?;
        if let (Value::Object(obj), Some(timeouts)) = (&mut value, source.get(TIMEOUTS_KEY)) {
            obj.insert(TIMEOUTS_KEY.to_string(), timeouts.clone());
        }
        Ok(value)
    }

    fn check(&self, model: &R::Model) -> Result<(), ProviderError> {
        let errors: Vec<String> = self
            .0
            .validate_model(model)
            .into_iter()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
            .map(|d| match d.detail {
                Some(detail) => format!("{}: {detail}", d.summary),
                None => d.summary,
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::Validation(errors.join("; ")))
        }
    }

    async fn bounded<T, F>(
        &self,
        ctx: &ResourceContext,
        op: Operation,
        limit: Duration,
        work: impl FnOnce(ResourceContext) -> F,
    ) -> Result<T, ProviderError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let scoped = ctx.with_timeout(limit);
        let cancel = ctx.cancel.clone();
        let type_name = self.0.type_name();

        tokio::select! {
            result = tokio::time::timeout(limit, work(scoped)) => result.unwrap_or_else(|_| {
                Err(ProviderError::DeadlineExceeded(format!(
                    "{type_name} {} did not finish within {limit:?}",
                    op.key()
                )))
            }),
            _ = cancel.cancelled() => Err(ProviderError::DeadlineExceeded(format!(
                "{type_name} {} cancelled by provider shutdown",
                op.key()
            ))),
        }
    }
}

#[async_trait]
impl<R: Resource> DynResource for ErasedResource<R> {
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn schema(&self) -> Schema {
        self.full_schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let schema = self.full_schema();
        let mut diagnostics = validation::validate(&schema, config);
        if let Err(e) = self.0.timeouts().with_overrides(config.get(TIMEOUTS_KEY)) {
            diagnostics.push(Diagnostic::error(e.message()).with_attribute(TIMEOUTS_KEY));
        }
        if diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error)
        {
            return diagnostics;
        }
        match self.decode(config) {
            Ok(model) => diagnostics.extend(self.0.validate_model(&model)),
            Err(e) => diagnostics.push(Diagnostic::error(e.message())),
        }
        diagnostics
    }

    fn plan(&self, prior: Option<&Value>, proposed: Value) -> Result<PlanResult, ProviderError> {
        let schema = self.full_schema();
        let prior = prior.filter(|p| !p.is_null());

        if proposed.is_null() {
            let changes = match prior {
                Some(p) => plan::diff(&schema.block, p, &Value::Null).changes,
                None => Vec::new(),
            };
            return Ok(PlanResult::with_changes(Value::Null, changes, false));
        }

        let prior_model = prior.map(|p| self.decode(p)).transpose()?;
        let mut planned_model = self.decode(&proposed)?;
        let forced = self
            .0
            .customize_plan(prior_model.as_ref(), &mut planned_model)?;
        let mut planned = self.encode(&planned_model, &proposed)?;
        if let Value::Object(obj) = &mut planned {
            if plan::is_unknown(obj.get("id")) {
                obj.insert("id".to_string(), Value::Null);
            }
        }

        let Some(prior) = prior else {
            let changes = match &planned {
                Value::Object(obj) => obj
                    .iter()
                    .filter(|(k, v)| *k != TIMEOUTS_KEY && !plan::is_unknown(Some(v)))
                    .map(|(k, v)| AttributeChange::added(k.clone(), v.clone()))
                    .collect(),
                _ => Vec::new(),
            };
            return Ok(PlanResult::with_changes(planned, changes, false));
        };

        // Computed values the configuration leaves unset carry over from prior state.
        if let (Value::Object(obj), Value::Object(prior_obj)) = (&mut planned, prior) {
            for (name, attr) in &schema.block.attributes {
                if !attr.flags.computed {
                    continue;
                }
                let unset = plan::is_unknown(obj.get(name));
                if let (true, Some(previous)) = (unset, prior_obj.get(name)) {
                    obj.insert(name.clone(), previous.clone());
                }
            }
        }

        let mut diff = plan::diff(&schema.block, prior, &planned);
        // Timeouts are local to the host and never sent to the API.
        diff.changes.retain(|c| c.path != TIMEOUTS_KEY);
        for path in forced {
            let top = path.split('.').next().unwrap_or(&path);
            if diff.changes.iter().any(|c| c.path == top) && !diff.replace_paths.contains(&path) {
                diff.replace_paths.push(path);
            }
        }
        let requires_replace = diff.requires_replace();
        if requires_replace {
            debug!(
                resource_type = self.0.type_name(),
                paths = ?diff.replace_paths,
                "change requires replacement"
            );
        }
        Ok(PlanResult::with_changes(planned, diff.changes, requires_replace))
    }

    async fn create(&self, ctx: &ResourceContext, planned: Value) -> Result<Value, ProviderError> {
        let timeouts = self.timeouts_for(&planned)?;
        let model = self.decode(&planned)?;
        self.check(&model)?;

        info!(resource_type = self.0.type_name(), "creating resource");
        let created = self
            .bounded(ctx, Operation::Create, timeouts.create, |ctx| async move {
                self.0.create(&ctx, model).await
            })
            .await?;
        self.encode(&created, &planned)
    }

    async fn read(&self, ctx: &ResourceContext, state: Value) -> Result<Value, ProviderError> {
        let timeouts = self.timeouts_for(&state)?;
        let model = self.decode(&state)?;

        let refreshed = self
            .bounded(ctx, Operation::Read, timeouts.read, |ctx| async move {
                self.0.read(&ctx, model).await
            })
            .await?;
        match refreshed {
            Some(model) => self.encode(&model, &state),
            None => {
                warn!(
                    resource_type = self.0.type_name(),
                    id = state.get("id").and_then(serde_json::Value::as_str).unwrap_or_default(),
                    "resource no longer exists, removing from state"
                );
                Ok(Value::Null)
            },
        }
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: Value,
        planned: Value,
    ) -> Result<Value, ProviderError> {
        let timeouts = self.timeouts_for(&planned)?;
        let prior_model = self.decode(&prior)?;
        let mut planned_model = self.decode(&planned)?;
        self.check(&planned_model)?;

        // The planned state may predate the ID; it always matches prior.
        if let (Value::Object(mut p), Some(id)) =
            (serde_json::to_value(&planned_model)?, prior.get("id"))
        {
            if plan::is_unknown(p.get("id")) {
                p.insert("id".to_string(), id.clone());
                planned_model = serde_json::from_value(Value::Object(p))?;
            }
        }

        info!(resource_type = self.0.type_name(), "updating resource");
        let updated = self
            .bounded(ctx, Operation::Update, timeouts.update, |ctx| async move {
                self.0.update(&ctx, prior_model, planned_model).await
            })
            .await?;
        self.encode(&updated, &planned)
    }

    async fn delete(&self, ctx: &ResourceContext, state: Value) -> Result<(), ProviderError> {
        let timeouts = self.timeouts_for(&state)?;
        let model = self.decode(&state)?;

        info!(resource_type = self.0.type_name(), "deleting resource");
        self.bounded(ctx, Operation::Delete, timeouts.delete, |ctx| async move {
            self.0.delete(&ctx, model).await
        })
        .await
    }

    async fn import(&self, ctx: &ResourceContext, id: &str) -> Result<Value, ProviderError> {
        self.0.validate_id(id)?;
        let timeouts = self.0.timeouts();

        info!(resource_type = self.0.type_name(), id, "importing resource");
        let imported = self
            .bounded(ctx, Operation::Read, timeouts.read, |ctx| async move {
                self.0.import(&ctx, id).await
            })
            .await?;
        match imported {
            Some(model) => self.encode(&model, &Value::Object(Map::new())),
            None => Err(ProviderError::NotFound(format!(
                "cannot import non-existent remote object {id:?}"
            ))),
        }
    }
}

struct ErasedDataSource<D>(D);

impl<D: DataSource> ErasedDataSource<D> {
    fn full_schema(&self) -> Schema {
        let mut schema = self.0.schema();
        schema
            .block
            .attributes
            .entry("id".to_string())
            .or_insert_with(Attribute::computed_string);
        schema
    }
}

#[async_trait]
impl<D: DataSource> DynDataSource for ErasedDataSource<D> {
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn schema(&self) -> Schema {
        self.full_schema()
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.full_schema(), config)
    }

    async fn read(&self, ctx: &ResourceContext, config: Value) -> Result<Value, ProviderError> {
        let mut config = config;
        strip_nulls(&mut config);
        let model: D::Model = serde_json::from_value(config).map_err(|e| {
            ProviderError::Validation(format!("decoding {} config: {e}", self.0.type_name()))
        })?;
        let limit = self.0.read_timeout();
        let scoped = ctx.with_timeout(limit);

        debug!(data_source = self.0.type_name(), "reading data source");
        let result = tokio::select! {
            result = tokio::time::timeout(limit, self.0.read(&scoped, model)) => {
                result.unwrap_or_else(|_| {
                    Err(ProviderError::DeadlineExceeded(format!(
                        "{} read did not finish within {limit:?}",
                        self.0.type_name()
                    )))
                })
            },
            _ = ctx.cancel.cancelled() => Err(ProviderError::DeadlineExceeded(format!(
                "{} read cancelled by provider shutdown",
                self.0.type_name()
            ))),
        }?;
        Ok(serde_json::to_value(result)?)
    }
}
