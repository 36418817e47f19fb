//! The provider service contract and the PostgreSQL provider that serves it.
//!
//! [`ProviderService`] is what a host drives: schema discovery, provider
//! configuration, and the plan/apply lifecycle for resources and data
//! sources. State and configuration cross this boundary as
//! `serde_json::Value`.
//!
//! [`PostgresProvider`] dispatches every call to the resource registered
//! under the requested type name.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::client::ArmTransport;
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::locks::LockRegistry;
use crate::registration::{PostgresRegistration, ServiceRegistration};
use crate::resource::{DynDataSource, DynResource, ResourceContext};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};

/// Trait that provider implementations must implement.
///
/// # Example
///
/// ```ignore
/// use azurerm_postgresql::{PostgresProvider, ProviderService};
///
/// let provider = PostgresProvider::new();
/// let diagnostics = provider.configure(serde_json::json!({
///     "subscription_id": "00000000-0000-0000-0000-000000000000",
///     "access_token": "token",
/// })).await?;
/// assert!(diagnostics.is_empty());
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema & Metadata
    // =========================================================================

    /// Return the provider's schema including all resources and data sources.
    fn schema(&self) -> ProviderSchema;

    /// Return provider metadata. By default, this is derived from the schema.
    fn metadata(&self) -> ProviderMetadata {
        let schema = self.schema();
        let mut resources: Vec<String> = schema.resources.keys().cloned().collect();
        let mut data_sources: Vec<String> = schema.data_sources.keys().cloned().collect();
        resources.sort();
        data_sources.sort();
        ProviderMetadata {
            resources,
            data_sources,
            capabilities: Default::default(),
        }
    }

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = config;
        Ok(vec![])
    }

    /// Configure the provider with credentials and settings.
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    /// Stop the provider gracefully.
    async fn stop(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (resource_type, config);
        Ok(vec![])
    }

    /// Upgrade resource state from an older schema version.
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let _ = (resource_type, version);
        Ok(state)
    }

    /// Plan changes for a resource. A `null` proposed state plans a destroy.
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        config: Value,
    ) -> Result<PlanResult, ProviderError>;

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError>;

    /// Read the current state of a resource; `null` when it no longer exists.
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError>;

    /// Import existing infrastructure into management.
    async fn import_resource(
        &self,
        resource_type: &str,
        _id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        Err(ProviderError::Sdk(format!(
            "Import not supported for resource type: {}",
            resource_type
        )))
    }

    // =========================================================================
    // Data Source Operations
    // =========================================================================

    /// Validate a data source's configuration.
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let _ = (data_source_type, config);
        Ok(vec![])
    }

    /// Read data from an external source.
    async fn read_data_source(
        &self,
        data_source_type: &str,
        _config: Value,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::UnknownResource(format!(
            "Unknown data source type: {}",
            data_source_type
        )))
    }
}

/// Serves the resources of one or more [`ServiceRegistration`]s.
pub struct PostgresProvider {
    resources: BTreeMap<&'static str, Arc<dyn DynResource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DynDataSource>>,
    context: RwLock<Option<ResourceContext>>,
    locks: LockRegistry,
    cancel: CancellationToken,
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresProvider {
    /// A provider serving [`PostgresRegistration`]. Unconfigured.
    pub fn new() -> Self {
        Self::from_registrations(&[&PostgresRegistration])
    }

    /// A provider serving every resource of `registrations`.
    pub fn from_registrations(registrations: &[&dyn ServiceRegistration]) -> Self {
        let mut resources = BTreeMap::new();
        let mut data_sources = BTreeMap::new();
        for registration in registrations {
            debug!(service = registration.name(), "registering service");
            for resource in registration.supported_resources() {
                resources.insert(resource.type_name(), resource);
            }
            for data_source in registration.supported_data_sources() {
                data_sources.insert(data_source.type_name(), data_source);
            }
        }
        Self {
            resources,
            data_sources,
            context: RwLock::new(None),
            locks: LockRegistry::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Configure the provider against `arm` directly, bypassing credentials.
    pub fn with_transport(self, arm: Arc<dyn ArmTransport>, subscription_id: &str) -> Self {
        let ctx = self.context_for(arm, subscription_id, None);
        Self {
            context: RwLock::new(Some(ctx)),
            ..self
        }
    }

    fn context_for(
        &self,
        arm: Arc<dyn ArmTransport>,
        subscription_id: &str,
        poll_interval: Option<std::time::Duration>,
    ) -> ResourceContext {
        ResourceContext::new(arm, subscription_id)
            .with_locks(self.locks.clone())
            .with_poll_interval(poll_interval)
            .with_cancellation(self.cancel.clone())
    }

    async fn context(&self) -> Result<ResourceContext, ProviderError> {
        self.context.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }

    fn resource(&self, resource_type: &str) -> Result<&Arc<dyn DynResource>, ProviderError> {
        self.resources.get(resource_type).ok_or_else(|| {
            ProviderError::UnknownResource(format!("Unknown resource type: {resource_type}"))
        })
    }

    fn data_source(&self, data_source_type: &str) -> Result<&Arc<dyn DynDataSource>, ProviderError> {
        self.data_sources.get(data_source_type).ok_or_else(|| {
            ProviderError::UnknownResource(format!("Unknown data source type: {data_source_type}"))
        })
    }
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.severity == DiagnosticSeverity::Error)
}

#[async_trait::async_trait]
impl ProviderService for PostgresProvider {
    fn schema(&self) -> ProviderSchema {
        let mut schema = ProviderSchema::new().with_provider_config(ProviderConfig::schema());
        for (name, resource) in &self.resources {
            schema = schema.with_resource(*name, resource.schema());
        }
        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(*name, data_source.schema());
        }
        schema
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().map(|k| k.to_string()).collect(),
            data_sources: self.data_sources.keys().map(|k| k.to_string()).collect(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    #[instrument(skip(self, config), name = "provider.validate_provider_config")]
    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        debug!("ValidateProviderConfig called");
        Ok(match ProviderConfig::from_value(&config) {
            Ok(_) => Vec::new(),
            Err(diagnostics) => {
                warn!(diagnostics = diagnostics.len(), "ValidateProviderConfig completed with errors");
                diagnostics
            },
        })
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        debug!("Configure called");
        let resolved = match ProviderConfig::from_value(&config) {
            Ok(resolved) => resolved,
            Err(diagnostics) => {
                warn!(diagnostics = diagnostics.len(), "Configure completed with errors");
                return Ok(diagnostics);
            },
        };
        let client = resolved.build_client().map_err(|e| {
            error!(error = %e, "Configure failed");
            e
        })?;
        let ctx = self.context_for(
            Arc::new(client),
            &resolved.subscription_id,
            resolved.poll_interval,
        );
        *self.context.write().await = Some(ctx);
        info!(
            environment = %resolved.environment,
            endpoint = %resolved.resource_manager_endpoint,
            "Configure completed successfully"
        );
        Ok(Vec::new())
    }

    #[instrument(skip(self), name = "provider.stop")]
    async fn stop(&self) -> Result<(), ProviderError> {
        info!("Stop called");
        self.cancel.cancel();
        Ok(())
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        debug!(resource_type = %resource_type, "ValidateResourceConfig called");
        let diagnostics = self.resource(resource_type)?.validate(&config);
        if has_errors(&diagnostics) {
            warn!(resource_type = %resource_type, diagnostics = diagnostics.len(), "ValidateResourceConfig completed with errors");
        }
        Ok(diagnostics)
    }

    #[instrument(skip(self, state), name = "provider.upgrade_resource_state")]
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        let current = self.resource(resource_type)?.schema().version;
        if u64::try_from(version).map_or(true, |v| v > current) {
            error!(resource_type = %resource_type, version, "UpgradeResourceState failed");
            return Err(ProviderError::FailedPrecondition(format!(
                "{resource_type} state version {version} is newer than schema version {current}"
            )));
        }
        Ok(state)
    }

    #[instrument(skip(self, prior_state, proposed_state, _config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        debug!(resource_type = %resource_type, is_create = prior_state.is_none(), "Plan called");
        let result = self
            .resource(resource_type)?
            .plan(prior_state.as_ref(), proposed_state);
        match &result {
            Ok(plan) => info!(
                resource_type = %resource_type,
                changes = plan.changes.len(),
                requires_replace = plan.requires_replace,
                "Plan completed"
            ),
            Err(e) => error!(resource_type = %resource_type, error = %e, "Plan failed"),
        }
        result
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        info!(resource_type = %resource_type, "Create called");
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.create(&ctx, planned_state).await.map_err(|e| {
            error!(resource_type = %resource_type, error = %e, "Create failed");
            e
        })
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        debug!(resource_type = %resource_type, "Read called");
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.read(&ctx, current_state).await.map_err(|e| {
            error!(resource_type = %resource_type, error = %e, "Read failed");
            e
        })
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        info!(resource_type = %resource_type, "Update called");
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource
            .update(&ctx, prior_state, planned_state)
            .await
            .map_err(|e| {
                error!(resource_type = %resource_type, error = %e, "Update failed");
                e
            })
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        info!(resource_type = %resource_type, "Delete called");
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        resource.delete(&ctx, current_state).await.map_err(|e| {
            error!(resource_type = %resource_type, error = %e, "Delete failed");
            e
        })
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        info!(resource_type = %resource_type, "ImportResourceState called");
        let resource = self.resource(resource_type)?;
        let ctx = self.context().await?;
        match resource.import(&ctx, id).await {
            Ok(state) => Ok(vec![ImportedResource::new(resource_type, state)]),
            Err(e) => {
                error!(resource_type = %resource_type, error = %e, "ImportResourceState failed");
                Err(e)
            },
        }
    }

    #[instrument(skip(self, config), name = "provider.validate_data_source_config")]
    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        debug!(data_source_type = %data_source_type, "ValidateDataSourceConfig called");
        Ok(self.data_source(data_source_type)?.validate(&config))
    }

    #[instrument(skip(self, config), name = "provider.read_data_source")]
    async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        debug!(data_source_type = %data_source_type, "ReadDataSource called");
        let data_source = self.data_source(data_source_type)?;
        let ctx = self.context().await?;
        data_source.read(&ctx, config).await.map_err(|e| {
            error!(data_source_type = %data_source_type, error = %e, "ReadDataSource failed");
            e
        })
    }
}
