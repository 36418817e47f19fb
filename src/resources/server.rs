use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::client::{TypedClient, SINGLE_SERVER_API_VERSION};
use crate::error::ProviderError;
use crate::ids::{IdKind, ResourceId, ServerId};
use crate::poller::Refresh;
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema, Validator};
use crate::sdk::{
    ResourceIdentity, SecurityAlertPolicyProperties, Server, ServerCommonProperties,
    ServerForCreate, ServerPropertiesForCreate, ServerSecurityAlertPolicy,
    ServerUpdateParameters, ServerUpdateProperties, Sku, StorageProfile, Tags,
};
use crate::timeouts::Timeouts;

use super::{
    enabled, ensure_absent, is_enabled, location_attribute, normalize_location,
    resource_group_attribute, tags_attribute, validate,
};

const READY: &str = "Ready";
const INACCESSIBLE: &str = "Inaccessible";
const TLS_ENFORCEMENT_DISABLED: &str = "TLSEnforcementDisabled";
const CREATE_MODES: &[&str] = &["Default", "GeoRestore", "PointInTimeRestore", "Replica"];
const TLS_VERSIONS: &[&str] = &["TLS1_0", "TLS1_1", "TLS1_2", TLS_ENFORCEMENT_DISABLED];
const DISABLED_ALERTS: &[&str] = &[
    "Sql_Injection",
    "Sql_Injection_Vulnerability",
    "Access_Anomaly",
    "Data_Exfiltration",
    "Unsafe_Action",
];
const THREAT_POLICY_FIELDS: &[&str] = &[
    "threat_detection_policy.0.enabled",
    "threat_detection_policy.0.disabled_alerts",
    "threat_detection_policy.0.email_account_admins",
    "threat_detection_policy.0.email_addresses",
    "threat_detection_policy.0.retention_days",
    "threat_detection_policy.0.storage_account_access_key",
    "threat_detection_policy.0.storage_endpoint",
];

/// State of `azurerm_postgresql_server`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerModel {
    pub id: String,
    pub name: String,
    pub location: String,
    pub resource_group_name: String,
    pub sku_name: String,
    pub version: String,
    pub administrator_login: Option<String>,
    pub administrator_login_password: Option<String>,
    pub auto_grow_enabled: bool,
    pub backup_retention_days: Option<i64>,
    pub geo_redundant_backup_enabled: bool,
    pub create_mode: String,
    pub creation_source_server_id: Option<String>,
    pub identity: Vec<SystemAssignedIdentity>,
    pub infrastructure_encryption_enabled: bool,
    pub public_network_access_enabled: bool,
    pub restore_point_in_time: Option<String>,
    pub storage_mb: Option<i64>,
    pub ssl_minimal_tls_version_enforced: String,
    pub ssl_enforcement_enabled: bool,
    pub threat_detection_policy: Vec<ThreatDetectionPolicy>,
    pub fqdn: Option<String>,
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemAssignedIdentity {
    #[serde(rename = "type")]
    pub kind: String,
    pub principal_id: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreatDetectionPolicy {
    pub enabled: Option<bool>,
    pub disabled_alerts: Vec<String>,
    pub email_account_admins: Option<bool>,
    pub email_addresses: Vec<String>,
    pub retention_days: Option<i64>,
    pub storage_account_access_key: Option<String>,
    pub storage_endpoint: Option<String>,
}

/// An Azure Database for PostgreSQL single server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerResource;

/// `GP_Gen5_4` is tier `GeneralPurpose`, family `Gen5`, capacity 4.
fn expand_sku(sku_name: &str) -> Result<Sku, ProviderError> {
    let parts: Vec<&str> = sku_name.split('_').collect();
    let &[tier, family, capacity] = parts.as_slice() else {
        return Err(ProviderError::Validation(format!(
            "sku_name ({sku_name}) has the wrong number of parts ({}) after splitting on _",
            parts.len()
        )));
    };
    let tier = match tier {
        "B" => "Basic",
        "GP" => "GeneralPurpose",
        "MO" => "MemoryOptimized",
        other => {
            return Err(ProviderError::Validation(format!(
                "sku_name {sku_name} has unknown sku tier {other}"
            )))
        },
    };
    let capacity: i64 = capacity.parse().map_err(|_| {
        ProviderError::Validation(format!(
            "cannot convert sku_name {sku_name} capacity {capacity} to an integer"
        ))
    })?;
    Ok(Sku {
        name: sku_name.to_string(),
        tier: Some(tier.to_string()),
        capacity: Some(capacity),
        family: Some(family.to_string()),
    })
}

fn sku_tier_prefix(sku_name: &str) -> &str {
    sku_name.split('_').next().unwrap_or_default()
}

fn expand_identity(identity: &[SystemAssignedIdentity]) -> Option<ResourceIdentity> {
    identity.first().map(|i| ResourceIdentity {
        kind: i.kind.clone(),
        ..Default::default()
    })
}

pub(crate) fn flatten_identity(identity: Option<ResourceIdentity>) -> Vec<SystemAssignedIdentity> {
    match identity {
        Some(i) if i.kind == "SystemAssigned" => vec![SystemAssignedIdentity {
            kind: i.kind,
            principal_id: i.principal_id,
            tenant_id: i.tenant_id,
        }],
        _ => Vec::new(),
    }
}

fn expand_threat_policy(policy: &ThreatDetectionPolicy) -> ServerSecurityAlertPolicy {
    ServerSecurityAlertPolicy {
        properties: SecurityAlertPolicyProperties {
            state: enabled(policy.enabled.unwrap_or_default()),
            disabled_alerts: Some(policy.disabled_alerts.clone()),
            email_addresses: Some(policy.email_addresses.clone()),
            email_account_admins: Some(policy.email_account_admins.unwrap_or_default()),
            storage_endpoint: policy.storage_endpoint.clone().filter(|s| !s.is_empty()),
            storage_account_access_key: policy
                .storage_account_access_key
                .clone()
                .filter(|s| !s.is_empty()),
            retention_days: Some(policy.retention_days.unwrap_or_default()),
        },
    }
}

/// The API reports empty lists as `[""]`.
fn flatten_alert_set(values: Option<Vec<String>>) -> Vec<String> {
    let mut values: Vec<String> = values
        .unwrap_or_default()
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect();
    values.sort();
    values
}

/// `None` for the policy every server reports before one is configured.
fn flatten_threat_policy(
    props: SecurityAlertPolicyProperties,
    access_key: Option<String>,
) -> Option<ThreatDetectionPolicy> {
    let blank = |v: &Option<Vec<String>>| {
        v.as_deref()
            .is_some_and(|items| items.len() == 1 && items[0].is_empty())
    };
    let never_set = blank(&props.disabled_alerts)
        && blank(&props.email_addresses)
        && props.storage_account_access_key.as_deref() == Some("")
        && props.storage_endpoint.as_deref() == Some("")
        && props.retention_days == Some(0)
        && props.email_account_admins == Some(false)
        && !is_enabled(Some(&props.state));
    if never_set {
        return None;
    }

    Some(ThreatDetectionPolicy {
        enabled: Some(is_enabled(Some(&props.state))),
        disabled_alerts: flatten_alert_set(props.disabled_alerts),
        email_account_admins: props.email_account_admins,
        email_addresses: flatten_alert_set(props.email_addresses),
        retention_days: props.retention_days,
        storage_account_access_key: access_key,
        storage_endpoint: props.storage_endpoint,
    })
}

fn storage_profile(model: &ServerModel) -> StorageProfile {
    StorageProfile {
        backup_retention_days: model.backup_retention_days,
        geo_redundant_backup: Some(enabled(model.geo_redundant_backup_enabled)),
        storage_mb: model.storage_mb,
        storage_autogrow: Some(enabled(model.auto_grow_enabled)),
    }
}

fn security_alert_policy_path(id: &ServerId) -> String {
    format!("{}/securityAlertPolicies/Default", id.id())
}

async fn server_state(
    client: &TypedClient<Server>,
    id: &ServerId,
) -> Result<Refresh, ProviderError> {
    let server = client
        .get(&id.id())
        .await
        .map_err(|e| e.context(format!("retrieving status of {id}")))?;
    // New servers take a few seconds to show up.
    let Some(server) = server else {
        return Ok(Refresh::state(INACCESSIBLE));
    };
    let props = server.properties.unwrap_or_default();

    // BYOK replicas report Inaccessible until the key is revalidated.
    let byok_replica = props.replication_role.as_deref() == Some("Replica")
        && is_enabled(props.byok_enforcement.as_deref())
        && props.user_visible_state.as_deref() == Some(INACCESSIBLE);
    if byok_replica {
        return Ok(Refresh::state(READY));
    }

    Ok(Refresh::state(
        props
            .user_visible_state
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| INACCESSIBLE.to_string()),
    ))
}

impl ServerResource {
    async fn wait_until_ready(
        &self,
        ctx: &ResourceContext,
        id: &ServerId,
        pending: &[&str],
    ) -> Result<(), ProviderError> {
        let client = ctx.client::<Server>(SINGLE_SERVER_API_VERSION);
        debug!(%id, "waiting for server to become available");
        ctx.state_change(pending, &[READY], Duration::from_secs(15))
            .wait_for_state(|| server_state(&client, id))
            .await
            .map(drop)
            .map_err(|e| e.context(format!("waiting for {id} to become available")))
    }

    async fn put_threat_policy(
        &self,
        ctx: &ResourceContext,
        id: &ServerId,
        policy: &ThreatDetectionPolicy,
    ) -> Result<(), ProviderError> {
        ctx.client::<ServerSecurityAlertPolicy>(SINGLE_SERVER_API_VERSION)
            .put(&security_alert_policy_path(id), &expand_threat_policy(policy))
            .await
            .map_err(|e| e.context(format!("updating security alert policy for {id}")))
    }

    /// Scale every replica of `id` to `sku` before the primary grows past them.
    async fn scale_replicas(
        &self,
        ctx: &ResourceContext,
        id: &ServerId,
        sku: &Sku,
    ) -> Result<(), ProviderError> {
        let client = ctx.client::<Server>(SINGLE_SERVER_API_VERSION);
        let replicas = client
            .list(&format!("{}/replicas", id.id()))
            .await
            .map_err(|e| e.context(format!("listing replicas for {id}")))?;

        let update = ServerUpdateParameters {
            sku: Some(sku.clone()),
            ..Default::default()
        };
        for replica in replicas {
            let replica_id = ServerId::parse(replica.id.as_deref().unwrap_or_default())?;
            info!(replica = %replica_id, sku = %sku.name, "scaling replica");
            client
                .patch(&replica_id.id(), &update)
                .await
                .map_err(|e| e.context(format!("updating SKU for replica {replica_id}")))?;
        }
        Ok(())
    }

    fn create_properties(&self, model: &ServerModel) -> ServerPropertiesForCreate {
        let common = ServerCommonProperties {
            version: Some(model.version.clone()),
            ssl_enforcement: Some(enabled(model.ssl_enforcement_enabled)),
            minimal_tls_version: Some(model.ssl_minimal_tls_version_enforced.clone()),
            infrastructure_encryption: Some(enabled(model.infrastructure_encryption_enabled)),
            public_network_access: Some(enabled(model.public_network_access_enabled)),
            storage_profile: Some(storage_profile(model)),
        };
        let source_server_id = model.creation_source_server_id.clone().unwrap_or_default();
        match model.create_mode.as_str() {
            "PointInTimeRestore" => ServerPropertiesForCreate::PointInTimeRestore {
                source_server_id,
                restore_point_in_time: model.restore_point_in_time.clone().unwrap_or_default(),
                common: ServerCommonProperties {
                    public_network_access: None,
                    ..common
                },
            },
            "GeoRestore" => ServerPropertiesForCreate::GeoRestore {
                source_server_id,
                common,
            },
            "Replica" => ServerPropertiesForCreate::Replica {
                source_server_id,
                common: ServerCommonProperties {
                    storage_profile: None,
                    ..common
                },
            },
            _ => ServerPropertiesForCreate::Default {
                administrator_login: model.administrator_login.clone().unwrap_or_default(),
                administrator_login_password: model
                    .administrator_login_password
                    .clone()
                    .unwrap_or_default(),
                common,
            },
        }
    }

    /// Only the fields that differ from `prior`.
    fn update_parameters(
        &self,
        prior: &ServerModel,
        planned: &ServerModel,
    ) -> ServerUpdateParameters {
        let mut props = ServerUpdateProperties::default();

        if prior.ssl_enforcement_enabled != planned.ssl_enforcement_enabled {
            props.ssl_enforcement = Some(enabled(planned.ssl_enforcement_enabled));
        }
        if prior.ssl_minimal_tls_version_enforced != planned.ssl_minimal_tls_version_enforced {
            props.minimal_tls_version = Some(planned.ssl_minimal_tls_version_enforced.clone());
        }
        if prior.public_network_access_enabled != planned.public_network_access_enabled {
            props.public_network_access = Some(enabled(planned.public_network_access_enabled));
        }

        let mut storage = StorageProfile::default();
        if prior.storage_mb != planned.storage_mb {
            storage.storage_mb = planned.storage_mb;
        }
        if prior.backup_retention_days != planned.backup_retention_days {
            storage.backup_retention_days = planned.backup_retention_days;
        }
        if prior.auto_grow_enabled != planned.auto_grow_enabled {
            storage.storage_autogrow = Some(enabled(planned.auto_grow_enabled));
        }
        if storage != StorageProfile::default() {
            props.storage_profile = Some(storage);
        }

        ServerUpdateParameters {
            sku: None,
            identity: (prior.identity.first().map(|i| &i.kind)
                != planned.identity.first().map(|i| &i.kind))
            .then(|| {
                expand_identity(&planned.identity).unwrap_or_else(|| ResourceIdentity {
                    kind: "None".to_string(),
                    ..Default::default()
                })
            }),
            tags: (prior.tags != planned.tags).then(|| planned.tags.clone()),
            properties: (props != ServerUpdateProperties::default()).then_some(props),
        }
    }

    async fn fetch(
        &self,
        ctx: &ResourceContext,
        id: &ServerId,
    ) -> Result<Option<Server>, ProviderError> {
        ctx.client::<Server>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))
    }
}

#[async_trait]
impl Resource for ServerResource {
    type Model = ServerModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_server"
    }

    fn schema(&self) -> Schema {
        let threat_policy = Block::new()
            .with_attribute(
                "enabled",
                Attribute::optional_bool().with_at_least_one_of(THREAT_POLICY_FIELDS),
            )
            .with_attribute(
                "disabled_alerts",
                Attribute::optional_string_set()
                    .with_validator(Validator::one_of(DISABLED_ALERTS))
                    .with_at_least_one_of(THREAT_POLICY_FIELDS),
            )
            .with_attribute(
                "email_account_admins",
                Attribute::optional_bool().with_at_least_one_of(THREAT_POLICY_FIELDS),
            )
            .with_attribute(
                "email_addresses",
                Attribute::optional_string_set().with_at_least_one_of(THREAT_POLICY_FIELDS),
            )
            .with_attribute(
                "retention_days",
                Attribute::optional_int64()
                    .with_validator(Validator::IntAtLeast { min: 0 })
                    .with_at_least_one_of(THREAT_POLICY_FIELDS),
            )
            .with_attribute(
                "storage_account_access_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_validator(Validator::StringNotEmpty)
                    .with_at_least_one_of(THREAT_POLICY_FIELDS),
            )
            .with_attribute(
                "storage_endpoint",
                Attribute::optional_string()
                    .with_validator(Validator::StringNotEmpty)
                    .with_at_least_one_of(THREAT_POLICY_FIELDS),
            );

        let identity = Block::new()
            .with_attribute(
                "type",
                Attribute::required_string().with_validator(Validator::one_of(&["SystemAssigned"])),
            )
            .with_attribute("principal_id", Attribute::computed_string())
            .with_attribute("tenant_id", Attribute::computed_string());

        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(validate::server_name()),
            )
            .with_attribute("location", location_attribute())
            .with_attribute("resource_group_name", resource_group_attribute())
            .with_attribute(
                "sku_name",
                Attribute::required_string()
                    .with_validator(Validator::one_of(validate::SINGLE_SERVER_SKUS)),
            )
            .with_attribute(
                "version",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::one_of(validate::SINGLE_SERVER_VERSIONS)),
            )
            .with_attribute(
                "administrator_login",
                Attribute::optional_computed_string()
                    .with_force_new()
                    .with_validator(Validator::StringNotWhitespace)
                    .with_validator(Validator::AdminUsername),
            )
            .with_attribute(
                "administrator_login_password",
                Attribute::optional_string().sensitive(),
            )
            .with_attribute(
                "auto_grow_enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute(
                "backup_retention_days",
                Attribute::optional_computed_int64().with_validator(Validator::int_between(7, 35)),
            )
            .with_attribute(
                "geo_redundant_backup_enabled",
                Attribute::optional_bool()
                    .with_force_new()
                    .with_default(json!(false)),
            )
            .with_attribute(
                "create_mode",
                Attribute::optional_string()
                    .with_default(json!("Default"))
                    .with_validator(Validator::one_of(CREATE_MODES)),
            )
            .with_attribute(
                "creation_source_server_id",
                Attribute::optional_string().with_validator(Validator::resource_id(IdKind::Server)),
            )
            .with_attribute(
                "infrastructure_encryption_enabled",
                Attribute::optional_bool()
                    .with_force_new()
                    .with_default(json!(false)),
            )
            .with_attribute(
                "public_network_access_enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute(
                "restore_point_in_time",
                Attribute::optional_string().with_validator(Validator::IsRfc3339Time),
            )
            .with_attribute(
                "storage_mb",
                Attribute::optional_computed_int64()
                    .with_validator(Validator::int_between(5120, 16777216))
                    .with_validator(Validator::IntDivisibleBy { divisor: 1024 }),
            )
            .with_attribute(
                "ssl_minimal_tls_version_enforced",
                Attribute::optional_string()
                    .with_default(json!("TLS1_2"))
                    .with_validator(Validator::one_of(TLS_VERSIONS)),
            )
            .with_attribute("ssl_enforcement_enabled", Attribute::required_bool())
            .with_attribute("fqdn", Attribute::computed_string())
            .with_attribute("tags", tags_attribute())
            .with_block("identity", NestedBlock::list(identity).with_max_items(1))
            .with_block(
                "threat_detection_policy",
                NestedBlock::list(threat_policy).with_max_items(1),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        ServerId::parse(id).map(drop).map_err(Into::into)
    }

    fn validate_model(&self, model: &ServerModel) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if !model.ssl_enforcement_enabled
            && model.ssl_minimal_tls_version_enforced != TLS_ENFORCEMENT_DISABLED
        {
            diagnostics.push(
                Diagnostic::error("`ssl_minimal_tls_version_enforced` must be set to `TLSEnforcementDisabled` if `ssl_enforcement_enabled` is set to `false`")
                    .with_attribute("ssl_minimal_tls_version_enforced"),
            );
        }

        let unset = |v: &Option<String>| v.as_deref().map_or(true, str::is_empty);
        match model.create_mode.as_str() {
            "Default" => {
                if unset(&model.administrator_login) {
                    diagnostics.push(
                        Diagnostic::error("`administrator_login` must not be empty when `create_mode` is `Default`")
                            .with_attribute("administrator_login"),
                    );
                }
                if unset(&model.administrator_login_password) {
                    diagnostics.push(
                        Diagnostic::error("`administrator_login_password` must not be empty when `create_mode` is `Default`")
                            .with_attribute("administrator_login_password"),
                    );
                }
                if !unset(&model.restore_point_in_time) {
                    diagnostics.push(
                        Diagnostic::error("`restore_point_in_time` cannot be set when `create_mode` is `Default`")
                            .with_attribute("restore_point_in_time"),
                    );
                }
            },
            mode => {
                if unset(&model.creation_source_server_id) {
                    diagnostics.push(
                        Diagnostic::error(format!(
                            "`creation_source_server_id` must be set when `create_mode` is `{mode}`"
                        ))
                        .with_attribute("creation_source_server_id"),
                    );
                }
                if mode == "PointInTimeRestore" && unset(&model.restore_point_in_time) {
                    diagnostics.push(
                        Diagnostic::error("`restore_point_in_time` must be set when `create_mode` is `PointInTimeRestore`")
                            .with_attribute("restore_point_in_time"),
                    );
                }
            },
        }
        diagnostics
    }

    fn customize_plan(
        &self,
        prior: Option<&ServerModel>,
        planned: &mut ServerModel,
    ) -> Result<Vec<String>, ProviderError> {
        planned.location = normalize_location(&planned.location);
        for policy in &mut planned.threat_detection_policy {
            policy.disabled_alerts.sort();
            policy.disabled_alerts.dedup();
            policy.email_addresses.sort();
            policy.email_addresses.dedup();
        }

        let Some(prior) = prior else {
            return Ok(Vec::new());
        };

        // Identity principals are assigned by the service.
        if let (Some(before), Some(after)) = (prior.identity.first(), planned.identity.first_mut()) {
            if before.kind == after.kind {
                after.principal_id.clone_from(&before.principal_id);
                after.tenant_id.clone_from(&before.tenant_id);
            }
        }

        let mut forced = Vec::new();
        let (old_tier, new_tier) = (
            sku_tier_prefix(&prior.sku_name),
            sku_tier_prefix(&planned.sku_name),
        );
        // Basic servers cannot move to or from another tier.
        if old_tier != new_tier && (old_tier == "B" || new_tier == "B") {
            forced.push("sku_name".to_string());
        }
        if prior.create_mode == "Default" && planned.create_mode == "Replica" {
            forced.push("create_mode".to_string());
        }
        Ok(forced)
    }

    async fn create(&self, ctx: &ResourceContext, model: ServerModel) -> Result<ServerModel, ProviderError> {
        let id = ServerId::new(ctx.subscription_id(), &model.resource_group_name, &model.name);
        let existing = self
            .fetch(ctx, &id)
            .await
            .map_err(|e| e.context("checking for presence of existing server"))?;
        ensure_absent(existing, self.type_name(), &id.id())?;

        let sku = expand_sku(&model.sku_name).map_err(|e| e.context("expanding `sku_name`"))?;
        let identity = expand_identity(&model.identity);
        let body = ServerForCreate {
            location: normalize_location(&model.location),
            sku,
            identity: identity.clone(),
            tags: (!model.tags.is_empty()).then(|| model.tags.clone()),
            properties: self.create_properties(&model),
        };

        info!(%id, create_mode = body.properties.create_mode(), "creating server");
        ctx.client::<Server>(SINGLE_SERVER_API_VERSION)
            .put(&id.id(), &body)
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;
        self.wait_until_ready(ctx, &id, &[INACCESSIBLE]).await?;

        if let Some(policy) = model.threat_detection_policy.first() {
            self.put_threat_policy(ctx, &id, policy).await?;
        }

        // Replicas and restores ignore these on create.
        let follow_up = match model.create_mode.as_str() {
            "Replica" => Some(ServerUpdateParameters {
                identity,
                properties: Some(ServerUpdateProperties {
                    public_network_access: Some(enabled(model.public_network_access_enabled)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            "PointInTimeRestore" => Some(ServerUpdateParameters {
                properties: Some(ServerUpdateProperties {
                    public_network_access: Some(enabled(model.public_network_access_enabled)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            _ => None,
        };
        if let Some(update) = follow_up {
            info!(%id, "updating public network access after create");
            ctx.client::<Server>(SINGLE_SERVER_API_VERSION)
                .patch(&id.id(), &update)
                .await
                .map_err(|e| e.context(format!("updating public network access for {id}")))?;
        }

        let model = ServerModel {
            id: id.id(),
            ..model
        };
        self.read(ctx, model)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found after creation")))
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        model: ServerModel,
    ) -> Result<Option<ServerModel>, ProviderError> {
        let id = ServerId::parse(&model.id)?;
        let Some(server) = self.fetch(ctx, &id).await? else {
            debug!(%id, "server not found");
            return Ok(None);
        };

        let props = server.properties.unwrap_or_default();
        let storage = props.storage_profile.unwrap_or_default();
        let sku = server.sku.unwrap_or_default();
        let tier = sku.tier.as_deref().unwrap_or("Basic");

        let mut threat_detection_policy = Vec::new();
        // Basic servers have no threat detection.
        if matches!(tier, "GeneralPurpose" | "MemoryOptimized") {
            let policy = ctx
                .client::<ServerSecurityAlertPolicy>(SINGLE_SERVER_API_VERSION)
                .get(&security_alert_policy_path(&id))
                .await
                .map_err(|e| e.context(format!("retrieving security alert policy for {id}")))?;
            let access_key = model
                .threat_detection_policy
                .first()
                .and_then(|p| p.storage_account_access_key.clone());
            threat_detection_policy.extend(
                policy.and_then(|p| flatten_threat_policy(p.properties, access_key)),
            );
        }

        Ok(Some(ServerModel {
            id: id.id(),
            name: id.server_name,
            resource_group_name: id.resource_group_name,
            location: normalize_location(&server.location),
            sku_name: sku.name,
            version: props.version.unwrap_or_default(),
            administrator_login: props.administrator_login,
            auto_grow_enabled: is_enabled(storage.storage_autogrow.as_deref()),
            backup_retention_days: storage.backup_retention_days,
            geo_redundant_backup_enabled: is_enabled(storage.geo_redundant_backup.as_deref()),
            identity: flatten_identity(server.identity),
            infrastructure_encryption_enabled: is_enabled(props.infrastructure_encryption.as_deref()),
            public_network_access_enabled: is_enabled(props.public_network_access.as_deref()),
            storage_mb: storage.storage_mb,
            ssl_minimal_tls_version_enforced: props.minimal_tls_version.unwrap_or_default(),
            ssl_enforcement_enabled: is_enabled(props.ssl_enforcement.as_deref()),
            threat_detection_policy,
            fqdn: props.fully_qualified_domain_name,
            tags: server.tags.unwrap_or_default(),
            ..model
        }))
    }

    /// Derives `create_mode` and `creation_source_server_id` from the
    /// server's replication role, which configuration cannot be read from.
    async fn import(
        &self,
        ctx: &ResourceContext,
        id: &str,
    ) -> Result<Option<ServerModel>, ProviderError> {
        let id = ServerId::parse(id)?;
        let Some(server) = self.fetch(ctx, &id).await? else {
            return Ok(None);
        };

        let mut model = ServerModel {
            id: id.id(),
            create_mode: "Default".to_string(),
            ..Default::default()
        };
        let props = server.properties.unwrap_or_default();
        if let Some(role) = props
            .replication_role
            .filter(|r| !matches!(r.as_str(), "Master" | "None" | ""))
        {
            let source = ServerId::parse(props.master_server_id.as_deref().unwrap_or_default())
                .map_err(|e| ProviderError::from(e).context("parsing the primary server ID"))?;
            model.create_mode = role;
            model.creation_source_server_id = Some(source.id());
        }
        self.read(ctx, model).await
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: ServerModel,
        planned: ServerModel,
    ) -> Result<ServerModel, ProviderError> {
        let id = ServerId::parse(&planned.id)?;
        let is_replica = planned.create_mode == "Replica";

        let primary_id = match (&planned.creation_source_server_id, is_replica) {
            (Some(source), true) => {
                // Scaling the primary restarts its replicas.
                self.wait_until_ready(ctx, &id, &[INACCESSIBLE, "Restarting"])
                    .await?;
                source.clone()
            },
            _ => id.id(),
        };
        let _guard = ctx.locks().lock(&primary_id).await;

        let mut update = self.update_parameters(&prior, &planned);
        if prior.sku_name != planned.sku_name {
            let sku = expand_sku(&planned.sku_name).map_err(|e| e.context("expanding `sku_name`"))?;
            let growing = validate::single_server_sku_rank(&prior.sku_name)
                < validate::single_server_sku_rank(&planned.sku_name);
            if growing && !is_replica {
                self.scale_replicas(ctx, &id, &sku).await?;
            }
            update.sku = Some(sku);
        }

        let promoted = prior.create_mode == "Replica" && planned.create_mode == "Default";
        if promoted {
            info!(%id, "promoting replica to a standalone server");
            update
                .properties
                .get_or_insert_with(Default::default)
                .replication_role = Some("None".to_string());
        }
        let password_changed =
            prior.administrator_login_password != planned.administrator_login_password;
        if password_changed && !promoted {
            update
                .properties
                .get_or_insert_with(Default::default)
                .administrator_login_password = planned.administrator_login_password.clone();
        }

        let client = ctx.client::<Server>(SINGLE_SERVER_API_VERSION);
        if update != ServerUpdateParameters::default() {
            info!(%id, "updating server");
            client
                .patch(&id.id(), &update)
                .await
                .map_err(|e| e.context(format!("updating {id}")))?;
        }

        // The password cannot change while replication is being stopped.
        if password_changed && promoted {
            let password = ServerUpdateParameters {
                properties: Some(ServerUpdateProperties {
                    administrator_login_password: planned.administrator_login_password.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            };
            client
                .patch(&id.id(), &password)
                .await
                .map_err(|e| e.context(format!("updating administrator password of {id}")))?;
        }

        if let Some(policy) = planned.threat_detection_policy.first() {
            if prior.threat_detection_policy.first() != Some(policy) {
                self.put_threat_policy(ctx, &id, policy).await?;
            }
        }

        self.read(ctx, planned)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found after update")))
    }

    async fn delete(&self, ctx: &ResourceContext, model: ServerModel) -> Result<(), ProviderError> {
        let id = ServerId::parse(&model.id)?;
        info!(%id, "deleting server");
        ctx.client::<Server>(SINGLE_SERVER_API_VERSION)
            .delete(&id.id())
            .await
            .map_err(|e| e.context(format!("deleting {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::erase_resource;
    use crate::testing::{FakeArm, Method};
    use std::sync::Arc;
    use tokio::time::Instant;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/servers/pgsrv";
    const REPLICA: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/servers/pgsrv-replica";

    fn config() -> serde_json::Value {
        json!({
            "name": "pgsrv",
            "location": "West Europe",
            "resource_group_name": "rg",
            "sku_name": "GP_Gen5_2",
            "version": "11",
            "administrator_login": "psqladmin",
            "administrator_login_password": "H@Sh1CoR3!",
            "storage_mb": 5120,
            "ssl_enforcement_enabled": true,
        })
    }

    /// Servers come up Inaccessible and turn Ready on the next read.
    fn fake() -> Arc<FakeArm> {
        let fake = Arc::new(FakeArm::new());
        fake.on_write("/servers/", |_, body| {
            let props = &mut body["properties"];
            if props.get("userVisibleState").is_none() {
                props["userVisibleState"] = json!("Ready");
            }
        });
        fake
    }

    #[test]
    fn test_expand_sku() {
        let sku = expand_sku("GP_Gen5_4").unwrap();
        assert_eq!(sku.tier.as_deref(), Some("GeneralPurpose"));
        assert_eq!(sku.family.as_deref(), Some("Gen5"));
        assert_eq!(sku.capacity, Some(4));

        assert!(expand_sku("GP_Gen5").is_err());
        assert!(expand_sku("XX_Gen5_2").is_err());
        assert!(expand_sku("B_Gen5_two").is_err());
    }

    #[test]
    fn test_validate_create_mode_requirements() {
        let resource = erase_resource(ServerResource);
        assert!(resource.validate(&config()).is_empty());

        let mut no_password = config();
        no_password["administrator_login_password"] = serde_json::Value::Null;
        let diagnostics = resource.validate(&no_password);
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("administrator_login_password")));

        let mut restore = config();
        restore["create_mode"] = json!("PointInTimeRestore");
        restore["creation_source_server_id"] = json!(REPLICA);
        let diagnostics = resource.validate(&restore);
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("restore_point_in_time")));
    }

    #[test]
    fn test_validate_tls_requires_enforcement() {
        let mut config = config();
        config["ssl_enforcement_enabled"] = json!(false);
        let diagnostics = erase_resource(ServerResource).validate(&config);
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("ssl_minimal_tls_version_enforced")));
    }

    #[test]
    fn test_validate_reserved_admin_login() {
        let mut config = config();
        config["administrator_login"] = json!("azure_superuser");
        let diagnostics = erase_resource(ServerResource).validate(&config);
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("administrator_login")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_ready() {
        let fake = Arc::new(FakeArm::new());
        fake.script_get(
            ID,
            [
                None,
                None,
                Some(json!({"properties": {"userVisibleState": "Inaccessible"}})),
            ],
        );
        fake.on_write("/servers/", |_, body| {
            body["properties"]["userVisibleState"] = json!("Ready");
        });
        let ctx = ResourceContext::new(fake.clone(), SUB);

        let start = Instant::now();
        let state = erase_resource(ServerResource)
            .create(&ctx, config())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));

        assert_eq!(state["id"], ID);
        assert_eq!(state["location"], "westeurope");
        assert_eq!(state["sku_name"], "GP_Gen5_2");
        assert_eq!(state["create_mode"], "Default");
        assert_eq!(state["administrator_login_password"], "H@Sh1CoR3!");

        let put = &fake.requests_to(Method::Put, ID)[0];
        let body = put.body.as_ref().unwrap();
        assert_eq!(body["properties"]["createMode"], "Default");
        assert_eq!(body["properties"]["storageProfile"]["storageMB"], 5120);
        assert_eq!(body["properties"]["storageProfile"]["storageAutogrow"], "Enabled");
        assert_eq!(body["sku"]["tier"], "GeneralPurpose");
        assert!(fake.requests_to(Method::Patch, ID).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_byok_replica_counts_as_ready() {
        let fake = Arc::new(FakeArm::new());
        fake.seed(ID, json!({"location": "westeurope", "sku": {"name": "GP_Gen5_2", "tier": "GeneralPurpose"}}));
        fake.on_write("/servers/pgsrv-replica", |_, body| {
            body["properties"]["userVisibleState"] = json!("Inaccessible");
            body["properties"]["replicationRole"] = json!("Replica");
            body["properties"]["byokEnforcement"] = json!("Enabled");
            body["properties"]["masterServerId"] = json!(ID);
        });
        let ctx = ResourceContext::new(fake.clone(), SUB);

        let mut config = config();
        config["name"] = json!("pgsrv-replica");
        config["create_mode"] = json!("Replica");
        config["creation_source_server_id"] = json!(ID);
        config["public_network_access_enabled"] = json!(false);

        let state = erase_resource(ServerResource)
            .create(&ctx, config)
            .await
            .unwrap();
        assert_eq!(state["create_mode"], "Replica");

        let put = &fake.requests_to(Method::Put, REPLICA)[0];
        assert!(put.body.as_ref().unwrap()["properties"]
            .get("storageProfile")
            .is_none());
        // public network access follows in a separate update
        let patch = &fake.requests_to(Method::Patch, REPLICA)[0];
        assert_eq!(
            patch.body.as_ref().unwrap()["properties"],
            json!({"publicNetworkAccess": "Disabled"})
        );
    }

    #[tokio::test]
    async fn test_threat_policy_round_trip() {
        let fake = fake();
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let mut config = config();
        config["threat_detection_policy"] = json!([{
            "enabled": true,
            "disabled_alerts": ["Sql_Injection", "Data_Exfiltration"],
            "email_addresses": ["dba@example.com"],
            "storage_account_access_key": "secret",
            "storage_endpoint": "https://audit.blob.core.windows.net/",
        }]);

        let state = erase_resource(ServerResource)
            .create(&ctx, config)
            .await
            .unwrap();

        let policy_path = format!("{ID}/securityAlertPolicies/Default");
        let stored = fake.object(&policy_path).unwrap();
        assert_eq!(stored["properties"]["state"], "Enabled");
        assert_eq!(stored["properties"]["storageAccountAccessKey"], "secret");

        let policy = &state["threat_detection_policy"][0];
        assert_eq!(policy["enabled"], true);
        assert_eq!(policy["disabled_alerts"], json!(["Data_Exfiltration", "Sql_Injection"]));
        assert_eq!(policy["storage_account_access_key"], "secret");
    }

    #[tokio::test]
    async fn test_unconfigured_threat_policy_reads_empty() {
        let fake = fake();
        fake.seed(
            ID,
            json!({
                "location": "westeurope",
                "sku": {"name": "GP_Gen5_2", "tier": "GeneralPurpose"},
                "properties": {"userVisibleState": "Ready", "replicationRole": "None"}
            }),
        );
        fake.seed(
            &format!("{ID}/securityAlertPolicies/Default"),
            json!({"properties": {
                "state": "Disabled",
                "disabledAlerts": [""],
                "emailAddresses": [""],
                "emailAccountAdmins": false,
                "storageEndpoint": "",
                "storageAccountAccessKey": "",
                "retentionDays": 0,
            }}),
        );
        let ctx = ResourceContext::new(fake, SUB);

        let state = erase_resource(ServerResource).import(&ctx, ID).await.unwrap();
        assert_eq!(state["threat_detection_policy"], json!([]));
        assert_eq!(state["create_mode"], "Default");
    }

    #[tokio::test]
    async fn test_import_replica_derives_create_mode() {
        let fake = fake();
        fake.seed(
            REPLICA,
            json!({
                "location": "westeurope",
                "sku": {"name": "B_Gen5_1", "tier": "Basic"},
                "properties": {"replicationRole": "Replica", "masterServerId": ID}
            }),
        );
        let ctx = ResourceContext::new(fake.clone(), SUB);

        let state = erase_resource(ServerResource)
            .import(&ctx, REPLICA)
            .await
            .unwrap();
        assert_eq!(state["create_mode"], "Replica");
        assert_eq!(state["creation_source_server_id"], ID);
        // Basic tier skips the threat policy lookup
        assert!(fake
            .requests_to(Method::Get, &format!("{REPLICA}/securityAlertPolicies/Default"))
            .is_empty());
    }

    #[tokio::test]
    async fn test_plan_tier_changes() {
        let fake = fake();
        let ctx = ResourceContext::new(fake, SUB);
        let resource = erase_resource(ServerResource);
        let state = resource.create(&ctx, config()).await.unwrap();

        let mut bigger = config();
        bigger["sku_name"] = json!("GP_Gen5_4");
        assert!(!resource.plan(Some(&state), bigger).unwrap().requires_replace);

        let mut memory = config();
        memory["sku_name"] = json!("MO_Gen5_2");
        assert!(!resource.plan(Some(&state), memory).unwrap().requires_replace);

        let mut basic = config();
        basic["sku_name"] = json!("B_Gen5_2");
        assert!(resource.plan(Some(&state), basic).unwrap().requires_replace);

        let mut replica = config();
        replica["create_mode"] = json!("Replica");
        replica["creation_source_server_id"] = json!(REPLICA);
        assert!(resource.plan(Some(&state), replica).unwrap().requires_replace);
    }

    #[tokio::test]
    async fn test_scale_up_cascades_to_replicas() {
        let fake = fake();
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(ServerResource);
        let state = resource.create(&ctx, config()).await.unwrap();
        fake.seed_list(&format!("{ID}/replicas"), vec![json!({"id": REPLICA})]);
        fake.seed(REPLICA, json!({"sku": {"name": "GP_Gen5_2"}}));

        let mut bigger = config();
        bigger["sku_name"] = json!("GP_Gen5_4");
        let plan = resource.plan(Some(&state), bigger).unwrap();
        let updated = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(updated["sku_name"], "GP_Gen5_4");

        let replica_patch = &fake.requests_to(Method::Patch, REPLICA)[0];
        assert_eq!(replica_patch.body.as_ref().unwrap()["sku"]["name"], "GP_Gen5_4");
        let primary_patch = &fake.requests_to(Method::Patch, ID)[0];
        assert_eq!(
            primary_patch.body.as_ref().unwrap(),
            &json!({"sku": {"name": "GP_Gen5_4", "tier": "GeneralPurpose", "capacity": 4, "family": "Gen5"}})
        );
        assert_eq!(ctx.locks().len(), 1);
    }

    #[tokio::test]
    async fn test_scale_down_skips_replicas() {
        let fake = fake();
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(ServerResource);
        let mut big = config();
        big["sku_name"] = json!("GP_Gen5_8");
        let state = resource.create(&ctx, big).await.unwrap();

        let plan = resource.plan(Some(&state), config()).unwrap();
        resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();
        assert!(fake
            .requests_to(Method::List, &format!("{ID}/replicas"))
            .is_empty());
    }

    #[tokio::test]
    async fn test_promote_replica_updates_password_separately() {
        let fake = fake();
        fake.seed(
            ID,
            json!({"location": "westeurope", "sku": {"name": "GP_Gen5_2", "tier": "GeneralPurpose"},
                   "properties": {"userVisibleState": "Ready"}}),
        );
        fake.seed(
            REPLICA,
            json!({
                "location": "westeurope",
                "sku": {"name": "GP_Gen5_2", "tier": "GeneralPurpose"},
                "properties": {
                    "userVisibleState": "Ready",
                    "replicationRole": "Replica",
                    "masterServerId": ID,
                    "administratorLogin": "psqladmin",
                    "version": "11",
                    "sslEnforcement": "Enabled",
                    "minimalTlsVersion": "TLS1_2",
                    "publicNetworkAccess": "Enabled",
                    "storageProfile": {"storageMB": 5120, "storageAutogrow": "Enabled", "geoRedundantBackup": "Disabled"}
                }
            }),
        );
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(ServerResource);
        let state = resource.import(&ctx, REPLICA).await.unwrap();

        let mut promoted = config();
        promoted["name"] = json!("pgsrv-replica");
        let plan = resource.plan(Some(&state), promoted).unwrap();
        assert!(!plan.requires_replace);
        resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();

        let patches = fake.requests_to(Method::Patch, REPLICA);
        assert_eq!(patches.len(), 2);
        let first = patches[0].body.as_ref().unwrap();
        assert_eq!(first["properties"]["replicationRole"], "None");
        assert!(first["properties"].get("administratorLoginPassword").is_none());
        assert_eq!(
            patches[1].body.as_ref().unwrap(),
            &json!({"properties": {"administratorLoginPassword": "H@Sh1CoR3!"}})
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let fake = fake();
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(ServerResource);
        let state = resource.create(&ctx, config()).await.unwrap();

        resource.delete(&ctx, state.clone()).await.unwrap();
        resource.delete(&ctx, state.clone()).await.unwrap();
        assert!(resource.read(&ctx, state).await.unwrap().is_null());
    }
}
