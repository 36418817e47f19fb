use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::client::FLEXIBLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{FlexibleServerId, IdKind, ResourceId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Block, Diagnostic, NestedBlock, Schema, Validator};
use crate::sdk::{self, FlexibleServer, FlexibleServerForUpdate, FlexibleServerProperties,
    FlexibleServerPropertiesForUpdate, ResourceIdentity, RestartParameter, Sku, Tags,
    UserAssignedIdentity};
use crate::timeouts::Timeouts;

use super::{
    enabled, ensure_absent, is_enabled, location_attribute, non_empty, normalize_location,
    resource_group_attribute, tags_attribute, validate,
};

const DEFAULT_STORAGE_MB: i64 = 32768;
const CREATE_MODES: &[&str] = &["Default", "PointInTimeRestore", "Replica", "GeoRestore", "Update"];
const HA_MODES: &[&str] = &["ZoneRedundant", "SameZone"];
const IDENTITY_TYPES: &[&str] = &["SystemAssigned", "UserAssigned", "SystemAssigned, UserAssigned"];

/// State of `azurerm_postgresql_flexible_server`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexibleServerModel {
    pub id: String,
    pub name: String,
    pub location: String,
    pub resource_group_name: String,
    pub administrator_login: Option<String>,
    pub administrator_password: Option<String>,
    pub authentication: Vec<Authentication>,
    pub sku_name: Option<String>,
    pub auto_grow_enabled: bool,
    pub storage_mb: Option<i64>,
    pub storage_tier: Option<String>,
    pub version: Option<String>,
    pub zone: Option<String>,
    pub create_mode: Option<String>,
    pub delegated_subnet_id: Option<String>,
    pub private_dns_zone_id: Option<String>,
    pub point_in_time_restore_time_in_utc: Option<String>,
    pub source_server_id: Option<String>,
    pub maintenance_window: Vec<MaintenanceWindow>,
    pub backup_retention_days: Option<i64>,
    pub geo_redundant_backup_enabled: bool,
    pub high_availability: Vec<HighAvailability>,
    pub fqdn: Option<String>,
    pub public_network_access_enabled: bool,
    pub replication_role: Option<String>,
    pub identity: Vec<Identity>,
    pub customer_managed_key: Vec<CustomerManagedKey>,
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Authentication {
    pub active_directory_auth_enabled: bool,
    pub password_auth_enabled: bool,
    pub tenant_id: Option<String>,
}

impl Default for Authentication {
    fn default() -> Self {
        Self {
            active_directory_auth_enabled: false,
            password_auth_enabled: true,
            tenant_id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceWindow {
    pub day_of_week: i64,
    pub start_hour: i64,
    pub start_minute: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighAvailability {
    pub mode: String,
    pub standby_availability_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    #[serde(rename = "type")]
    pub kind: String,
    pub identity_ids: Vec<String>,
    pub principal_id: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomerManagedKey {
    pub key_vault_key_id: String,
    pub primary_user_assigned_identity_id: Option<String>,
    pub geo_backup_key_vault_key_id: Option<String>,
    pub geo_backup_user_assigned_identity_id: Option<String>,
}

/// An Azure Database for PostgreSQL flexible server.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexibleServerResource;

/// `GP_Standard_D2s_v3` is tier `GeneralPurpose`, size `Standard_D2s_v3`.
pub(crate) fn expand_sku(sku_name: &str) -> Result<Sku, ProviderError> {
    let (prefix, size) = sku_name.split_once('_').unwrap_or((sku_name, ""));
    let tier = match prefix {
        "B" => "Burstable",
        "GP" => "GeneralPurpose",
        "MO" => "MemoryOptimized",
        other => {
            return Err(ProviderError::Validation(format!(
                "sku_name {sku_name} has unknown sku tier {other}"
            )))
        },
    };
    Ok(Sku {
        name: size.to_string(),
        tier: Some(tier.to_string()),
        ..Default::default()
    })
}

pub(crate) fn flatten_sku(sku: Option<&Sku>) -> Result<Option<String>, ProviderError> {
    let Some(sku) = sku else {
        return Ok(None);
    };
    let prefix = match sku.tier.as_deref() {
        None | Some("") => return Ok(None),
        Some("Burstable") => "B",
        Some("GeneralPurpose") => "GP",
        Some("MemoryOptimized") => "MO",
        Some(other) => {
            return Err(ProviderError::Sdk(format!(
                "sku_name has unknown sku tier {other}"
            )))
        },
    };
    Ok(Some(format!("{prefix}_{}", sku.name)))
}

fn password_auth_enabled(model: &FlexibleServerModel) -> bool {
    model
        .authentication
        .first()
        .map_or(true, |a| a.password_auth_enabled)
}

fn is_default_mode(model: &FlexibleServerModel) -> bool {
    matches!(model.create_mode.as_deref(), None | Some("") | Some("Default"))
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

fn expand_storage(model: &FlexibleServerModel) -> sdk::Storage {
    sdk::Storage {
        storage_size_gb: model.storage_mb.map(|mb| mb / 1024),
        auto_grow: Some(enabled(model.auto_grow_enabled)),
        tier: model.storage_tier.clone(),
    }
}

fn expand_backup(model: &FlexibleServerModel) -> sdk::Backup {
    sdk::Backup {
        backup_retention_days: model.backup_retention_days,
        geo_redundant_backup: Some(enabled(model.geo_redundant_backup_enabled)),
    }
}

fn expand_network(model: &FlexibleServerModel) -> sdk::Network {
    sdk::Network {
        delegated_subnet_resource_id: model.delegated_subnet_id.clone(),
        private_dns_zone_arm_resource_id: model.private_dns_zone_id.clone(),
        public_network_access: Some(enabled(model.public_network_access_enabled)),
    }
}

/// The standby zone can only be chosen at creation.
fn expand_high_availability(blocks: &[HighAvailability], creating: bool) -> sdk::HighAvailability {
    match blocks.first() {
        None => sdk::HighAvailability {
            mode: Some("Disabled".to_string()),
            standby_availability_zone: None,
        },
        Some(ha) => sdk::HighAvailability {
            mode: Some(ha.mode.clone()),
            standby_availability_zone: ha
                .standby_availability_zone
                .clone()
                .filter(|z| creating && !z.is_empty()),
        },
    }
}

fn flatten_high_availability(ha: Option<sdk::HighAvailability>) -> Vec<HighAvailability> {
    match ha {
        Some(sdk::HighAvailability {
            mode: Some(mode),
            standby_availability_zone,
        }) if mode != "Disabled" => vec![HighAvailability {
            mode,
            standby_availability_zone,
        }],
        _ => Vec::new(),
    }
}

/// No window means the system-managed schedule.
fn expand_maintenance_window(blocks: &[MaintenanceWindow]) -> sdk::MaintenanceWindow {
    match blocks.first() {
        None => sdk::MaintenanceWindow {
            custom_window: Some("Disabled".to_string()),
            ..Default::default()
        },
        Some(w) => sdk::MaintenanceWindow {
            custom_window: Some("Enabled".to_string()),
            start_hour: Some(w.start_hour),
            start_minute: Some(w.start_minute),
            day_of_week: Some(w.day_of_week),
        },
    }
}

fn flatten_maintenance_window(window: Option<sdk::MaintenanceWindow>) -> Vec<MaintenanceWindow> {
    match window {
        Some(w) if is_enabled(w.custom_window.as_deref()) => vec![MaintenanceWindow {
            day_of_week: w.day_of_week.unwrap_or_default(),
            start_hour: w.start_hour.unwrap_or_default(),
            start_minute: w.start_minute.unwrap_or_default(),
        }],
        _ => Vec::new(),
    }
}

fn expand_auth_config(blocks: &[Authentication]) -> Option<sdk::AuthConfig> {
    blocks.first().map(|a| sdk::AuthConfig {
        active_directory_auth: Some(enabled(a.active_directory_auth_enabled)),
        password_auth: Some(enabled(a.password_auth_enabled)),
        tenant_id: a.tenant_id.clone(),
    })
}

fn flatten_auth_config(config: sdk::AuthConfig) -> Authentication {
    Authentication {
        active_directory_auth_enabled: is_enabled(config.active_directory_auth.as_deref()),
        // Absent means enabled.
        password_auth_enabled: config
            .password_auth
            .as_deref()
            .map_or(true, |v| is_enabled(Some(v))),
        tenant_id: config.tenant_id,
    }
}

fn expand_data_encryption(blocks: &[CustomerManagedKey]) -> Option<sdk::DataEncryption> {
    blocks.first().map(|k| sdk::DataEncryption {
        kind: Some("AzureKeyVault".to_string()),
        primary_key_uri: non_empty(&k.key_vault_key_id),
        primary_user_assigned_identity_id: k.primary_user_assigned_identity_id.clone(),
        geo_backup_key_uri: k.geo_backup_key_vault_key_id.clone(),
        geo_backup_user_assigned_identity_id: k.geo_backup_user_assigned_identity_id.clone(),
    })
}

fn flatten_data_encryption(encryption: Option<sdk::DataEncryption>) -> Vec<CustomerManagedKey> {
    match encryption {
        Some(e) if e.kind.as_deref() == Some("AzureKeyVault") => vec![CustomerManagedKey {
            key_vault_key_id: e.primary_key_uri.unwrap_or_default(),
            primary_user_assigned_identity_id: e.primary_user_assigned_identity_id,
            geo_backup_key_vault_key_id: e.geo_backup_key_uri,
            geo_backup_user_assigned_identity_id: e.geo_backup_user_assigned_identity_id,
        }],
        _ => Vec::new(),
    }
}

fn expand_identity(blocks: &[Identity]) -> Option<ResourceIdentity> {
    let identity = blocks.first()?;
    let user_assigned = (!identity.identity_ids.is_empty()).then(|| {
        identity
            .identity_ids
            .iter()
            .map(|id| (id.clone(), UserAssignedIdentity::default()))
            .collect()
    });
    Some(ResourceIdentity {
        kind: identity.kind.replace(' ', ""),
        user_assigned_identities: user_assigned,
        ..Default::default()
    })
}

fn flatten_identity(identity: Option<ResourceIdentity>) -> Vec<Identity> {
    let Some(identity) = identity.filter(|i| !i.kind.is_empty() && i.kind != "None") else {
        return Vec::new();
    };
    let kind = match identity.kind.as_str() {
        "SystemAssigned,UserAssigned" => "SystemAssigned, UserAssigned".to_string(),
        other => other.to_string(),
    };
    vec![Identity {
        kind,
        identity_ids: identity
            .user_assigned_identities
            .map(|ids| ids.into_keys().collect())
            .unwrap_or_default(),
        principal_id: identity.principal_id,
        tenant_id: identity.tenant_id,
    }]
}

/// Fill in the storage tier for `planned.storage_mb`, or reject a tier the size
/// does not support. Returns whether the storage shrank.
fn plan_storage(
    prior: Option<&FlexibleServerModel>,
    planned: &mut FlexibleServerModel,
) -> Result<bool, ProviderError> {
    let old_mb = prior.and_then(|p| p.storage_mb);
    let old_tier = prior.and_then(|p| p.storage_tier.clone());
    if old_mb.is_none() && old_tier.is_none() && planned.storage_mb.is_none() && planned.storage_tier.is_none() {
        return Ok(false);
    }

    let shrinks = matches!((old_mb, planned.storage_mb), (Some(old), Some(new)) if old > new);
    let mb = planned.storage_mb.or(old_mb).unwrap_or(DEFAULT_STORAGE_MB);
    let Some(tiers) = validate::storage_tiers(mb) else {
        return Ok(shrinks);
    };

    let configured = planned.storage_tier.clone();
    let tier = configured
        .clone()
        .or(old_tier)
        .unwrap_or_else(|| tiers.default.to_string());
    if tiers.accepts(&tier) {
        if prior.is_none() {
            planned.storage_tier = Some(tier);
        }
        return Ok(shrinks);
    }
    if configured.is_none() {
        debug!(%tier, new = tiers.default, "storage tier not valid for the new size, using default");
        planned.storage_tier = Some(tiers.default.to_string());
        return Ok(shrinks);
    }
    Err(ProviderError::Validation(format!(
        "invalid 'storage_tier' {tier:?} for defined 'storage_mb' size '{mb}', expected one of [{}]",
        tiers.valid.join(", ")
    )))
}

impl FlexibleServerResource {
    async fn fetch(
        &self,
        ctx: &ResourceContext,
        id: &FlexibleServerId,
    ) -> Result<Option<FlexibleServer>, ProviderError> {
        ctx.client::<FlexibleServer>(FLEXIBLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))
    }

    async fn patch(
        &self,
        ctx: &ResourceContext,
        id: &FlexibleServerId,
        update: FlexibleServerForUpdate,
        what: &str,
    ) -> Result<(), ProviderError> {
        ctx.client::<FlexibleServer>(FLEXIBLE_SERVER_API_VERSION)
            .patch(&id.id(), &update)
            .await
            .map_err(|e| e.context(format!("updating {what} for {id}")))
    }

    /// Zone changes are only possible by swapping with the standby zone, which
    /// the service does through a planned failover. Returns whether one is due.
    async fn check_zone_change(
        &self,
        ctx: &ResourceContext,
        id: &FlexibleServerId,
        prior: &FlexibleServerModel,
        planned: &FlexibleServerModel,
    ) -> Result<bool, ProviderError> {
        let standby = |m: &FlexibleServerModel| {
            m.high_availability
                .first()
                .and_then(|ha| ha.standby_availability_zone.clone())
        };
        let zone_changed = prior.zone != planned.zone;
        let standby_changed = standby(prior) != standby(planned);
        if !zone_changed && prior.high_availability == planned.high_availability {
            return Ok(false);
        }

        let current = self
            .fetch(ctx, id)
            .await?
            .and_then(|s| s.properties)
            .unwrap_or_default();
        let current_ha = current.high_availability.unwrap_or_default();

        if zone_changed {
            let swap_error = || {
                ProviderError::Validation(
                    "`zone` can only be changed when exchanged with the zone specified in `high_availability.0.standby_availability_zone`".to_string(),
                )
            };
            if !standby_changed {
                return Err(swap_error());
            }
            let (Some(zone), Some(standby_zone)) =
                (current.availability_zone, current_ha.standby_availability_zone)
            else {
                return Ok(false);
            };
            if planned.zone.as_deref() == Some(standby_zone.as_str())
                && standby(planned).as_deref() == Some(zone.as_str())
            {
                return Ok(true);
            }
            return Err(swap_error());
        }

        let mode_changed = prior.high_availability.first().map(|ha| &ha.mode)
            != planned.high_availability.first().map(|ha| &ha.mode);
        if standby_changed && current_ha.mode.as_deref() == Some("ZoneRedundant") && !mode_changed {
            return Err(ProviderError::Validation(
                "an existing `high_availability.0.standby_availability_zone` can only be changed when exchanged with the zone specified in `zone`".to_string(),
            ));
        }
        Ok(false)
    }
}

#[async_trait]
impl Resource for FlexibleServerResource {
    type Model = FlexibleServerModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_flexible_server"
    }

    fn schema(&self) -> Schema {
        let authentication = Block::new()
            .with_attribute(
                "active_directory_auth_enabled",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "password_auth_enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute(
                "tenant_id",
                Attribute::optional_string()
                    .with_validator(Validator::IsUuid)
                    .with_required_with(&["authentication.0.active_directory_auth_enabled"]),
            );

        let maintenance_window = Block::new()
            .with_attribute(
                "day_of_week",
                Attribute::optional_int64()
                    .with_default(json!(0))
                    .with_validator(Validator::int_between(0, 6)),
            )
            .with_attribute(
                "start_hour",
                Attribute::optional_int64()
                    .with_default(json!(0))
                    .with_validator(Validator::int_between(0, 23)),
            )
            .with_attribute(
                "start_minute",
                Attribute::optional_int64()
                    .with_default(json!(0))
                    .with_validator(Validator::int_between(0, 59)),
            );

        let high_availability = Block::new()
            .with_attribute(
                "mode",
                Attribute::required_string().with_validator(Validator::one_of(HA_MODES)),
            )
            .with_attribute(
                "standby_availability_zone",
                Attribute::optional_string().with_validator(Validator::StringNotEmpty),
            );

        let identity = Block::new()
            .with_attribute(
                "type",
                Attribute::required_string().with_validator(Validator::one_of(IDENTITY_TYPES)),
            )
            .with_attribute(
                "identity_ids",
                Attribute::optional_string_set()
                    .with_validator(Validator::resource_id(IdKind::UserAssignedIdentity)),
            )
            .with_attribute("principal_id", Attribute::computed_string())
            .with_attribute("tenant_id", Attribute::computed_string());

        let customer_managed_key = Block::new()
            .with_attribute(
                "key_vault_key_id",
                Attribute::required_string()
                    .with_validator(Validator::KeyVaultKeyUrl { versioned: false })
                    .with_required_with(&[
                        "identity",
                        "customer_managed_key.0.primary_user_assigned_identity_id",
                    ]),
            )
            .with_attribute(
                "primary_user_assigned_identity_id",
                Attribute::optional_string()
                    .with_validator(Validator::resource_id(IdKind::UserAssignedIdentity)),
            )
            .with_attribute(
                "geo_backup_key_vault_key_id",
                Attribute::optional_string()
                    .with_validator(Validator::KeyVaultKeyUrl { versioned: false })
                    .with_required_with(&[
                        "identity",
                        "customer_managed_key.0.geo_backup_user_assigned_identity_id",
                    ]),
            )
            .with_attribute(
                "geo_backup_user_assigned_identity_id",
                Attribute::optional_string()
                    .with_validator(Validator::resource_id(IdKind::UserAssignedIdentity)),
            );

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
                "administrator_login",
                Attribute::optional_computed_string()
                    .with_validator(Validator::StringNotWhitespace)
                    .with_validator(Validator::AdminUsername),
            )
            .with_attribute(
                "administrator_password",
                Attribute::optional_string()
                    .sensitive()
                    .with_validator(Validator::StringNotEmpty),
            )
            .with_attribute(
                "sku_name",
                Attribute::optional_computed_string()
                    .with_validator(validate::flexible_server_sku_name()),
            )
            .with_attribute(
                "auto_grow_enabled",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "storage_mb",
                Attribute::optional_computed_int64().with_validator(Validator::IntInSlice {
                    values: validate::FLEXIBLE_STORAGE_MB.to_vec(),
                }),
            )
            .with_attribute(
                "storage_tier",
                Attribute::optional_computed_string()
                    .with_validator(Validator::one_of(validate::STORAGE_TIERS)),
            )
            .with_attribute(
                "version",
                Attribute::optional_computed_string()
                    .with_validator(Validator::one_of(validate::FLEXIBLE_SERVER_VERSIONS)),
            )
            .with_attribute(
                "zone",
                Attribute::optional_computed_string().with_validator(Validator::StringNotEmpty),
            )
            .with_attribute(
                "create_mode",
                Attribute::optional_string().with_validator(Validator::one_of(CREATE_MODES)),
            )
            .with_attribute(
                "delegated_subnet_id",
                Attribute::optional_string()
                    .with_force_new()
                    .with_validator(Validator::resource_id(IdKind::Subnet)),
            )
            .with_attribute(
                "private_dns_zone_id",
                Attribute::optional_computed_string()
                    .with_validator(Validator::resource_id(IdKind::PrivateDnsZone)),
            )
            .with_attribute(
                "point_in_time_restore_time_in_utc",
                Attribute::optional_string()
                    .with_force_new()
                    .with_validator(Validator::IsRfc3339Time),
            )
            .with_attribute(
                "source_server_id",
                Attribute::optional_string()
                    .with_force_new()
                    .with_validator(Validator::resource_id(IdKind::FlexibleServer)),
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
            .with_attribute("fqdn", Attribute::computed_string())
            .with_attribute(
                "public_network_access_enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute(
                "replication_role",
                Attribute::optional_string().with_validator(Validator::one_of(&["None"])),
            )
            .with_attribute("tags", tags_attribute())
            .with_block(
                "authentication",
                NestedBlock::list(authentication).with_max_items(1),
            )
            .with_block(
                "maintenance_window",
                NestedBlock::list(maintenance_window).with_max_items(1),
            )
            .with_block(
                "high_availability",
                NestedBlock::list(high_availability).with_max_items(1),
            )
            .with_block("identity", NestedBlock::list(identity).with_max_items(1))
            .with_block(
                "customer_managed_key",
                NestedBlock::list(customer_managed_key)
                    .with_max_items(1)
                    .with_force_new(),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        FlexibleServerId::parse(id).map(drop).map_err(Into::into)
    }

    fn validate_model(&self, model: &FlexibleServerModel) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut require = |set: bool, attribute: &str, condition: &str| {
            if !set {
                diagnostics.push(
                    Diagnostic::error(format!("`{attribute}` is required when {condition}"))
                        .with_attribute(attribute),
                );
            }
        };

        match model.create_mode.as_deref() {
            Some(mode @ ("PointInTimeRestore" | "GeoRestore")) => {
                let condition = format!("`create_mode` is `{mode}`");
                require(is_set(&model.source_server_id), "source_server_id", &condition);
                require(
                    is_set(&model.point_in_time_restore_time_in_utc),
                    "point_in_time_restore_time_in_utc",
                    &condition,
                );
            },
            Some("Replica") => {
                require(
                    is_set(&model.source_server_id),
                    "source_server_id",
                    "`create_mode` is `Replica`",
                );
            },
            _ if is_default_mode(model) => {
                if password_auth_enabled(model) {
                    let condition = "`create_mode` is `Default` and `authentication.password_auth_enabled` is `true`";
                    require(is_set(&model.administrator_login), "administrator_login", condition);
                    require(
                        is_set(&model.administrator_password),
                        "administrator_password",
                        condition,
                    );
                }
                require(is_set(&model.sku_name), "sku_name", "`create_mode` is `Default`");
                require(is_set(&model.version), "version", "`create_mode` is `Default`");
            },
            _ => {},
        }

        if let Some(identity) = model.identity.first() {
            if identity.kind.contains("UserAssigned") && identity.identity_ids.is_empty() {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "`identity_ids` must be set when `type` is `{}`",
                        identity.kind
                    ))
                    .with_attribute("identity.0.identity_ids"),
                );
            }
        }
        diagnostics
    }

    fn customize_plan(
        &self,
        prior: Option<&FlexibleServerModel>,
        planned: &mut FlexibleServerModel,
    ) -> Result<Vec<String>, ProviderError> {
        planned.location = normalize_location(&planned.location);
        for identity in &mut planned.identity {
            identity.identity_ids.sort();
            identity.identity_ids.dedup();
        }

        let mut forced = Vec::new();
        if plan_storage(prior, planned)? {
            forced.push("storage_mb".to_string());
        }
        let Some(prior) = prior else {
            return Ok(forced);
        };

        if let (Some(before), Some(after)) = (prior.identity.first(), planned.identity.first_mut()) {
            if before.kind == after.kind {
                after.principal_id.clone_from(&before.principal_id);
                after.tenant_id.clone_from(&before.tenant_id);
            }
        }
        // The service fills these in when they are not configured.
        if planned.authentication.is_empty() {
            planned.authentication.clone_from(&prior.authentication);
        }
        if let (Some(before), Some(after)) = (
            prior.high_availability.first(),
            planned.high_availability.first_mut(),
        ) {
            if after.standby_availability_zone.is_none() && before.mode == after.mode {
                after
                    .standby_availability_zone
                    .clone_from(&before.standby_availability_zone);
            }
        }
        if let (Some(before), Some(after)) = (&prior.private_dns_zone_id, &planned.private_dns_zone_id) {
            if before.eq_ignore_ascii_case(after) {
                planned.private_dns_zone_id = Some(before.clone());
            }
        }

        let major = |v: &Option<String>| v.as_deref().and_then(|v| v.parse::<i64>().ok());
        if let (Some(old), Some(new)) = (major(&prior.version), major(&planned.version)) {
            if old > new {
                forced.push("version".to_string());
            }
        }
        if is_set(&prior.administrator_login) {
            forced.push("administrator_login".to_string());
        }
        Ok(forced)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: FlexibleServerModel,
    ) -> Result<FlexibleServerModel, ProviderError> {
        let id = FlexibleServerId::new(ctx.subscription_id(), &model.resource_group_name, &model.name);
        let existing = self
            .fetch(ctx, &id)
            .await
            .map_err(|e| e.context("checking for presence of existing server"))?;
        ensure_absent(existing, self.type_name(), &id.id())?;

        if is_set(&model.replication_role) {
            return Err(ProviderError::Validation(
                "`replication_role` cannot be set while creating".to_string(),
            ));
        }
        if is_default_mode(&model)
            && !password_auth_enabled(&model)
            && (is_set(&model.administrator_login) || is_set(&model.administrator_password))
        {
            return Err(ProviderError::Validation(
                "`administrator_login` and `administrator_password` cannot be set during creation when `authentication.password_auth_enabled` is set to `false`".to_string(),
            ));
        }

        let sku = model
            .sku_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(expand_sku)
            .transpose()
            .map_err(|e| e.context(format!("expanding `sku_name` for {id}")))?;

        let mut storage = expand_storage(&model);
        let storage_mb = match storage.storage_size_gb {
            Some(gb) if gb > 0 => gb * 1024,
            _ => {
                storage.storage_size_gb = Some(DEFAULT_STORAGE_MB / 1024);
                DEFAULT_STORAGE_MB
            },
        };
        if storage.tier.as_deref().map_or(true, str::is_empty) {
            storage.tier = validate::storage_tiers(storage_mb).map(|t| t.default.to_string());
        }

        let body = FlexibleServer {
            location: normalize_location(&model.location),
            sku,
            identity: expand_identity(&model.identity),
            tags: (!model.tags.is_empty()).then(|| model.tags.clone()),
            properties: Some(FlexibleServerProperties {
                administrator_login: model.administrator_login.clone().filter(|v| !v.is_empty()),
                administrator_login_password: model
                    .administrator_password
                    .clone()
                    .filter(|v| !v.is_empty()),
                version: model.version.clone().filter(|v| !v.is_empty()),
                storage: Some(storage),
                auth_config: expand_auth_config(&model.authentication),
                data_encryption: expand_data_encryption(&model.customer_managed_key),
                backup: Some(expand_backup(&model)),
                network: Some(expand_network(&model)),
                high_availability: Some(expand_high_availability(&model.high_availability, true)),
                source_server_resource_id: model.source_server_id.clone().filter(|v| !v.is_empty()),
                point_in_time_utc: model
                    .point_in_time_restore_time_in_utc
                    .clone()
                    .filter(|v| !v.is_empty()),
                availability_zone: model.zone.clone().filter(|v| !v.is_empty()),
                create_mode: model.create_mode.clone().filter(|v| !v.is_empty()),
                ..Default::default()
            }),
            ..Default::default()
        };

        info!(%id, "creating flexible server");
        ctx.client::<FlexibleServer>(FLEXIBLE_SERVER_API_VERSION)
            .put(&id.id(), &body)
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;

        // The maintenance window can only be set on an existing server.
        if !model.maintenance_window.is_empty() {
            let update = FlexibleServerForUpdate {
                properties: Some(FlexibleServerPropertiesForUpdate {
                    maintenance_window: Some(expand_maintenance_window(&model.maintenance_window)),
                    ..Default::default()
                }),
                ..Default::default()
            };
            self.patch(ctx, &id, update, "`maintenance_window`").await?;
        }

        let model = FlexibleServerModel {
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
        model: FlexibleServerModel,
    ) -> Result<Option<FlexibleServerModel>, ProviderError> {
        let id = FlexibleServerId::parse(&model.id)?;
        let Some(server) = self.fetch(ctx, &id).await? else {
            debug!(%id, "flexible server not found");
            return Ok(None);
        };

        let sku_name = flatten_sku(server.sku.as_ref())
            .map_err(|e| e.context(format!("flattening `sku_name` for {id}")))?;
        let props = server.properties.unwrap_or_default();
        let network = props.network.unwrap_or_default();
        let storage = props.storage.unwrap_or_default();
        let backup = props.backup.unwrap_or_default();

        Ok(Some(FlexibleServerModel {
            id: id.id(),
            name: id.flexible_server_name,
            resource_group_name: id.resource_group_name,
            location: normalize_location(&server.location),
            administrator_login: props.administrator_login,
            zone: props.availability_zone,
            version: props.version,
            fqdn: props.fully_qualified_domain_name,
            public_network_access_enabled: is_enabled(network.public_network_access.as_deref()),
            delegated_subnet_id: network.delegated_subnet_resource_id,
            private_dns_zone_id: network.private_dns_zone_arm_resource_id,
            maintenance_window: flatten_maintenance_window(props.maintenance_window),
            auto_grow_enabled: is_enabled(storage.auto_grow.as_deref()),
            storage_mb: storage.storage_size_gb.map(|gb| gb * 1024),
            storage_tier: storage.tier,
            backup_retention_days: backup.backup_retention_days,
            geo_redundant_backup_enabled: is_enabled(backup.geo_redundant_backup.as_deref()),
            high_availability: flatten_high_availability(props.high_availability),
            authentication: props
                .auth_config
                .map(flatten_auth_config)
                .into_iter()
                .collect(),
            customer_managed_key: flatten_data_encryption(props.data_encryption),
            identity: flatten_identity(server.identity),
            sku_name,
            tags: server.tags.unwrap_or_default(),
            ..model
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: FlexibleServerModel,
        planned: FlexibleServerModel,
    ) -> Result<FlexibleServerModel, ProviderError> {
        let id = FlexibleServerId::parse(&planned.id)?;
        let mut props = FlexibleServerPropertiesForUpdate::default();
        let mut update = FlexibleServerForUpdate::default();

        // Setting a login for the first time goes through a `createMode = Update` PUT.
        let login_changed = prior.administrator_login != planned.administrator_login;
        let update_login = is_default_mode(&planned) && login_changed;
        if update_login && is_set(&planned.administrator_login) && !password_auth_enabled(&planned) {
            return Err(ProviderError::Validation(
                "when `administrator_login` is first set, `authentication.password_auth_enabled` must be set to `true`".to_string(),
            ));
        }

        if prior.private_dns_zone_id != planned.private_dns_zone_id
            || prior.public_network_access_enabled != planned.public_network_access_enabled
        {
            props.network = Some(expand_network(&planned));
        }

        let failover = self.check_zone_change(ctx, &id, &prior, &planned).await?;

        if prior.replication_role != planned.replication_role {
            if planned.create_mode.as_deref() != Some("Replica")
                || planned.replication_role.as_deref() != Some("None")
            {
                return Err(ProviderError::Validation(
                    "`replication_role` only can be updated to `None` for replica server".to_string(),
                ));
            }
            info!(%id, "promoting replica");
            let promote = FlexibleServerForUpdate {
                properties: Some(FlexibleServerPropertiesForUpdate {
                    replication_role: Some("None".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            self.patch(ctx, &id, promote, "`replication_role`").await?;
        }

        if prior.administrator_password != planned.administrator_password {
            props.administrator_login_password = planned.administrator_password.clone();
        }
        if prior.authentication != planned.authentication {
            props.auth_config = expand_auth_config(&planned.authentication);
        }

        // Storage changes are rejected when combined with other properties.
        if prior.auto_grow_enabled != planned.auto_grow_enabled
            || prior.storage_mb != planned.storage_mb
            || prior.storage_tier != planned.storage_tier
        {
            let storage = FlexibleServerForUpdate {
                properties: Some(FlexibleServerPropertiesForUpdate {
                    storage: Some(expand_storage(&planned)),
                    ..Default::default()
                }),
                ..Default::default()
            };
            self.patch(ctx, &id, storage, "`auto_grow_enabled` / `storage_mb`")
                .await?;
        }

        if prior.backup_retention_days != planned.backup_retention_days {
            props.backup = Some(expand_backup(&planned));
        }
        if prior.maintenance_window != planned.maintenance_window {
            props.maintenance_window = Some(expand_maintenance_window(&planned.maintenance_window));
        }
        if prior.high_availability != planned.high_availability {
            props.high_availability = Some(expand_high_availability(&planned.high_availability, false));
        }
        if prior.create_mode != planned.create_mode {
            props.create_mode = planned.create_mode.clone();
        }
        if prior.version != planned.version {
            props.version = planned.version.clone();
        }
        if prior.sku_name != planned.sku_name {
            if let Some(sku_name) = planned.sku_name.as_deref().filter(|s| !s.is_empty()) {
                update.sku = Some(
                    expand_sku(sku_name)
                        .map_err(|e| e.context(format!("expanding `sku_name` for {id}")))?,
                );
            }
        }
        if prior.tags != planned.tags {
            update.tags = Some(planned.tags.clone());
        }
        if prior.identity != planned.identity {
            update.identity = Some(expand_identity(&planned.identity).unwrap_or_else(|| {
                ResourceIdentity {
                    kind: "None".to_string(),
                    ..Default::default()
                }
            }));
        }

        if update_login {
            info!(%id, "updating administrator login");
            let body = FlexibleServer {
                location: normalize_location(&planned.location),
                properties: Some(FlexibleServerProperties {
                    create_mode: Some("Update".to_string()),
                    auth_config: expand_auth_config(&planned.authentication),
                    administrator_login: planned.administrator_login.clone(),
                    administrator_login_password: planned.administrator_password.clone(),
                    network: Some(expand_network(&planned)),
                    ..Default::default()
                }),
                ..Default::default()
            };
            ctx.client::<FlexibleServer>(FLEXIBLE_SERVER_API_VERSION)
                .put(&id.id(), &body)
                .await
                .map_err(|e| e.context(format!("updating administrator login for {id}")))?;
        }

        if !props.is_empty() {
            update.properties = Some(props);
        }
        if update != FlexibleServerForUpdate::default() {
            info!(%id, "updating flexible server");
            ctx.client::<FlexibleServer>(FLEXIBLE_SERVER_API_VERSION)
                .patch(&id.id(), &update)
                .await
                .map_err(|e| e.context(format!("updating {id}")))?;
        }

        if failover {
            info!(%id, "failing over to the standby zone");
            let body = serde_json::to_value(RestartParameter::planned_failover())?;
            ctx.arm()
                .post(&format!("{}/restart", id.id()), FLEXIBLE_SERVER_API_VERSION, &body)
                .await
                .map_err(|e| e.context(format!("failing over {id}")))?;
        }

        self.read(ctx, planned)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found after update")))
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        model: FlexibleServerModel,
    ) -> Result<(), ProviderError> {
        let id = FlexibleServerId::parse(&model.id)?;
        info!(%id, "deleting flexible server");
        ctx.client::<FlexibleServer>(FLEXIBLE_SERVER_API_VERSION)
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

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/flexibleServers/flex";

    fn config() -> serde_json::Value {
        json!({
            "name": "flex",
            "location": "West Europe",
            "resource_group_name": "rg",
            "sku_name": "GP_Standard_D2s_v3",
            "version": "16",
            "administrator_login": "psqladmin",
            "administrator_password": "H@Sh1CoR3!",
        })
    }

    async fn created(config: serde_json::Value) -> (Arc<FakeArm>, ResourceContext, serde_json::Value) {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let state = erase_resource(FlexibleServerResource)
            .create(&ctx, config)
            .await
            .unwrap();
        (fake, ctx, state)
    }

    #[test]
    fn test_sku_round_trip() {
        let sku = expand_sku("GP_Standard_D2s_v3").unwrap();
        assert_eq!(sku.name, "Standard_D2s_v3");
        assert_eq!(sku.tier.as_deref(), Some("GeneralPurpose"));
        assert_eq!(
            flatten_sku(Some(&sku)).unwrap().as_deref(),
            Some("GP_Standard_D2s_v3")
        );

        let burstable = expand_sku("B_Standard_B1ms").unwrap();
        assert_eq!(burstable.tier.as_deref(), Some("Burstable"));
        assert!(expand_sku("XL_Standard_D2s_v3").is_err());
        assert_eq!(flatten_sku(None).unwrap(), None);
    }

    #[test]
    fn test_validate_create_modes() {
        let resource = erase_resource(FlexibleServerResource);
        assert!(resource.validate(&config()).is_empty());

        let mut no_password = config();
        no_password["administrator_password"] = serde_json::Value::Null;
        assert!(resource
            .validate(&no_password)
            .iter()
            .any(|d| d.attribute.as_deref() == Some("administrator_password")));

        let mut entra_only = config();
        entra_only["administrator_login"] = serde_json::Value::Null;
        entra_only["administrator_password"] = serde_json::Value::Null;
        entra_only["authentication"] = json!([{
            "active_directory_auth_enabled": true,
            "password_auth_enabled": false,
            "tenant_id": "72f988bf-86f1-41af-91ab-2d7cd011db47",
        }]);
        assert!(resource.validate(&entra_only).is_empty());

        let restore = json!({
            "name": "flex-restore",
            "location": "westeurope",
            "resource_group_name": "rg",
            "create_mode": "PointInTimeRestore",
            "source_server_id": ID,
        });
        assert!(resource
            .validate(&restore)
            .iter()
            .any(|d| d.attribute.as_deref() == Some("point_in_time_restore_time_in_utc")));
    }

    #[tokio::test]
    async fn test_create_defaults_storage_and_sets_maintenance_window() {
        let mut config = config();
        config["maintenance_window"] = json!([{"day_of_week": 0, "start_hour": 3}]);
        let (fake, _ctx, state) = created(config).await;

        let put = &fake.requests_to(Method::Put, ID)[0];
        let body = put.body.as_ref().unwrap();
        assert_eq!(body["location"], "westeurope");
        assert_eq!(body["sku"], json!({"name": "Standard_D2s_v3", "tier": "GeneralPurpose"}));
        assert_eq!(
            body["properties"]["storage"],
            json!({"storageSizeGB": 32, "autoGrow": "Disabled", "tier": "P4"})
        );
        assert_eq!(body["properties"]["highAvailability"], json!({"mode": "Disabled"}));
        assert!(body["properties"].get("maintenanceWindow").is_none());

        let patch = &fake.requests_to(Method::Patch, ID)[0];
        assert_eq!(
            patch.body.as_ref().unwrap()["properties"]["maintenanceWindow"],
            json!({"customWindow": "Enabled", "startHour": 3, "startMinute": 0, "dayOfWeek": 0})
        );

        assert_eq!(state["id"], ID);
        assert_eq!(state["sku_name"], "GP_Standard_D2s_v3");
        assert_eq!(state["storage_mb"], 32768);
        assert_eq!(state["storage_tier"], "P4");
        assert_eq!(state["maintenance_window"][0]["start_hour"], 3);
        assert_eq!(state["administrator_password"], "H@Sh1CoR3!");
    }

    #[tokio::test]
    async fn test_replication_role_cannot_be_set_on_create() {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let mut config = config();
        config["replication_role"] = json!("None");

        let err = erase_resource(FlexibleServerResource)
            .create(&ctx, config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(fake.requests_to(Method::Put, ID).is_empty());
    }

    #[tokio::test]
    async fn test_plan_storage_tiers() {
        let (_fake, _ctx, state) = created(config()).await;
        let resource = erase_resource(FlexibleServerResource);

        // P4 is too small for 1 TiB, so the unconfigured tier follows the size.
        let mut grow = config();
        grow["storage_mb"] = json!(1048576);
        let plan = resource.plan(Some(&state), grow.clone()).unwrap();
        assert!(!plan.requires_replace);
        assert_eq!(plan.planned_state["storage_tier"], "P30");

        grow["storage_tier"] = json!("P4");
        let err = resource.plan(Some(&state), grow).unwrap_err();
        assert!(err.to_string().contains("storage_tier"));

        let mut big = config();
        big["storage_mb"] = json!(65536);
        let big_state = created(big).await.2;
        let mut shrink = config();
        shrink["storage_mb"] = json!(32768);
        assert!(resource.plan(Some(&big_state), shrink).unwrap().requires_replace);
    }

    #[tokio::test]
    async fn test_plan_version_changes() {
        let (_fake, _ctx, state) = created(config()).await;
        let resource = erase_resource(FlexibleServerResource);

        let mut older = config();
        older["version"] = json!("15");
        assert!(resource.plan(Some(&state), older).unwrap().requires_replace);

        let mut login = config();
        login["administrator_login"] = json!("dbowner");
        assert!(resource.plan(Some(&state), login).unwrap().requires_replace);
    }

    #[tokio::test]
    async fn test_storage_is_updated_separately() {
        let (fake, ctx, state) = created(config()).await;
        let resource = erase_resource(FlexibleServerResource);

        let mut changed = config();
        changed["auto_grow_enabled"] = json!(true);
        changed["sku_name"] = json!("GP_Standard_D4s_v3");
        changed["version"] = json!("16");
        let plan = resource.plan(Some(&state), changed).unwrap();
        assert!(!plan.requires_replace);
        let updated = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();

        let patches = fake.requests_to(Method::Patch, ID);
        assert_eq!(patches.len(), 2);
        assert_eq!(
            patches[0].body.as_ref().unwrap(),
            &json!({"properties": {"storage": {"storageSizeGB": 32, "autoGrow": "Enabled", "tier": "P4"}}})
        );
        assert_eq!(
            patches[1].body.as_ref().unwrap(),
            &json!({"sku": {"name": "Standard_D4s_v3", "tier": "GeneralPurpose"}})
        );
        assert_eq!(updated["auto_grow_enabled"], true);
        assert_eq!(updated["sku_name"], "GP_Standard_D4s_v3");
    }

    #[tokio::test]
    async fn test_zone_swap_fails_over() {
        let mut config = config();
        config["zone"] = json!("1");
        config["high_availability"] = json!([{"mode": "ZoneRedundant", "standby_availability_zone": "2"}]);
        let (fake, ctx, state) = created(config.clone()).await;
        let resource = erase_resource(FlexibleServerResource);

        let mut swapped = config.clone();
        swapped["zone"] = json!("2");
        swapped["high_availability"] = json!([{"mode": "ZoneRedundant", "standby_availability_zone": "1"}]);
        let plan = resource.plan(Some(&state), swapped).unwrap();
        resource
            .update(&ctx, state.clone(), plan.planned_state)
            .await
            .unwrap();

        let restarts = fake.requests_to(Method::Post, &format!("{ID}/restart"));
        assert_eq!(restarts.len(), 1);
        assert_eq!(
            restarts[0].body.as_ref().unwrap(),
            &json!({"restartWithFailover": true, "failoverMode": "PlannedFailover"})
        );
        // the standby zone is never sent on update
        let patch = &fake.requests_to(Method::Patch, ID)[0];
        assert_eq!(
            patch.body.as_ref().unwrap()["properties"]["highAvailability"],
            json!({"mode": "ZoneRedundant"})
        );

        let mut moved = config;
        moved["zone"] = json!("3");
        let plan = resource.plan(Some(&state), moved).unwrap();
        let err = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("standby_availability_zone"));
    }

    #[tokio::test]
    async fn test_replica_promotion() {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(FlexibleServerResource);
        let replica_id = format!("{ID}-replica");
        let replica = json!({
            "name": "flex-replica",
            "location": "westeurope",
            "resource_group_name": "rg",
            "create_mode": "Replica",
            "source_server_id": ID,
        });
        let state = resource.create(&ctx, replica.clone()).await.unwrap();
        assert_eq!(state["id"], replica_id.as_str());

        let mut promoted = replica;
        promoted["replication_role"] = json!("None");
        let plan = resource.plan(Some(&state), promoted).unwrap();
        let updated = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(updated["replication_role"], "None");
        assert_eq!(
            fake.requests_to(Method::Patch, &replica_id)[0].body.as_ref().unwrap(),
            &json!({"properties": {"replicationRole": "None"}})
        );
    }

    #[tokio::test]
    async fn test_replication_role_rejected_for_primary() {
        let (_fake, ctx, state) = created(config()).await;
        let resource = erase_resource(FlexibleServerResource);

        let mut changed = config();
        changed["replication_role"] = json!("None");
        let plan = resource.plan(Some(&state), changed).unwrap();
        let err = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_first_login_uses_update_mode() {
        let entra_only = json!({
            "name": "flex",
            "location": "westeurope",
            "resource_group_name": "rg",
            "sku_name": "GP_Standard_D2s_v3",
            "version": "16",
            "authentication": [{"active_directory_auth_enabled": true, "password_auth_enabled": false}],
        });
        let (fake, ctx, state) = created(entra_only).await;
        assert!(state["administrator_login"].is_null());
        let resource = erase_resource(FlexibleServerResource);

        let mut with_login = config();
        with_login["authentication"] =
            json!([{"active_directory_auth_enabled": true, "password_auth_enabled": true}]);
        let plan = resource.plan(Some(&state), with_login).unwrap();
        assert!(!plan.requires_replace);
        let updated = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(updated["administrator_login"], "psqladmin");

        let puts = fake.requests_to(Method::Put, ID);
        assert_eq!(puts.len(), 2);
        let body = puts[1].body.as_ref().unwrap();
        assert_eq!(body["properties"]["createMode"], "Update");
        assert_eq!(body["properties"]["administratorLogin"], "psqladmin");
        assert_eq!(body["properties"]["authConfig"]["passwordAuth"], "Enabled");
    }

    #[tokio::test]
    async fn test_read_flattens_remote_blocks() {
        let fake = Arc::new(FakeArm::new());
        fake.seed(
            ID,
            json!({
                "location": "West Europe",
                "sku": {"name": "Standard_B1ms", "tier": "Burstable"},
                "identity": {
                    "type": "UserAssigned",
                    "userAssignedIdentities": {"/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.ManagedIdentity/userAssignedIdentities/uai": {}}
                },
                "properties": {
                    "version": "16",
                    "storage": {"storageSizeGB": 128, "autoGrow": "Enabled", "tier": "P10"},
                    "maintenanceWindow": {"customWindow": "Disabled"},
                    "highAvailability": {"mode": "Disabled"},
                    "dataEncryption": {"type": "SystemManaged"},
                    "network": {"publicNetworkAccess": "Disabled"},
                }
            }),
        );
        let ctx = ResourceContext::new(fake, SUB);

        let state = erase_resource(FlexibleServerResource)
            .import(&ctx, ID)
            .await
            .unwrap();
        assert_eq!(state["location"], "westeurope");
        assert_eq!(state["sku_name"], "B_Standard_B1ms");
        assert_eq!(state["storage_mb"], 131072);
        assert_eq!(state["storage_tier"], "P10");
        assert_eq!(state["auto_grow_enabled"], true);
        assert_eq!(state["public_network_access_enabled"], false);
        assert_eq!(state["maintenance_window"], json!([]));
        assert_eq!(state["high_availability"], json!([]));
        assert_eq!(state["customer_managed_key"], json!([]));
        assert_eq!(state["identity"][0]["type"], "UserAssigned");
        assert_eq!(state["identity"][0]["identity_ids"].as_array().unwrap().len(), 1);
    }
}
