//! Flexible server models (API version 2024-08-01).

use serde::{Deserialize, Serialize};

use super::{ResourceIdentity, Sku, Tags};

/// A flexible server. Used for GET and for the create/login-update PUT.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexibleServer {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Server name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Azure region.
    #[serde(default)]
    pub location: String,
    /// Compute tier and size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    /// Managed identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ResourceIdentity>,
    /// Resource tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    /// Server properties.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<FlexibleServerProperties>,
}

/// Properties of a [`FlexibleServer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct FlexibleServerProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrator_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrator_login_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config: Option<AuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_encryption: Option<DataEncryption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<Backup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window: Option<MaintenanceWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_server_resource_id: Option<String>,
    /// RFC 3339 restore point.
    #[serde(
        default,
        rename = "pointInTimeUTC",
        skip_serializing_if = "Option::is_none"
    )]
    pub point_in_time_utc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_role: Option<String>,
    /// `Default`, `PointInTimeRestore`, `GeoRestore`, `Replica` or `Update`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_mode: Option<String>,
}

/// Storage settings of a flexible server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    /// Provisioned size in GiB.
    #[serde(
        default,
        rename = "storageSizeGB",
        skip_serializing_if = "Option::is_none"
    )]
    pub storage_size_gb: Option<i64>,
    /// `Enabled` or `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_grow: Option<String>,
    /// Disk performance tier, `P4` to `P80`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

/// Authentication settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct AuthConfig {
    /// `Enabled` or `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_directory_auth: Option<String>,
    /// `Enabled` or `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_auth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Customer-managed key settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct DataEncryption {
    /// `AzureKeyVault` or `SystemManaged`.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(
        default,
        rename = "primaryKeyURI",
        skip_serializing_if = "Option::is_none"
    )]
    pub primary_key_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_user_assigned_identity_id: Option<String>,
    #[serde(
        default,
        rename = "geoBackupKeyURI",
        skip_serializing_if = "Option::is_none"
    )]
    pub geo_backup_key_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_backup_user_assigned_identity_id: Option<String>,
}

/// Backup settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Backup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_retention_days: Option<i64>,
    /// `Enabled` or `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_redundant_backup: Option<String>,
}

/// Network settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct Network {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegated_subnet_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_dns_zone_arm_resource_id: Option<String>,
    /// `Enabled` or `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
}

/// High availability settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct HighAvailability {
    /// `Disabled`, `ZoneRedundant` or `SameZone`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standby_availability_zone: Option<String>,
}

/// Maintenance schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MaintenanceWindow {
    /// `Enabled` or `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_window: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_hour: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_minute: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<i64>,
}

/// PATCH body for a flexible server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlexibleServerForUpdate {
    /// New compute tier and size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<Sku>,
    /// New identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ResourceIdentity>,
    /// New tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    /// Property updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<FlexibleServerPropertiesForUpdate>,
}

/// Updatable properties of a flexible server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct FlexibleServerPropertiesForUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrator_login_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<Backup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_window: Option<MaintenanceWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_config: Option<AuthConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_encryption: Option<DataEncryption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_mode: Option<String>,
}

impl FlexibleServerPropertiesForUpdate {
    /// Whether nothing would be sent.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Body of the `restart` action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestartParameter {
    /// Fail over to the standby while restarting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_with_failover: Option<bool>,
    /// `PlannedFailover` or `ForcedFailover`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover_mode: Option<String>,
}

impl RestartParameter {
    /// A restart that swaps the primary and standby zones.
    pub fn planned_failover() -> Self {
        Self {
            restart_with_failover: Some(true),
            failover_mode: Some("PlannedFailover".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flexible_server_wire_names() {
        let server = FlexibleServer {
            location: "westeurope".to_string(),
            properties: Some(FlexibleServerProperties {
                storage: Some(Storage {
                    storage_size_gb: Some(32),
                    tier: Some("P4".to_string()),
                    ..Default::default()
                }),
                point_in_time_utc: Some("2024-01-01T00:00:00Z".to_string()),
                data_encryption: Some(DataEncryption {
                    kind: Some("AzureKeyVault".to_string()),
                    primary_key_uri: Some("https://v.vault.azure.net/keys/k/1".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let value = serde_json::to_value(&server).unwrap();
        assert_eq!(value["properties"]["storage"]["storageSizeGB"], 32);
        assert_eq!(value["properties"]["pointInTimeUTC"], "2024-01-01T00:00:00Z");
        assert_eq!(value["properties"]["dataEncryption"]["type"], "AzureKeyVault");
        assert!(value["properties"]["dataEncryption"]["primaryKeyURI"].is_string());
        assert!(value.get("sku").is_none());
    }

    #[test]
    fn test_update_is_empty() {
        assert!(FlexibleServerPropertiesForUpdate::default().is_empty());
        let update = FlexibleServerPropertiesForUpdate {
            version: Some("16".to_string()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn test_planned_failover() {
        assert_eq!(
            serde_json::to_value(RestartParameter::planned_failover()).unwrap(),
            json!({"restartWithFailover": true, "failoverMode": "PlannedFailover"})
        );
    }
}
