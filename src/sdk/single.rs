//! Single server models (API version 2017-12-01).

use serde::{Deserialize, Serialize};

use super::{ResourceIdentity, Sku, Tags};

/// A single server as returned by GET.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Server {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Server name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Azure region.
    #[serde(default)]
    pub location: String,
    /// Pricing tier.
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
    pub properties: Option<ServerProperties>,
}

/// Storage settings of a single server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[allow(missing_docs)]
    pub backup_retention_days: Option<i64>,
    /// `Enabled` or `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_redundant_backup: Option<String>,
    #[serde(
        default,
        rename = "storageMB",
        skip_serializing_if = "Option::is_none"
    )]
    #[allow(missing_docs)]
    pub storage_mb: Option<i64>,
    /// `Enabled` or `Disabled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_autogrow: Option<String>,
}

/// Properties reported for a single server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ServerProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrator_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_enforcement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_tls_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byok_enforcement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_encryption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_visible_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fully_qualified_domain_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub earliest_restore_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<StorageProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_server_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_capacity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
}

/// Properties shared by every create mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ServerCommonProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_enforcement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_tls_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_encryption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<StorageProfile>,
}

/// Create-mode specific payload, discriminated by `createMode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "createMode")]
pub enum ServerPropertiesForCreate {
    /// A new, empty server.
    #[serde(rename_all = "camelCase")]
    Default {
        /// Administrator login name.
        administrator_login: String,
        /// Administrator password.
        administrator_login_password: String,
        /// Shared settings.
        #[serde(flatten)]
        common: ServerCommonProperties,
    },
    /// Restore of another server at a point in time.
    #[serde(rename_all = "camelCase")]
    PointInTimeRestore {
        /// Server to restore from.
        source_server_id: String,
        /// RFC 3339 restore point.
        restore_point_in_time: String,
        /// Shared settings.
        #[serde(flatten)]
        common: ServerCommonProperties,
    },
    /// Restore from a geo-redundant backup.
    #[serde(rename_all = "camelCase")]
    GeoRestore {
        /// Server to restore from.
        source_server_id: String,
        /// Shared settings.
        #[serde(flatten)]
        common: ServerCommonProperties,
    },
    /// Read replica of another server.
    #[serde(rename_all = "camelCase")]
    Replica {
        /// Primary server.
        source_server_id: String,
        /// Shared settings.
        #[serde(flatten)]
        common: ServerCommonProperties,
    },
}

impl ServerPropertiesForCreate {
    /// The `createMode` discriminator.
    pub fn create_mode(&self) -> &'static str {
        match self {
            Self::Default { .. } => "Default",
            Self::PointInTimeRestore { .. } => "PointInTimeRestore",
            Self::GeoRestore { .. } => "GeoRestore",
            Self::Replica { .. } => "Replica",
        }
    }
}

/// PUT body for creating a single server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerForCreate {
    /// Azure region.
    pub location: String,
    /// Pricing tier.
    pub sku: Sku,
    /// Managed identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ResourceIdentity>,
    /// Resource tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Tags>,
    /// Create-mode payload.
    pub properties: ServerPropertiesForCreate,
}

/// PATCH body for a single server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerUpdateParameters {
    /// New pricing tier.
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
    pub properties: Option<ServerUpdateProperties>,
}

/// Updatable properties of a single server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct ServerUpdateProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_profile: Option<StorageProfile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrator_login_password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_enforcement: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_tls_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_network_access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_role: Option<String>,
}

/// A virtual network rule on a single server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetworkRule {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Rule name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Rule properties.
    #[serde(default)]
    pub properties: VirtualNetworkRuleProperties,
}

/// Properties of a [`VirtualNetworkRule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualNetworkRuleProperties {
    /// Subnet the rule admits.
    #[serde(default)]
    pub virtual_network_subnet_id: String,
    /// Create the rule before the subnet has the service endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_missing_vnet_service_endpoint: Option<bool>,
    /// `Initializing`, `InProgress`, `Ready`, `Deleting` or `Unknown`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// The Azure Active Directory administrator of a single server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAdministratorResource {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Administrator properties.
    #[serde(default)]
    pub properties: ServerAdministratorProperties,
}

/// Properties of a [`ServerAdministratorResource`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAdministratorProperties {
    /// Always `ActiveDirectory`.
    #[serde(default)]
    pub administrator_type: String,
    /// Login name of the administrator.
    #[serde(default)]
    pub login: String,
    /// Object ID of the administrator.
    #[serde(default)]
    pub sid: String,
    /// Tenant of the administrator.
    #[serde(default)]
    pub tenant_id: String,
}

/// A customer-managed key attached to a single server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerKey {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Key name, `{vault}_{key}_{version}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Key properties.
    #[serde(default)]
    pub properties: ServerKeyProperties,
}

/// Properties of a [`ServerKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerKeyProperties {
    /// Always `AzureKeyVault`.
    #[serde(default)]
    pub server_key_type: String,
    /// Versioned Key Vault key URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

/// Threat detection settings of a single server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSecurityAlertPolicy {
    /// Policy properties.
    #[serde(default)]
    pub properties: SecurityAlertPolicyProperties,
}

/// Properties of a [`ServerSecurityAlertPolicy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct SecurityAlertPolicyProperties {
    /// `Enabled` or `Disabled`.
    #[serde(default)]
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_alerts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_addresses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_account_admins: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_account_access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_mode_tagging() {
        let props = ServerPropertiesForCreate::Replica {
            source_server_id: "/subscriptions/s/primary".to_string(),
            common: ServerCommonProperties {
                version: Some("11".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(props.create_mode(), "Replica");
        assert_eq!(
            serde_json::to_value(&props).unwrap(),
            json!({
                "createMode": "Replica",
                "sourceServerId": "/subscriptions/s/primary",
                "version": "11"
            })
        );
    }

    #[test]
    fn test_default_create_payload() {
        let props = ServerPropertiesForCreate::Default {
            administrator_login: "psqladmin".to_string(),
            administrator_login_password: "H@Sh1CoR3!".to_string(),
            common: ServerCommonProperties {
                storage_profile: Some(StorageProfile {
                    storage_mb: Some(5120),
                    ..Default::default()
                }),
                ..Default::default()
            },
        };
        let value = serde_json::to_value(&props).unwrap();
        assert_eq!(value["createMode"], "Default");
        assert_eq!(value["administratorLogin"], "psqladmin");
        assert_eq!(value["storageProfile"]["storageMB"], 5120);
    }

    #[test]
    fn test_server_tolerates_partial_body() {
        let server: Server = serde_json::from_value(json!({
            "location": "westeurope",
            "properties": {"userVisibleState": "Ready", "replicationRole": "None"}
        }))
        .unwrap();
        let props = server.properties.unwrap();
        assert_eq!(props.user_visible_state.as_deref(), Some("Ready"));
        assert!(server.sku.is_none());
    }
}
