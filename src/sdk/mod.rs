//! Typed request and response bodies for the PostgreSQL management plane.
//!
//! Only the fields this crate reads or writes are modelled. Unknown fields
//! are ignored on deserialization; `None` fields are omitted on the wire.

mod flexible;
mod single;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use flexible::*;
pub use single::*;

/// Resource tags.
pub type Tags = BTreeMap<String, String>;

/// Pricing tier of a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    /// SKU name, e.g. `GP_Gen5_4` or `Standard_D2s_v3`.
    pub name: String,
    /// `Basic`, `GeneralPurpose`, `MemoryOptimized` or `Burstable`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// vCore count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<i64>,
    /// Hardware generation, e.g. `Gen5`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

/// A user-assigned identity attached to a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAssignedIdentity {
    /// Service principal object ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    /// Application ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Managed identity configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentity {
    /// `SystemAssigned`, `UserAssigned` or `None`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Principal of the system-assigned identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_id: Option<String>,
    /// Tenant of the system-assigned identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// User-assigned identities keyed by resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_assigned_identities: Option<BTreeMap<String, UserAssignedIdentity>>,
}

/// A child database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Database name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Database properties.
    #[serde(default)]
    pub properties: DatabaseProperties,
}

/// Properties of a [`Database`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseProperties {
    /// Character set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
    /// Collation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collation: Option<String>,
}

/// A server-level firewall rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallRule {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Rule name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Rule properties.
    #[serde(default)]
    pub properties: FirewallRuleProperties,
}

/// Properties of a [`FirewallRule`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallRuleProperties {
    /// First address of the allowed range.
    #[serde(default)]
    pub start_ip_address: String,
    /// Last address of the allowed range.
    #[serde(default)]
    pub end_ip_address: String,
}

/// A server parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    /// Resource ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Parameter name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Parameter properties.
    #[serde(default)]
    pub properties: ConfigurationProperties,
}

/// Properties of a [`Configuration`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationProperties {
    /// Current value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Where the value came from: `system-default` or `user-override`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Value the server falls back to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Whether a change takes effect without a restart. Flexible servers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dynamic_config: Option<bool>,
}

impl Configuration {
    /// A write that sets `value` as a user override.
    pub fn user_override(value: impl Into<String>) -> Self {
        Self {
            properties: ConfigurationProperties {
                value: Some(value.into()),
                source: Some("user-override".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A write that restores `value` as the system default.
    pub fn system_default(value: impl Into<String>) -> Self {
        Self {
            properties: ConfigurationProperties {
                value: Some(value.into()),
                source: Some("system-default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sku_omits_unset_fields() {
        let sku = Sku {
            name: "Standard_B1ms".to_string(),
            tier: Some("Burstable".to_string()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&sku).unwrap(),
            json!({"name": "Standard_B1ms", "tier": "Burstable"})
        );
    }

    #[test]
    fn test_identity_type_rename() {
        let identity: ResourceIdentity = serde_json::from_value(json!({
            "type": "SystemAssigned",
            "principalId": "p",
            "tenantId": "t",
            "somethingNew": true
        }))
        .unwrap();
        assert_eq!(identity.kind, "SystemAssigned");
        assert_eq!(identity.principal_id.as_deref(), Some("p"));
        assert!(identity.user_assigned_identities.is_none());
    }

    #[test]
    fn test_configuration_writes() {
        assert_eq!(
            serde_json::to_value(Configuration::user_override("on")).unwrap(),
            json!({"properties": {"value": "on", "source": "user-override"}})
        );
        assert_eq!(
            serde_json::to_value(Configuration::system_default("off")).unwrap(),
            json!({"properties": {"value": "off", "source": "system-default"}})
        );
    }
}
