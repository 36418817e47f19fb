//! Typed Azure resource identifiers.
//!
//! Every identifier is an ordered list of literal and value segments rooted at
//! `/subscriptions/{subscriptionId}`. Parsing is strict: literal segments must
//! match in exact case and order, every value must be non-empty, and trailing
//! segments are rejected. Formatting is plain template substitution.
//!
//! # Example
//!
//! ```
//! use azurerm_postgresql::ids::{FirewallRuleId, ResourceId};
//!
//! let id = FirewallRuleId::parse(
//!     "/subscriptions/12345678-1234-9876-4563-123456789012/resourceGroups/resGroup1/providers/Microsoft.DBforPostgreSQL/servers/server1/firewallRules/firewallRule1",
//! )
//! .unwrap();
//! assert_eq!(id.server_name, "server1");
//! assert_eq!(id.name, "firewallRule1");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

const POSTGRES_NAMESPACE: &str = "Microsoft.DBforPostgreSQL";

/// One segment of an identifier template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// A literal that must appear verbatim.
    Static(&'static str),
    /// A named user-supplied value.
    Value(&'static str),
}

use Segment::{Static, Value};

/// An error produced when an identifier string does not match its template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parsing {id_type} ID {input:?}: {kind}")]
pub struct IdParseError {
    /// Human readable label of the identifier type.
    pub id_type: &'static str,
    /// The rejected input.
    pub input: String,
    /// What went wrong.
    pub kind: IdParseErrorKind,
}

/// The specific reason an identifier failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseErrorKind {
    /// The input was empty.
    #[error("the ID was empty")]
    Empty,
    /// A literal segment was absent or differed (including by case).
    #[error("expected the segment {expected:?} but found {found:?}")]
    MissingLiteral {
        /// The literal the template requires.
        expected: &'static str,
        /// What was found instead (empty at end of input).
        found: String,
    },
    /// A value segment was absent or empty.
    #[error("the segment {segment:?} was missing or empty")]
    MissingValue {
        /// Name of the value segment.
        segment: &'static str,
    },
    /// Segments remained after the template was consumed.
    #[error("unexpected non-empty segments after the ID: {remainder:?}")]
    UnexpectedSegments {
        /// The unconsumed tail of the input.
        remainder: String,
    },
}

/// A typed resource identifier.
pub trait ResourceId: Sized {
    /// Label used in error messages and descriptions.
    const LABEL: &'static str;

    /// The ordered template this identifier parses and formats.
    const SEGMENTS: &'static [Segment];

    /// Build the identifier from its values, in template order.
    fn from_values(values: Vec<String>) -> Self;

    /// The identifier's values, in template order.
    fn values(&self) -> Vec<&str>;

    /// Parse an identifier string against [`Self::SEGMENTS`].
    fn parse(input: &str) -> Result<Self, IdParseError> {
        parse_segments(Self::LABEL, Self::SEGMENTS, input).map(Self::from_values)
    }

    /// Format the canonical identifier string.
    fn id(&self) -> String {
        let mut values = self.values().into_iter();
        let mut out = String::new();
        for segment in Self::SEGMENTS {
            out.push('/');
            match segment {
                Static(literal) => out.push_str(literal),
                Value(_) => out.push_str(values.next().unwrap_or_default()),
            }
        }
        out
    }

    /// A description such as `PostgreSQL Server "/subscriptions/..."`.
    fn describe(&self) -> String {
        format!("{} {:?}", Self::LABEL, self.id())
    }
}

fn parse_segments(
    id_type: &'static str,
    segments: &[Segment],
    input: &str,
) -> Result<Vec<String>, IdParseError> {
    let fail = |kind| IdParseError {
        id_type,
        input: input.to_string(),
        kind,
    };

    if input.is_empty() {
        return Err(fail(IdParseErrorKind::Empty));
    }

    let mut parts = input.split('/');
    // Identifiers are absolute, so the first split part is the empty string
    // before the leading slash.
    if let Some(first) = parts.next() {
        if !first.is_empty() {
            return Err(fail(IdParseErrorKind::MissingLiteral {
                expected: "/",
                found: first.to_string(),
            }));
        }
    }

    let mut values = Vec::new();
    for segment in segments {
        let part = parts.next();
        match *segment {
            Static(literal) => {
                if part != Some(literal) {
                    return Err(fail(IdParseErrorKind::MissingLiteral {
                        expected: literal,
                        found: part.unwrap_or_default().to_string(),
                    }));
                }
            },
            Value(name) => match part {
                Some(value) if !value.is_empty() => values.push(value.to_string()),
                _ => return Err(fail(IdParseErrorKind::MissingValue { segment: name })),
            },
        }
    }

    let rest: Vec<&str> = parts.collect();
    if !rest.is_empty() {
        return Err(fail(IdParseErrorKind::UnexpectedSegments {
            remainder: format!("/{}", rest.join("/")),
        }));
    }

    Ok(values)
}

macro_rules! resource_id {
    (
        $(#[$meta:meta])*
        $name:ident($label:literal) {
            $($(#[$field_meta:meta])* $field:ident),+ $(,)?
        }
        segments = [$($segment:expr),+ $(,)?];
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name {
            $(
                $(#[$field_meta])*
                pub $field: String,
            )+
        }

        impl $name {
            /// Construct the identifier from its values.
            pub fn new($($field: impl Into<String>),+) -> Self {
                Self {
                    $($field: $field.into()),+
                }
            }
        }

        impl ResourceId for $name {
            const LABEL: &'static str = $label;
            const SEGMENTS: &'static [Segment] = &[$($segment),+];

            fn from_values(values: Vec<String>) -> Self {
                let mut values = values.into_iter();
                Self {
                    $($field: values.next().unwrap_or_default()),+
                }
            }

            fn values(&self) -> Vec<&str> {
                vec![$(self.$field.as_str()),+]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.id())
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <Self as ResourceId>::parse(s)
            }
        }
    };
}

resource_id! {
    /// A single server.
    ServerId("PostgreSQL Server") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Server name.
        server_name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("servers"), Value("serverName"),
    ];
}

resource_id! {
    /// A database on a single server.
    DatabaseId("PostgreSQL Database") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent server name.
        server_name,
        /// Database name.
        name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("servers"), Value("serverName"),
        Static("databases"), Value("databaseName"),
    ];
}

resource_id! {
    /// A configuration setting on a single server.
    ConfigurationId("PostgreSQL Configuration") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent server name.
        server_name,
        /// Configuration name.
        name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("servers"), Value("serverName"),
        Static("configurations"), Value("configurationName"),
    ];
}

resource_id! {
    /// A firewall rule on a single server.
    FirewallRuleId("PostgreSQL Firewall Rule") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent server name.
        server_name,
        /// Firewall rule name.
        name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("servers"), Value("serverName"),
        Static("firewallRules"), Value("firewallRuleName"),
    ];
}

resource_id! {
    /// A virtual network rule on a single server.
    VirtualNetworkRuleId("PostgreSQL Virtual Network Rule") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent server name.
        server_name,
        /// Rule name.
        name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("servers"), Value("serverName"),
        Static("virtualNetworkRules"), Value("virtualNetworkRuleName"),
    ];
}

resource_id! {
    /// A customer managed key attached to a single server.
    ServerKeyId("PostgreSQL Server Key") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent server name.
        server_name,
        /// Key name, `{vault}_{key}_{version}`.
        name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("servers"), Value("serverName"),
        Static("keys"), Value("keyName"),
    ];
}

resource_id! {
    /// The Azure AD administrator of a single server.
    AzureActiveDirectoryAdministratorId("PostgreSQL Active Directory Administrator") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent server name.
        server_name,
        /// Administrator name, always `activeDirectory` in practice.
        administrator_name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("servers"), Value("serverName"),
        Static("administrators"), Value("administratorName"),
    ];
}

resource_id! {
    /// A flexible server.
    FlexibleServerId("PostgreSQL Flexible Server") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Flexible server name.
        flexible_server_name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("flexibleServers"), Value("flexibleServerName"),
    ];
}

resource_id! {
    /// A configuration setting on a flexible server.
    FlexibleServerConfigurationId("PostgreSQL Flexible Server Configuration") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent flexible server name.
        flexible_server_name,
        /// Configuration name.
        name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("flexibleServers"), Value("flexibleServerName"),
        Static("configurations"), Value("configurationName"),
    ];
}

resource_id! {
    /// A firewall rule on a flexible server.
    FlexibleServerFirewallRuleId("PostgreSQL Flexible Server Firewall Rule") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent flexible server name.
        flexible_server_name,
        /// Firewall rule name.
        name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("flexibleServers"), Value("flexibleServerName"),
        Static("firewallRules"), Value("firewallRuleName"),
    ];
}

resource_id! {
    /// A database on a flexible server.
    FlexibleServerDatabaseId("PostgreSQL Flexible Server Database") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Parent flexible server name.
        flexible_server_name,
        /// Database name.
        name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static(POSTGRES_NAMESPACE),
        Static("flexibleServers"), Value("flexibleServerName"),
        Static("databases"), Value("databaseName"),
    ];
}

resource_id! {
    /// A virtual network subnet.
    SubnetId("Subnet") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Virtual network name.
        virtual_network_name,
        /// Subnet name.
        subnet_name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static("Microsoft.Network"),
        Static("virtualNetworks"), Value("virtualNetworkName"),
        Static("subnets"), Value("subnetName"),
    ];
}

resource_id! {
    /// A private DNS zone.
    PrivateDnsZoneId("Private DNS Zone") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Zone name.
        private_dns_zone_name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static("Microsoft.Network"),
        Static("privateDnsZones"), Value("privateDnsZoneName"),
    ];
}

resource_id! {
    /// A user assigned managed identity.
    UserAssignedIdentityId("User Assigned Identity") {
        /// Subscription ID.
        subscription_id,
        /// Resource group name.
        resource_group_name,
        /// Identity name.
        user_assigned_identity_name,
    }
    segments = [
        Static("subscriptions"), Value("subscriptionId"),
        Static("resourceGroups"), Value("resourceGroupName"),
        Static("providers"), Static("Microsoft.ManagedIdentity"),
        Static("userAssignedIdentities"), Value("userAssignedIdentityName"),
    ];
}

macro_rules! server_child {
    ($($child:ident),+) => {
        $(
            impl $child {
                /// The parent server.
                pub fn server_id(&self) -> ServerId {
                    ServerId::new(
                        self.subscription_id.clone(),
                        self.resource_group_name.clone(),
                        self.server_name.clone(),
                    )
                }
            }
        )+
    };
}

macro_rules! flexible_server_child {
    ($($child:ident),+) => {
        $(
            impl $child {
                /// The parent flexible server.
                pub fn flexible_server_id(&self) -> FlexibleServerId {
                    FlexibleServerId::new(
                        self.subscription_id.clone(),
                        self.resource_group_name.clone(),
                        self.flexible_server_name.clone(),
                    )
                }
            }
        )+
    };
}

server_child!(
    DatabaseId,
    ConfigurationId,
    FirewallRuleId,
    VirtualNetworkRuleId,
    ServerKeyId,
    AzureActiveDirectoryAdministratorId
);

flexible_server_child!(
    FlexibleServerConfigurationId,
    FlexibleServerFirewallRuleId,
    FlexibleServerDatabaseId
);

/// Identifier types that schema validators can refer to as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    /// [`ServerId`].
    Server,
    /// [`DatabaseId`].
    Database,
    /// [`ConfigurationId`].
    Configuration,
    /// [`FirewallRuleId`].
    FirewallRule,
    /// [`VirtualNetworkRuleId`].
    VirtualNetworkRule,
    /// [`ServerKeyId`].
    ServerKey,
    /// [`AzureActiveDirectoryAdministratorId`].
    ActiveDirectoryAdministrator,
    /// [`FlexibleServerId`].
    FlexibleServer,
    /// [`FlexibleServerConfigurationId`].
    FlexibleServerConfiguration,
    /// [`FlexibleServerFirewallRuleId`].
    FlexibleServerFirewallRule,
    /// [`FlexibleServerDatabaseId`].
    FlexibleServerDatabase,
    /// [`SubnetId`].
    Subnet,
    /// [`PrivateDnsZoneId`].
    PrivateDnsZone,
    /// [`UserAssignedIdentityId`].
    UserAssignedIdentity,
}

impl IdKind {
    /// Check that `input` parses as this kind of identifier.
    pub fn validate(self, input: &str) -> Result<(), IdParseError> {
        match self {
            Self::Server => ServerId::parse(input).map(drop),
            Self::Database => DatabaseId::parse(input).map(drop),
            Self::Configuration => ConfigurationId::parse(input).map(drop),
            Self::FirewallRule => FirewallRuleId::parse(input).map(drop),
            Self::VirtualNetworkRule => VirtualNetworkRuleId::parse(input).map(drop),
            Self::ServerKey => ServerKeyId::parse(input).map(drop),
            Self::ActiveDirectoryAdministrator => {
                AzureActiveDirectoryAdministratorId::parse(input).map(drop)
            },
            Self::FlexibleServer => FlexibleServerId::parse(input).map(drop),
            Self::FlexibleServerConfiguration => {
                FlexibleServerConfigurationId::parse(input).map(drop)
            },
            Self::FlexibleServerFirewallRule => {
                FlexibleServerFirewallRuleId::parse(input).map(drop)
            },
            Self::FlexibleServerDatabase => FlexibleServerDatabaseId::parse(input).map(drop),
            Self::Subnet => SubnetId::parse(input).map(drop),
            Self::PrivateDnsZone => PrivateDnsZoneId::parse(input).map(drop),
            Self::UserAssignedIdentity => UserAssignedIdentityId::parse(input).map(drop),
        }
    }
}

/// A parsed Key Vault key URL, `https://{vault}.vault.azure.net/keys/{name}/{version}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyVaultKeyUrl {
    /// The vault endpoint, with a trailing slash.
    pub vault_base_url: String,
    /// The first DNS label of the vault host.
    pub vault_name: String,
    /// The key name.
    pub name: String,
    /// The key version, if the URL pins one.
    pub version: Option<String>,
}

/// A Key Vault key URL that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parsing Key Vault key URL {input:?}: {reason}")]
pub struct KeyVaultUrlError {
    /// The rejected input.
    pub input: String,
    /// What was wrong with it.
    pub reason: String,
}

impl KeyVaultKeyUrl {
    /// Parse a key URL, requiring a version segment when `versioned` is set.
    pub fn parse(input: &str, versioned: bool) -> Result<Self, KeyVaultUrlError> {
        let fail = |reason: &str| KeyVaultUrlError {
            input: input.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(input).map_err(|e| fail(&e.to_string()))?;
        if url.scheme() != "https" {
            return Err(fail("expected an https URL"));
        }
        let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(|| fail("missing host"))?;
        let vault_name = host.split('.').next().unwrap_or(host).to_string();
        let vault_base_url = match url.port() {
            Some(port) => format!("https://{host}:{port}/"),
            None => format!("https://{host}/"),
        };

        let parts: Vec<&str> = url.path().trim_matches('/').split('/').collect();
        let (name, version) = match parts.as_slice() {
            ["keys", name] if !name.is_empty() => (name.to_string(), None),
            ["keys", name, version] if !name.is_empty() && !version.is_empty() => {
                (name.to_string(), Some(version.to_string()))
            },
            _ => return Err(fail("expected a path of the form /keys/{name}[/{version}]")),
        };
        if versioned && version.is_none() {
            return Err(fail("expected a versioned key URL"));
        }

        Ok(Self {
            vault_base_url,
            vault_name,
            name,
            version,
        })
    }

    /// The canonical URL.
    pub fn id(&self) -> String {
        match &self.version {
            Some(version) => format!("{}keys/{}/{}", self.vault_base_url, self.name, version),
            None => format!("{}keys/{}", self.vault_base_url, self.name),
        }
    }
}
