//! One module per resource type, plus the data sources.
//!
//! Every resource follows the same shape: a `#[serde(default)]` model whose
//! field names are the schema's attribute names, a unit struct implementing
//! [`Resource`](crate::resource::Resource), and tests against
//! [`FakeArm`](crate::testing::FakeArm).

mod active_directory_administrator;
mod configuration;
mod data_sources;
mod database;
mod firewall_rule;
mod flexible_server;
mod flexible_server_configuration;
mod flexible_server_database;
mod flexible_server_firewall_rule;
mod server;
mod server_key;
pub mod validate;
mod virtual_network_rule;

pub use active_directory_administrator::ActiveDirectoryAdministratorResource;
pub use configuration::ConfigurationResource;
pub use data_sources::{FlexibleServerDataSource, ServerDataSource};
pub use database::DatabaseResource;
pub use firewall_rule::FirewallRuleResource;
pub use flexible_server::FlexibleServerResource;
pub use flexible_server_configuration::FlexibleServerConfigurationResource;
pub use flexible_server_database::FlexibleServerDatabaseResource;
pub use flexible_server_firewall_rule::FlexibleServerFirewallRuleResource;
pub use server::ServerResource;
pub use server_key::ServerKeyResource;
pub use virtual_network_rule::VirtualNetworkRuleResource;

use crate::error::ProviderError;
use crate::ids::IdKind;
use crate::schema::{Attribute, Validator};

/// `location`, normalized on read.
pub(crate) fn location_attribute() -> Attribute {
    Attribute::required_string()
        .with_force_new()
        .with_validator(Validator::StringNotWhitespace)
        .with_description("The Azure region the resource lives in")
}

/// `resource_group_name`.
pub(crate) fn resource_group_attribute() -> Attribute {
    Attribute::required_string()
        .with_force_new()
        .with_validator(validate::resource_group_name())
}

/// `tags`.
pub(crate) fn tags_attribute() -> Attribute {
    Attribute::optional_string_map().with_description("Tags assigned to the resource")
}

/// The parent single server's `server_name`.
pub(crate) fn server_name_attribute() -> Attribute {
    Attribute::required_string()
        .with_force_new()
        .with_validator(validate::server_name())
}

/// The parent flexible server's `server_id`.
pub(crate) fn flexible_server_id_attribute() -> Attribute {
    Attribute::required_string()
        .with_force_new()
        .with_validator(Validator::resource_id(IdKind::FlexibleServer))
}

/// `West Europe` and `westeurope` are the same region.
pub(crate) fn normalize_location(location: &str) -> String {
    location.replace(' ', "").to_lowercase()
}

/// `Enabled` or `Disabled`.
pub(crate) fn enabled(flag: bool) -> String {
    if flag { "Enabled" } else { "Disabled" }.to_string()
}

/// Whether an `Enabled`/`Disabled` value from the API is `Enabled`.
pub(crate) fn is_enabled(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("Enabled"))
}

/// Fail with an import hint when a resource about to be created already exists.
pub(crate) fn ensure_absent<M>(
    existing: Option<M>,
    resource_type: &str,
    id: &str,
) -> Result<(), ProviderError> {
    match existing {
        Some(_) => Err(ProviderError::import_as_exists(resource_type, id)),
        None => Ok(()),
    }
}

/// `None` for empty strings.
pub(crate) fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
