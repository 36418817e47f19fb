//! The set of resources and data sources this crate contributes to a provider.

use std::sync::Arc;

use crate::resource::{erase_data_source, erase_resource, DynDataSource, DynResource};
use crate::resources::{
    ActiveDirectoryAdministratorResource, ConfigurationResource, DatabaseResource,
    FirewallRuleResource, FlexibleServerConfigurationResource, FlexibleServerDataSource,
    FlexibleServerDatabaseResource, FlexibleServerFirewallRuleResource, FlexibleServerResource,
    ServerDataSource, ServerKeyResource, ServerResource, VirtualNetworkRuleResource,
};

/// A service package that registers resources with a provider.
pub trait ServiceRegistration: Send + Sync {
    /// Display name of the service.
    fn name(&self) -> &'static str;

    /// Documentation categories.
    fn website_categories(&self) -> Vec<&'static str>;

    /// Managed resources, keyed by their type name.
    fn supported_resources(&self) -> Vec<Arc<dyn DynResource>>;

    /// Data sources, keyed by their type name.
    fn supported_data_sources(&self) -> Vec<Arc<dyn DynDataSource>>;
}

/// Azure Database for PostgreSQL, single and flexible servers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresRegistration;

impl ServiceRegistration for PostgresRegistration {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn website_categories(&self) -> Vec<&'static str> {
        vec!["Database"]
    }

    fn supported_resources(&self) -> Vec<Arc<dyn DynResource>> {
        vec![
            erase_resource(ServerResource),
            erase_resource(DatabaseResource),
            erase_resource(FirewallRuleResource),
            erase_resource(VirtualNetworkRuleResource),
            erase_resource(ConfigurationResource),
            erase_resource(ActiveDirectoryAdministratorResource),
            erase_resource(ServerKeyResource),
            erase_resource(FlexibleServerResource),
            erase_resource(FlexibleServerConfigurationResource),
            erase_resource(FlexibleServerFirewallRuleResource),
            erase_resource(FlexibleServerDatabaseResource),
        ]
    }

    fn supported_data_sources(&self) -> Vec<Arc<dyn DynDataSource>> {
        vec![
            erase_data_source(ServerDataSource),
            erase_data_source(FlexibleServerDataSource),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_registration_names() {
        let reg = PostgresRegistration;
        assert_eq!(reg.name(), "PostgreSQL");
        assert_eq!(reg.website_categories(), vec!["Database"]);
    }

    #[test]
    fn test_resource_types_are_unique() {
        let names: Vec<_> = PostgresRegistration
            .supported_resources()
            .iter()
            .map(|r| r.type_name())
            .collect();
        let unique: BTreeSet<_> = names.iter().collect();
        assert_eq!(names.len(), 11);
        assert_eq!(unique.len(), names.len());
        assert!(names
            .iter()
            .all(|n| n.starts_with("azurerm_postgresql_")));
        assert!(names.contains(&"azurerm_postgresql_flexible_server_database"));
    }

    #[test]
    fn test_data_sources() {
        let names: Vec<_> = PostgresRegistration
            .supported_data_sources()
            .iter()
            .map(|d| d.type_name())
            .collect();
        assert_eq!(
            names,
            vec!["azurerm_postgresql_server", "azurerm_postgresql_flexible_server"]
        );
    }

    #[test]
    fn test_every_schema_declares_id_and_timeouts() {
        for resource in PostgresRegistration.supported_resources() {
            let schema = resource.schema();
            assert!(
                schema.block.attributes.contains_key("id"),
                "{} has no id",
                resource.type_name()
            );
            assert!(schema.block.blocks.contains_key("timeouts"));
        }
    }
}
