use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{FLEXIBLE_SERVER_API_VERSION, SINGLE_SERVER_API_VERSION};
use crate::error::ProviderError;
use crate::ids::{FlexibleServerId, ResourceId, ServerId};
use crate::resource::{DataSource, ResourceContext};
use crate::schema::{Attribute, Block, NestedBlock, Schema};
use crate::sdk::{FlexibleServer, Server, Tags};

use super::flexible_server::flatten_sku;
use super::server::{flatten_identity, SystemAssignedIdentity};
use super::{is_enabled, normalize_location, validate};

fn lookup_schema() -> Schema {
    Schema::v0()
        .with_attribute(
            "name",
            Attribute::required_string().with_validator(validate::server_name()),
        )
        .with_attribute(
            "resource_group_name",
            Attribute::required_string().with_validator(validate::resource_group_name()),
        )
        .with_attribute("location", Attribute::computed_string())
        .with_attribute("administrator_login", Attribute::computed_string())
        .with_attribute("sku_name", Attribute::computed_string())
        .with_attribute("version", Attribute::computed_string())
        .with_attribute("fqdn", Attribute::computed_string())
        .with_attribute("tags", Attribute::computed_string_map())
}

/// Lookup result of `data.azurerm_postgresql_server`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerDataModel {
    pub id: String,
    pub name: String,
    pub resource_group_name: String,
    pub location: String,
    pub administrator_login: String,
    pub sku_name: String,
    pub version: String,
    pub fqdn: String,
    pub identity: Vec<SystemAssignedIdentity>,
    pub tags: Tags,
}

/// Reads an existing single server by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerDataSource;

#[async_trait]
impl DataSource for ServerDataSource {
    type Model = ServerDataModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_server"
    }

    fn schema(&self) -> Schema {
        let identity = Block::new()
            .with_attribute("type", Attribute::computed_string())
            .with_attribute("principal_id", Attribute::computed_string())
            .with_attribute("tenant_id", Attribute::computed_string());
        lookup_schema().with_block("identity", NestedBlock::list(identity))
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        model: ServerDataModel,
    ) -> Result<ServerDataModel, ProviderError> {
        let id = ServerId::new(ctx.subscription_id(), &model.resource_group_name, &model.name);
        debug!(%id, "looking up server");
        let server = ctx
            .client::<Server>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found")))?;

        let props = server.properties.unwrap_or_default();
        Ok(ServerDataModel {
            id: id.id(),
            location: normalize_location(&server.location),
            administrator_login: props.administrator_login.unwrap_or_default(),
            sku_name: server.sku.map(|s| s.name).unwrap_or_default(),
            version: props.version.unwrap_or_default(),
            fqdn: props.fully_qualified_domain_name.unwrap_or_default(),
            identity: flatten_identity(server.identity),
            tags: server.tags.unwrap_or_default(),
            ..model
        })
    }
}

/// Lookup result of `data.azurerm_postgresql_flexible_server`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexibleServerDataModel {
    pub id: String,
    pub name: String,
    pub resource_group_name: String,
    pub location: String,
    pub administrator_login: String,
    pub sku_name: String,
    pub version: String,
    pub fqdn: String,
    pub storage_mb: i64,
    pub auto_grow_enabled: bool,
    pub backup_retention_days: i64,
    pub delegated_subnet_id: String,
    pub public_network_access_enabled: bool,
    pub tags: Tags,
}

/// Reads an existing flexible server by name.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexibleServerDataSource;

#[async_trait]
impl DataSource for FlexibleServerDataSource {
    type Model = FlexibleServerDataModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_flexible_server"
    }

    fn schema(&self) -> Schema {
        lookup_schema()
            .with_attribute("storage_mb", Attribute::computed_int64())
            .with_attribute("auto_grow_enabled", Attribute::computed_bool())
            .with_attribute("backup_retention_days", Attribute::computed_int64())
            .with_attribute("delegated_subnet_id", Attribute::computed_string())
            .with_attribute("public_network_access_enabled", Attribute::computed_bool())
    }

    async fn read(
        &self,
        ctx: &ResourceContext,
        model: FlexibleServerDataModel,
    ) -> Result<FlexibleServerDataModel, ProviderError> {
        let id = FlexibleServerId::new(ctx.subscription_id(), &model.resource_group_name, &model.name);
        debug!(%id, "looking up flexible server");
        let server = ctx
            .client::<FlexibleServer>(FLEXIBLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found")))?;

        let sku_name = flatten_sku(server.sku.as_ref())?.unwrap_or_default();
        let props = server.properties.unwrap_or_default();
        let storage = props.storage.unwrap_or_default();
        let network = props.network.unwrap_or_default();
        Ok(FlexibleServerDataModel {
            id: id.id(),
            location: normalize_location(&server.location),
            administrator_login: props.administrator_login.unwrap_or_default(),
            sku_name,
            version: props.version.unwrap_or_default(),
            fqdn: props.fully_qualified_domain_name.unwrap_or_default(),
            storage_mb: storage.storage_size_gb.unwrap_or_default() * 1024,
            auto_grow_enabled: is_enabled(storage.auto_grow.as_deref()),
            backup_retention_days: props
                .backup
                .and_then(|b| b.backup_retention_days)
                .unwrap_or_default(),
            delegated_subnet_id: network.delegated_subnet_resource_id.unwrap_or_default(),
            public_network_access_enabled: is_enabled(network.public_network_access.as_deref()),
            tags: server.tags.unwrap_or_default(),
            ..model
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::erase_data_source;
    use crate::testing::FakeArm;
    use serde_json::json;
    use std::sync::Arc;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const RG: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL";

    #[tokio::test]
    async fn test_server_lookup() {
        let fake = Arc::new(FakeArm::new());
        fake.seed(
            &format!("{RG}/servers/pgsrv"),
            json!({
                "location": "West Europe",
                "sku": {"name": "GP_Gen5_2", "tier": "GeneralPurpose", "capacity": 2, "family": "Gen5"},
                "identity": {"type": "SystemAssigned", "principalId": "p", "tenantId": "t"},
                "tags": {"env": "test"},
                "properties": {
                    "administratorLogin": "psqladmin",
                    "version": "11",
                    "fullyQualifiedDomainName": "pgsrv.postgres.database.azure.com",
                }
            }),
        );
        let ctx = ResourceContext::new(fake, SUB);

        let state = erase_data_source(ServerDataSource)
            .read(&ctx, json!({"name": "pgsrv", "resource_group_name": "rg"}))
            .await
            .unwrap();
        assert_eq!(state["id"], format!("{RG}/servers/pgsrv"));
        assert_eq!(state["location"], "westeurope");
        assert_eq!(state["sku_name"], "GP_Gen5_2");
        assert_eq!(state["fqdn"], "pgsrv.postgres.database.azure.com");
        assert_eq!(state["identity"][0]["principal_id"], "p");
        assert_eq!(state["tags"]["env"], "test");
    }

    #[tokio::test]
    async fn test_flexible_server_lookup() {
        let fake = Arc::new(FakeArm::new());
        fake.seed(
            &format!("{RG}/flexibleServers/flex"),
            json!({
                "location": "westeurope",
                "sku": {"name": "Standard_D2s_v3", "tier": "GeneralPurpose"},
                "properties": {
                    "administratorLogin": "psqladmin",
                    "version": "16",
                    "storage": {"storageSizeGB": 64, "autoGrow": "Enabled"},
                    "backup": {"backupRetentionDays": 14},
                    "network": {"publicNetworkAccess": "Enabled"},
                }
            }),
        );
        let ctx = ResourceContext::new(fake, SUB);

        let state = erase_data_source(FlexibleServerDataSource)
            .read(&ctx, json!({"name": "flex", "resource_group_name": "rg"}))
            .await
            .unwrap();
        assert_eq!(state["sku_name"], "GP_Standard_D2s_v3");
        assert_eq!(state["storage_mb"], 65536);
        assert_eq!(state["auto_grow_enabled"], true);
        assert_eq!(state["backup_retention_days"], 14);
        assert_eq!(state["public_network_access_enabled"], true);
        assert_eq!(state["delegated_subnet_id"], "");
    }

    #[tokio::test]
    async fn test_missing_server_is_an_error() {
        let ctx = ResourceContext::new(Arc::new(FakeArm::new()), SUB);
        let err = erase_data_source(FlexibleServerDataSource)
            .read(&ctx, json!({"name": "absent", "resource_group_name": "rg"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));
    }
}
