use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::SINGLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{AzureActiveDirectoryAdministratorId, ResourceId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema, Validator};
use crate::sdk::{ServerAdministratorProperties, ServerAdministratorResource};
use crate::timeouts::Timeouts;

use super::{ensure_absent, resource_group_attribute, server_name_attribute};

/// Servers have at most one administrator, always under this name.
const ADMINISTRATOR_NAME: &str = "activeDirectory";

/// State of `azurerm_postgresql_active_directory_administrator`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveDirectoryAdministratorModel {
    pub id: String,
    pub server_name: String,
    pub resource_group_name: String,
    pub login: String,
    pub object_id: String,
    pub tenant_id: String,
}

impl ActiveDirectoryAdministratorModel {
    fn body(&self) -> ServerAdministratorResource {
        ServerAdministratorResource {
            id: None,
            properties: ServerAdministratorProperties {
                administrator_type: "ActiveDirectory".to_string(),
                login: self.login.clone(),
                sid: self.object_id.clone(),
                tenant_id: self.tenant_id.clone(),
            },
        }
    }
}

/// The Microsoft Entra administrator of a single server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveDirectoryAdministratorResource;

impl ActiveDirectoryAdministratorResource {
    async fn put(
        &self,
        ctx: &ResourceContext,
        id: &AzureActiveDirectoryAdministratorId,
        model: &ActiveDirectoryAdministratorModel,
    ) -> Result<(), ProviderError> {
        ctx.client::<ServerAdministratorResource>(SINGLE_SERVER_API_VERSION)
            .put(&id.id(), &model.body())
            .await
    }
}

#[async_trait]
impl Resource for ActiveDirectoryAdministratorResource {
    type Model = ActiveDirectoryAdministratorModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_active_directory_administrator"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute("server_name", server_name_attribute())
            .with_attribute("resource_group_name", resource_group_attribute())
            .with_attribute(
                "login",
                Attribute::required_string().with_validator(Validator::StringNotEmpty),
            )
            .with_attribute(
                "object_id",
                Attribute::required_string().with_validator(Validator::IsUuid),
            )
            .with_attribute(
                "tenant_id",
                Attribute::required_string().with_validator(Validator::IsUuid),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        AzureActiveDirectoryAdministratorId::parse(id)
            .map(drop)
            .map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: ActiveDirectoryAdministratorModel,
    ) -> Result<ActiveDirectoryAdministratorModel, ProviderError> {
        let id = AzureActiveDirectoryAdministratorId::new(
            ctx.subscription_id(),
            &model.resource_group_name,
            &model.server_name,
            ADMINISTRATOR_NAME,
        );
        let existing = ctx
            .client::<ServerAdministratorResource>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("checking for presence of existing {id}")))?;
        ensure_absent(existing, self.type_name(), &id.id())?;

        self.put(ctx, &id, &model)
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;

        let model = ActiveDirectoryAdministratorModel {
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
        model: ActiveDirectoryAdministratorModel,
    ) -> Result<Option<ActiveDirectoryAdministratorModel>, ProviderError> {
        let id = AzureActiveDirectoryAdministratorId::parse(&model.id)?;
        let Some(admin) = ctx
            .client::<ServerAdministratorResource>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "administrator not found");
            return Ok(None);
        };

        Ok(Some(ActiveDirectoryAdministratorModel {
            id: id.id(),
            server_name: id.server_name,
            resource_group_name: id.resource_group_name,
            login: admin.properties.login,
            object_id: admin.properties.sid,
            tenant_id: admin.properties.tenant_id,
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        _prior: ActiveDirectoryAdministratorModel,
        planned: ActiveDirectoryAdministratorModel,
    ) -> Result<ActiveDirectoryAdministratorModel, ProviderError> {
        let id = AzureActiveDirectoryAdministratorId::parse(&planned.id)?;
        self.put(ctx, &id, &planned)
            .await
            .map_err(|e| e.context(format!("updating {id}")))?;
        self.read(ctx, planned)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found after update")))
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        model: ActiveDirectoryAdministratorModel,
    ) -> Result<(), ProviderError> {
        let id = AzureActiveDirectoryAdministratorId::parse(&model.id)?;
        ctx.client::<ServerAdministratorResource>(SINGLE_SERVER_API_VERSION)
            .delete(&id.id())
            .await
            .map_err(|e| e.context(format!("deleting {id}")))
    }
}
