use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::SINGLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{ConfigurationId, ResourceId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema, Validator};
use crate::sdk::Configuration;
use crate::timeouts::Timeouts;

use super::{resource_group_attribute, server_name_attribute};

/// State of `azurerm_postgresql_configuration`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigurationModel {
    pub id: String,
    pub name: String,
    pub resource_group_name: String,
    pub server_name: String,
    pub value: String,
}

/// A server parameter override on a single server.
///
/// Settings always exist on the server, so creating one writes a
/// user override and deleting one restores the server's default value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigurationResource;

#[async_trait]
impl Resource for ConfigurationResource {
    type Model = ConfigurationModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_configuration"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::StringNotEmpty),
            )
            .with_attribute("resource_group_name", resource_group_attribute())
            .with_attribute("server_name", server_name_attribute())
            .with_attribute(
                "value",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::StringNotEmpty),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        ConfigurationId::parse(id).map(drop).map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: ConfigurationModel,
    ) -> Result<ConfigurationModel, ProviderError> {
        let id = ConfigurationId::new(
            ctx.subscription_id(),
            &model.resource_group_name,
            &model.server_name,
            &model.name,
        );
        let server_id = id.server_id().id();
        let _guard = ctx.locks().lock(&server_id).await;

        info!(%id, value = %model.value, "setting server parameter");
        ctx.client::<Configuration>(SINGLE_SERVER_API_VERSION)
            .put(&id.id(), &Configuration::user_override(&model.value))
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;

        let model = ConfigurationModel {
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
        model: ConfigurationModel,
    ) -> Result<Option<ConfigurationModel>, ProviderError> {
        let id = ConfigurationId::parse(&model.id)?;
        let Some(config) = ctx
            .client::<Configuration>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "configuration not found");
            return Ok(None);
        };

        Ok(Some(ConfigurationModel {
            id: id.id(),
            name: id.name,
            resource_group_name: id.resource_group_name,
            server_name: id.server_name,
            value: config.properties.value.unwrap_or_default(),
        }))
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        model: ConfigurationModel,
    ) -> Result<(), ProviderError> {
        let id = ConfigurationId::parse(&model.id)?;
        let _guard = ctx.locks().lock(&id.server_id().id()).await;
        let client = ctx.client::<Configuration>(SINGLE_SERVER_API_VERSION);

        let Some(current) = client
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            return Ok(());
        };
        let Some(default) = current.properties.default_value else {
            return Err(ProviderError::Sdk(format!(
                "{id} has no default value to reset to"
            )));
        };

        info!(%id, %default, "resetting server parameter to its default");
        client
            .put(&id.id(), &Configuration::system_default(default))
            .await
            .map_err(|e| e.context(format!("resetting {id} to its default value")))
    }
}
