use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::client::FLEXIBLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{FlexibleServerConfigurationId, FlexibleServerId, ResourceId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema, Validator};
use crate::sdk::Configuration;
use crate::timeouts::Timeouts;

use super::flexible_server_id_attribute;

/// State of `azurerm_postgresql_flexible_server_configuration`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexibleServerConfigurationModel {
    pub id: String,
    pub name: String,
    pub server_id: String,
    pub value: String,
}

/// A server parameter override on a flexible server.
///
/// Static parameters only take effect after a restart, which is issued
/// whenever such a parameter is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexibleServerConfigurationResource;

impl FlexibleServerConfigurationResource {
    /// Write `body` and restart the server if the parameter is static.
    async fn apply(
        &self,
        ctx: &ResourceContext,
        id: &FlexibleServerConfigurationId,
        body: &Configuration,
    ) -> Result<(), ProviderError> {
        let server = id.flexible_server_id();
        let _guard = ctx.locks().lock(&server.id()).await;
        let client = ctx.client::<Configuration>(FLEXIBLE_SERVER_API_VERSION);

        client.put(&id.id(), body).await?;

        let written = client.get(&id.id()).await?;
        let is_static = written
            .and_then(|c| c.properties.is_dynamic_config)
            .is_some_and(|dynamic| !dynamic);
        if is_static {
            restart(ctx, &server).await?;
        }
        Ok(())
    }
}

async fn restart(ctx: &ResourceContext, server: &FlexibleServerId) -> Result<(), ProviderError> {
    info!(%server, "restarting server to apply a static parameter");
    ctx.arm()
        .post(
            &format!("{}/restart", server.id()),
            FLEXIBLE_SERVER_API_VERSION,
            &json!({}),
        )
        .await
        .map(drop)
        .map_err(|e| e.context(format!("restarting {server}")))
}

#[async_trait]
impl Resource for FlexibleServerConfigurationResource {
    type Model = FlexibleServerConfigurationModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_flexible_server_configuration"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::StringNotEmpty),
            )
            .with_attribute("server_id", flexible_server_id_attribute())
            .with_attribute(
                "value",
                Attribute::required_string().with_validator(Validator::StringNotEmpty),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        FlexibleServerConfigurationId::parse(id)
            .map(drop)
            .map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: FlexibleServerConfigurationModel,
    ) -> Result<FlexibleServerConfigurationModel, ProviderError> {
        let server = FlexibleServerId::parse(&model.server_id)?;
        let id = FlexibleServerConfigurationId::new(
            server.subscription_id,
            server.resource_group_name,
            server.flexible_server_name,
            &model.name,
        );

        info!(%id, value = %model.value, "setting server parameter");
        self.apply(ctx, &id, &Configuration::user_override(&model.value))
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;

        let model = FlexibleServerConfigurationModel {
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
        model: FlexibleServerConfigurationModel,
    ) -> Result<Option<FlexibleServerConfigurationModel>, ProviderError> {
        let id = FlexibleServerConfigurationId::parse(&model.id)?;
        let Some(config) = ctx
            .client::<Configuration>(FLEXIBLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "configuration not found");
            return Ok(None);
        };

        Ok(Some(FlexibleServerConfigurationModel {
            server_id: id.flexible_server_id().id(),
            id: id.id(),
            name: id.name,
            value: config.properties.value.unwrap_or_default(),
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        _prior: FlexibleServerConfigurationModel,
        planned: FlexibleServerConfigurationModel,
    ) -> Result<FlexibleServerConfigurationModel, ProviderError> {
        let id = FlexibleServerConfigurationId::parse(&planned.id)?;
        self.apply(ctx, &id, &Configuration::user_override(&planned.value))
            .await
            .map_err(|e| e.context(format!("updating {id}")))?;
        self.read(ctx, planned)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found after update")))
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        model: FlexibleServerConfigurationModel,
    ) -> Result<(), ProviderError> {
        let id = FlexibleServerConfigurationId::parse(&model.id)?;
        let Some(current) = ctx
            .client::<Configuration>(FLEXIBLE_SERVER_API_VERSION)
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
        self.apply(ctx, &id, &Configuration::system_default(default))
            .await
            .map_err(|e| e.context(format!("resetting {id} to its default value")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::erase_resource;
    use crate::testing::{FakeArm, Method};
    use std::sync::Arc;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const SERVER: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/flexibleServers/flex";

    fn seed(fake: &FakeArm, name: &str, default: &str, dynamic: bool) -> String {
        let id = format!("{SERVER}/configurations/{name}");
        fake.seed(
            &id,
            json!({"properties": {
                "value": default,
                "defaultValue": default,
                "source": "system-default",
                "isDynamicConfig": dynamic,
            }}),
        );
        id
    }

    fn restarts(fake: &FakeArm) -> usize {
        fake.requests_to(Method::Post, &format!("{SERVER}/restart"))
            .len()
    }

    #[tokio::test]
    async fn test_dynamic_parameter_does_not_restart() {
        let fake = Arc::new(FakeArm::new());
        let id = seed(&fake, "log_min_duration_statement", "-1", true);
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(FlexibleServerConfigurationResource);

        let config = json!({"name": "log_min_duration_statement", "server_id": SERVER, "value": "250"});
        let state = resource.create(&ctx, config).await.unwrap();
        assert_eq!(state["id"], id.as_str());
        assert_eq!(state["value"], "250");
        assert_eq!(restarts(&fake), 0);
    }

    #[tokio::test]
    async fn test_static_parameter_restarts_server() {
        let fake = Arc::new(FakeArm::new());
        let id = seed(&fake, "shared_preload_libraries", "pg_stat_statements", false);
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(FlexibleServerConfigurationResource);

        let config = json!({
            "name": "shared_preload_libraries",
            "server_id": SERVER,
            "value": "pg_cron,pg_stat_statements",
        });
        let state = resource.create(&ctx, config.clone()).await.unwrap();
        assert_eq!(restarts(&fake), 1);

        let mut changed = config;
        changed["value"] = json!("pg_cron");
        let plan = resource.plan(Some(&state), changed).unwrap();
        assert!(!plan.requires_replace);
        let state = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(state["value"], "pg_cron");
        assert_eq!(restarts(&fake), 2);

        resource.delete(&ctx, state).await.unwrap();
        assert_eq!(
            fake.object(&id).unwrap()["properties"]["value"],
            "pg_stat_statements"
        );
        assert_eq!(restarts(&fake), 3);
    }
}
