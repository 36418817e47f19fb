use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::client::FLEXIBLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{FlexibleServerDatabaseId, FlexibleServerId, ResourceId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema, Validator};
use crate::sdk::{Database, DatabaseProperties};
use crate::timeouts::Timeouts;

use super::{ensure_absent, flexible_server_id_attribute, validate};

/// State of `azurerm_postgresql_flexible_server_database`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexibleServerDatabaseModel {
    pub id: String,
    pub name: String,
    pub server_id: String,
    pub charset: String,
    pub collation: String,
}

/// A database on a flexible server.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexibleServerDatabaseResource;

#[async_trait]
impl Resource for FlexibleServerDatabaseResource {
    type Model = FlexibleServerDatabaseModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_flexible_server_database"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(validate::database_name()),
            )
            .with_attribute("server_id", flexible_server_id_attribute())
            .with_attribute(
                "charset",
                Attribute::optional_string()
                    .with_force_new()
                    .with_default(json!("UTF8"))
                    .with_validator(Validator::StringNotWhitespace),
            )
            .with_attribute(
                "collation",
                Attribute::optional_string()
                    .with_force_new()
                    .with_default(json!("en_US.utf8"))
                    .with_validator(Validator::StringNotWhitespace),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        FlexibleServerDatabaseId::parse(id)
            .map(drop)
            .map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: FlexibleServerDatabaseModel,
    ) -> Result<FlexibleServerDatabaseModel, ProviderError> {
        let server = FlexibleServerId::parse(&model.server_id)?;
        let id = FlexibleServerDatabaseId::new(
            &server.subscription_id,
            &server.resource_group_name,
            &server.flexible_server_name,
            &model.name,
        );
        let _guard = ctx.locks().lock(&server.id()).await;
        let client = ctx.client::<Database>(FLEXIBLE_SERVER_API_VERSION);

        let existing = client
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("checking for presence of existing {id}")))?;
        ensure_absent(existing, self.type_name(), &id.id())?;

        let body = Database {
            properties: DatabaseProperties {
                charset: Some(model.charset.clone()),
                collation: Some(model.collation.clone()),
            },
            ..Default::default()
        };
        client
            .put(&id.id(), &body)
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;

        let model = FlexibleServerDatabaseModel {
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
        model: FlexibleServerDatabaseModel,
    ) -> Result<Option<FlexibleServerDatabaseModel>, ProviderError> {
        let id = FlexibleServerDatabaseId::parse(&model.id)?;
        let Some(db) = ctx
            .client::<Database>(FLEXIBLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "database not found");
            return Ok(None);
        };

        Ok(Some(FlexibleServerDatabaseModel {
            server_id: id.flexible_server_id().id(),
            id: id.id(),
            name: id.name,
            charset: db.properties.charset.unwrap_or_default(),
            collation: db.properties.collation.unwrap_or_default(),
        }))
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        model: FlexibleServerDatabaseModel,
    ) -> Result<(), ProviderError> {
        let id = FlexibleServerDatabaseId::parse(&model.id)?;
        let _guard = ctx.locks().lock(&id.flexible_server_id().id()).await;
        ctx.client::<Database>(FLEXIBLE_SERVER_API_VERSION)
            .delete(&id.id())
            .await
            .map_err(|e| e.context(format!("deleting {id}")))
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

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let id = format!("{SERVER}/databases/app");

        let state = erase_resource(FlexibleServerDatabaseResource)
            .create(&ctx, json!({"name": "app", "server_id": SERVER}))
            .await
            .unwrap();
        assert_eq!(state["id"], id.as_str());
        assert_eq!(state["charset"], "UTF8");
        assert_eq!(state["collation"], "en_US.utf8");

        let put = &fake.requests_to(Method::Put, &id)[0];
        assert_eq!(
            put.body.as_ref().unwrap()["properties"],
            json!({"charset": "UTF8", "collation": "en_US.utf8"})
        );
    }

    #[tokio::test]
    async fn test_collation_change_replaces() {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake, SUB);
        let resource = erase_resource(FlexibleServerDatabaseResource);

        let state = resource
            .create(&ctx, json!({"name": "app", "server_id": SERVER}))
            .await
            .unwrap();
        let plan = resource
            .plan(
                Some(&state),
                json!({"name": "app", "server_id": SERVER, "collation": "C"}),
            )
            .unwrap();
        assert!(plan.requires_replace);
    }
}
