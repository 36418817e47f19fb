use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::SINGLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{DatabaseId, ResourceId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema, Validator};
use crate::sdk::{Database, DatabaseProperties};
use crate::timeouts::Timeouts;

use super::{ensure_absent, resource_group_attribute, server_name_attribute, validate};

/// State of `azurerm_postgresql_database`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseModel {
    pub id: String,
    pub name: String,
    pub resource_group_name: String,
    pub server_name: String,
    pub charset: String,
    pub collation: String,
}

/// A database on a single server.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseResource;

#[async_trait]
impl Resource for DatabaseResource {
    type Model = DatabaseModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_database"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(validate::database_name()),
            )
            .with_attribute("resource_group_name", resource_group_attribute())
            .with_attribute("server_name", server_name_attribute())
            .with_attribute(
                "charset",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::StringNotWhitespace),
            )
            .with_attribute(
                "collation",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::StringNotWhitespace),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        DatabaseId::parse(id).map(drop).map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: DatabaseModel,
    ) -> Result<DatabaseModel, ProviderError> {
        let id = DatabaseId::new(
            ctx.subscription_id(),
            &model.resource_group_name,
            &model.server_name,
            &model.name,
        );
        let client = ctx.client::<Database>(SINGLE_SERVER_API_VERSION);

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

        let model = DatabaseModel {
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
        model: DatabaseModel,
    ) -> Result<Option<DatabaseModel>, ProviderError> {
        let id = DatabaseId::parse(&model.id)?;
        let Some(db) = ctx
            .client::<Database>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "database not found");
            return Ok(None);
        };

        Ok(Some(DatabaseModel {
            id: id.id(),
            name: id.name,
            resource_group_name: id.resource_group_name,
            server_name: id.server_name,
            charset: db.properties.charset.unwrap_or_default(),
            collation: db.properties.collation.unwrap_or_default(),
        }))
    }

    async fn delete(&self, ctx: &ResourceContext, model: DatabaseModel) -> Result<(), ProviderError> {
        let id = DatabaseId::parse(&model.id)?;
        ctx.client::<Database>(SINGLE_SERVER_API_VERSION)
            .delete(&id.id())
            .await
            .map_err(|e| e.context(format!("deleting {id}")))
    }
}
