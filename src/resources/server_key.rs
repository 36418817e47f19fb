use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::SINGLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{IdKind, KeyVaultKeyUrl, ResourceId, ServerId, ServerKeyId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema, Validator};
use crate::sdk::{ServerKey, ServerKeyProperties};
use crate::timeouts::Timeouts;

use super::ensure_absent;

/// State of `azurerm_postgresql_server_key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerKeyModel {
    pub id: String,
    pub server_id: String,
    pub key_vault_key_id: String,
}

/// A customer managed key encrypting a single server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerKeyResource;

/// The key's name on the server, `{vault}_{key}_{version}`.
fn key_name(url: &KeyVaultKeyUrl) -> String {
    format!(
        "{}_{}_{}",
        url.vault_name,
        url.name,
        url.version.as_deref().unwrap_or_default()
    )
}

impl ServerKeyResource {
    /// Write the key named after `model.key_vault_key_id` and return its ID.
    async fn put_key(
        &self,
        ctx: &ResourceContext,
        model: &ServerKeyModel,
        check_existing: bool,
    ) -> Result<ServerKeyId, ProviderError> {
        let server = ServerId::parse(&model.server_id)?;
        let url = KeyVaultKeyUrl::parse(&model.key_vault_key_id, true)
            .map_err(|e| ProviderError::Validation(e.to_string()))?;
        let id = ServerKeyId::new(
            server.subscription_id.clone(),
            server.resource_group_name.clone(),
            server.server_name.clone(),
            key_name(&url),
        );

        let _guard = ctx.locks().lock(&server.id()).await;
        let client = ctx.client::<ServerKey>(SINGLE_SERVER_API_VERSION);
        if check_existing {
            let existing = client
                .get(&id.id())
                .await
                .map_err(|e| e.context(format!("checking for presence of existing {id}")))?;
            ensure_absent(existing, self.type_name(), &id.id())?;
        }

        info!(%id, key = %url.id(), "writing server key");
        let body = ServerKey {
            properties: ServerKeyProperties {
                server_key_type: "AzureKeyVault".to_string(),
                uri: Some(url.id()),
            },
            ..Default::default()
        };
        client.put(&id.id(), &body).await?;
        Ok(id)
    }
}

#[async_trait]
impl Resource for ServerKeyResource {
    type Model = ServerKeyModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_server_key"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "server_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::resource_id(IdKind::Server)),
            )
            .with_attribute(
                "key_vault_key_id",
                Attribute::required_string()
                    .with_validator(Validator::KeyVaultKeyUrl { versioned: true }),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 5, 60, 60)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        ServerKeyId::parse(id).map(drop).map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: ServerKeyModel,
    ) -> Result<ServerKeyModel, ProviderError> {
        let id = self
            .put_key(ctx, &model, true)
            .await
            .map_err(|e| e.context(format!("creating key for {}", model.server_id)))?;
        let model = ServerKeyModel {
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
        model: ServerKeyModel,
    ) -> Result<Option<ServerKeyModel>, ProviderError> {
        let id = ServerKeyId::parse(&model.id)?;
        let Some(key) = ctx
            .client::<ServerKey>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "server key not found");
            return Ok(None);
        };

        Ok(Some(ServerKeyModel {
            id: id.id(),
            server_id: id.server_id().id(),
            key_vault_key_id: key.properties.uri.unwrap_or_default(),
        }))
    }

    /// Rotating the key writes a new key resource; the ID follows it.
    async fn update(
        &self,
        ctx: &ResourceContext,
        _prior: ServerKeyModel,
        planned: ServerKeyModel,
    ) -> Result<ServerKeyModel, ProviderError> {
        let id = self
            .put_key(ctx, &planned, false)
            .await
            .map_err(|e| e.context(format!("updating key for {}", planned.server_id)))?;
        let model = ServerKeyModel {
            id: id.id(),
            ..planned
        };
        self.read(ctx, model)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found after update")))
    }

    async fn delete(&self, ctx: &ResourceContext, model: ServerKeyModel) -> Result<(), ProviderError> {
        let id = ServerKeyId::parse(&model.id)?;
        let _guard = ctx.locks().lock(&id.server_id().id()).await;
        ctx.client::<ServerKey>(SINGLE_SERVER_API_VERSION)
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
    use serde_json::json;
    use std::sync::Arc;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const SERVER: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/servers/pgsrv";
    const KEY_V1: &str = "https://contoso.vault.azure.net/keys/pg-key/0123abcd";
    const KEY_V2: &str = "https://contoso.vault.azure.net/keys/pg-key/4567ef89";

    fn config(key: &str) -> serde_json::Value {
        json!({"server_id": SERVER, "key_vault_key_id": key})
    }

    #[test]
    fn test_key_name() {
        let url = KeyVaultKeyUrl::parse(KEY_V1, true).unwrap();
        assert_eq!(key_name(&url), "contoso_pg-key_0123abcd");
    }

    #[test]
    fn test_unversioned_key_rejected() {
        let diagnostics = erase_resource(ServerKeyResource)
            .validate(&config("https://contoso.vault.azure.net/keys/pg-key"));
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("key_vault_key_id")));
    }

    #[tokio::test]
    async fn test_create_and_rotate() {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(ServerKeyResource);

        let state = resource.create(&ctx, config(KEY_V1)).await.unwrap();
        let v1_id = format!("{SERVER}/keys/contoso_pg-key_0123abcd");
        assert_eq!(state["id"], v1_id.as_str());
        assert_eq!(state["server_id"], SERVER);
        let put = &fake.requests_to(Method::Put, &v1_id)[0];
        assert_eq!(
            put.body.as_ref().unwrap()["properties"],
            json!({"serverKeyType": "AzureKeyVault", "uri": KEY_V1})
        );

        let plan = resource.plan(Some(&state), config(KEY_V2)).unwrap();
        assert!(!plan.requires_replace);
        let rotated = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(
            rotated["id"],
            format!("{SERVER}/keys/contoso_pg-key_4567ef89").as_str()
        );
        assert_eq!(rotated["key_vault_key_id"], KEY_V2);
        assert_eq!(ctx.locks().len(), 1);
    }
}
