use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::client::{TypedClient, SINGLE_SERVER_API_VERSION};
use crate::error::ProviderError;
use crate::ids::{IdKind, ResourceId, VirtualNetworkRuleId};
use crate::poller::{Refresh, NOT_FOUND_STATE};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema, Validator};
use crate::sdk::{VirtualNetworkRule, VirtualNetworkRuleProperties};
use crate::timeouts::Timeouts;

use super::{ensure_absent, resource_group_attribute, server_name_attribute, validate};

const PENDING_STATES: &[&str] = &["Initializing", "InProgress", "Unknown", NOT_FOUND_STATE];

/// State of `azurerm_postgresql_virtual_network_rule`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirtualNetworkRuleModel {
    pub id: String,
    pub name: String,
    pub resource_group_name: String,
    pub server_name: String,
    pub subnet_id: String,
    pub ignore_missing_vnet_service_endpoint: bool,
}

/// A subnet allowed to reach a single server.
#[derive(Debug, Clone, Copy, Default)]
pub struct VirtualNetworkRuleResource;

impl VirtualNetworkRuleResource {
    async fn put_and_wait(
        &self,
        ctx: &ResourceContext,
        id: &VirtualNetworkRuleId,
        model: &VirtualNetworkRuleModel,
    ) -> Result<(), ProviderError> {
        let client = ctx.client::<VirtualNetworkRule>(SINGLE_SERVER_API_VERSION);
        let body = VirtualNetworkRule {
            properties: VirtualNetworkRuleProperties {
                virtual_network_subnet_id: model.subnet_id.clone(),
                ignore_missing_vnet_service_endpoint: Some(
                    model.ignore_missing_vnet_service_endpoint,
                ),
                state: None,
            },
            ..Default::default()
        };
        client.put(&id.id(), &body).await?;

        // The rule reports Ready before the subnet is usable; require it to stay there.
        info!(%id, "waiting for virtual network rule to become ready");
        ctx.state_change(PENDING_STATES, &["Ready"], Duration::from_secs(60))
            .with_continuous_target_occurrence(5)
            .wait_for_state(|| refresh(&client, id))
            .await
            .map(drop)
            .map_err(|e| e.context(format!("waiting for {id} to become ready")))
    }
}

async fn refresh(
    client: &TypedClient<VirtualNetworkRule>,
    id: &VirtualNetworkRuleId,
) -> Result<Refresh, ProviderError> {
    Ok(match client.get(&id.id()).await? {
        Some(rule) => Refresh::state(rule.properties.state.unwrap_or_default()),
        None => Refresh::NotFound,
    })
}

#[async_trait]
impl Resource for VirtualNetworkRuleResource {
    type Model = VirtualNetworkRuleModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_virtual_network_rule"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(validate::virtual_network_rule_name()),
            )
            .with_attribute("resource_group_name", resource_group_attribute())
            .with_attribute("server_name", server_name_attribute())
            .with_attribute(
                "subnet_id",
                Attribute::required_string()
                    .with_validator(Validator::resource_id(IdKind::Subnet)),
            )
            .with_attribute(
                "ignore_missing_vnet_service_endpoint",
                Attribute::optional_bool().with_default(json!(false)),
            )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        VirtualNetworkRuleId::parse(id).map(drop).map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: VirtualNetworkRuleModel,
    ) -> Result<VirtualNetworkRuleModel, ProviderError> {
        let id = VirtualNetworkRuleId::new(
            ctx.subscription_id(),
            &model.resource_group_name,
            &model.server_name,
            &model.name,
        );
        let existing = ctx
            .client::<VirtualNetworkRule>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("checking for presence of existing {id}")))?;
        ensure_absent(existing, self.type_name(), &id.id())?;

        self.put_and_wait(ctx, &id, &model)
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;

        let model = VirtualNetworkRuleModel {
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
        model: VirtualNetworkRuleModel,
    ) -> Result<Option<VirtualNetworkRuleModel>, ProviderError> {
        let id = VirtualNetworkRuleId::parse(&model.id)?;
        let Some(rule) = ctx
            .client::<VirtualNetworkRule>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "virtual network rule not found");
            return Ok(None);
        };

        Ok(Some(VirtualNetworkRuleModel {
            id: id.id(),
            name: id.name,
            resource_group_name: id.resource_group_name,
            server_name: id.server_name,
            subnet_id: rule.properties.virtual_network_subnet_id,
            ignore_missing_vnet_service_endpoint: rule
                .properties
                .ignore_missing_vnet_service_endpoint
                .unwrap_or_default(),
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        _prior: VirtualNetworkRuleModel,
        planned: VirtualNetworkRuleModel,
    ) -> Result<VirtualNetworkRuleModel, ProviderError> {
        let id = VirtualNetworkRuleId::parse(&planned.id)?;
        self.put_and_wait(ctx, &id, &planned)
            .await
            .map_err(|e| e.context(format!("updating {id}")))?;
        self.read(ctx, planned)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found after update")))
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        model: VirtualNetworkRuleModel,
    ) -> Result<(), ProviderError> {
        let id = VirtualNetworkRuleId::parse(&model.id)?;
        ctx.client::<VirtualNetworkRule>(SINGLE_SERVER_API_VERSION)
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
    use tokio::time::Instant;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/servers/pgsrv/virtualNetworkRules/app-subnet";
    const SUBNET: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/net/providers/Microsoft.Network/virtualNetworks/vnet/subnets/app";

    fn config() -> serde_json::Value {
        json!({
            "name": "app-subnet",
            "resource_group_name": "rg",
            "server_name": "pgsrv",
            "subnet_id": SUBNET,
        })
    }

    fn rule(state: &str) -> Option<serde_json::Value> {
        Some(json!({
            "properties": {"virtualNetworkSubnetId": SUBNET, "state": state}
        }))
    }

    #[test]
    fn test_validate_subnet_id() {
        let resource = erase_resource(VirtualNetworkRuleResource);
        assert!(resource.validate(&config()).is_empty());

        let mut bad = config();
        bad["subnet_id"] = json!("/subscriptions/x/resourceGroups/net/providers/Microsoft.Network/virtualNetworks/vnet");
        let diagnostics = resource.validate(&bad);
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("subnet_id")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_stable_ready() {
        let fake = Arc::new(FakeArm::new());
        fake.on_write("/virtualNetworkRules/", |_, body| {
            body["properties"]["state"] = json!("Ready");
        });
        // import check, then the rule settles after a flap
        fake.script_get(
            ID,
            [
                None,
                None,
                rule("Initializing"),
                rule("Ready"),
                rule("InProgress"),
            ],
        );
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(VirtualNetworkRuleResource);

        let start = Instant::now();
        let state = resource.create(&ctx, config()).await.unwrap();
        assert_eq!(state["id"], ID);
        assert_eq!(state["ignore_missing_vnet_service_endpoint"], false);

        // 4 scripted polls plus 5 consecutive Ready observations, one minute apart
        let polls = fake.requests_to(Method::Get, ID).len() - 2;
        assert_eq!(polls, 9);
        assert!(start.elapsed() >= Duration::from_secs(8 * 60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_state_is_an_error() {
        let fake = Arc::new(FakeArm::new());
        fake.script_get(ID, [None, rule("Failed")]);
        let ctx = ResourceContext::new(fake.clone(), SUB);

        let err = erase_resource(VirtualNetworkRuleResource)
            .create(&ctx, config())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::FailedPrecondition(_)));
        assert!(err.message().contains("creating"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_is_idempotent() {
        let fake = Arc::new(FakeArm::new());
        fake.seed(ID, rule("Ready").unwrap_or_default());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(VirtualNetworkRuleResource);

        let state = resource.import(&ctx, ID).await.unwrap();
        assert_eq!(state["subnet_id"], SUBNET);
        resource.delete(&ctx, state.clone()).await.unwrap();
        resource.delete(&ctx, state).await.unwrap();
        assert!(!fake.contains(ID));
    }
}
