use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::FLEXIBLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{FlexibleServerFirewallRuleId, FlexibleServerId, ResourceId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema};
use crate::sdk::{FirewallRule, FirewallRuleProperties};
use crate::timeouts::Timeouts;

use super::firewall_rule::address_range_schema;
use super::{ensure_absent, flexible_server_id_attribute, validate};

/// State of `azurerm_postgresql_flexible_server_firewall_rule`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlexibleServerFirewallRuleModel {
    pub id: String,
    pub name: String,
    pub server_id: String,
    pub start_ip_address: String,
    pub end_ip_address: String,
}

/// A firewall rule on a flexible server.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlexibleServerFirewallRuleResource;

impl FlexibleServerFirewallRuleResource {
    async fn put(
        &self,
        ctx: &ResourceContext,
        id: &FlexibleServerFirewallRuleId,
        model: &FlexibleServerFirewallRuleModel,
    ) -> Result<(), ProviderError> {
        let body = FirewallRule {
            properties: FirewallRuleProperties {
                start_ip_address: model.start_ip_address.clone(),
                end_ip_address: model.end_ip_address.clone(),
            },
            ..Default::default()
        };
        ctx.client::<FirewallRule>(FLEXIBLE_SERVER_API_VERSION)
            .put(&id.id(), &body)
            .await
    }
}

#[async_trait]
impl Resource for FlexibleServerFirewallRuleResource {
    type Model = FlexibleServerFirewallRuleModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_flexible_server_firewall_rule"
    }

    fn schema(&self) -> Schema {
        address_range_schema(
            Schema::v0()
                .with_attribute(
                    "name",
                    Attribute::required_string()
                        .with_force_new()
                        .with_validator(validate::firewall_rule_name()),
                )
                .with_attribute("server_id", flexible_server_id_attribute()),
        )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        FlexibleServerFirewallRuleId::parse(id)
            .map(drop)
            .map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: FlexibleServerFirewallRuleModel,
    ) -> Result<FlexibleServerFirewallRuleModel, ProviderError> {
        let server = FlexibleServerId::parse(&model.server_id)?;
        let id = FlexibleServerFirewallRuleId::new(
            server.subscription_id,
            server.resource_group_name,
            server.flexible_server_name,
            &model.name,
        );

        let existing = ctx
            .client::<FirewallRule>(FLEXIBLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("checking for presence of existing {id}")))?;
        ensure_absent(existing, self.type_name(), &id.id())?;

        self.put(ctx, &id, &model)
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;

        let model = FlexibleServerFirewallRuleModel {
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
        model: FlexibleServerFirewallRuleModel,
    ) -> Result<Option<FlexibleServerFirewallRuleModel>, ProviderError> {
        let id = FlexibleServerFirewallRuleId::parse(&model.id)?;
        let Some(rule) = ctx
            .client::<FirewallRule>(FLEXIBLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "firewall rule not found");
            return Ok(None);
        };

        Ok(Some(FlexibleServerFirewallRuleModel {
            server_id: id.flexible_server_id().id(),
            id: id.id(),
            name: id.name,
            start_ip_address: rule.properties.start_ip_address,
            end_ip_address: rule.properties.end_ip_address,
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        _prior: FlexibleServerFirewallRuleModel,
        planned: FlexibleServerFirewallRuleModel,
    ) -> Result<FlexibleServerFirewallRuleModel, ProviderError> {
        let id = FlexibleServerFirewallRuleId::parse(&planned.id)?;
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
        model: FlexibleServerFirewallRuleModel,
    ) -> Result<(), ProviderError> {
        let id = FlexibleServerFirewallRuleId::parse(&model.id)?;
        ctx.client::<FirewallRule>(FLEXIBLE_SERVER_API_VERSION)
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
    const SERVER: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/flexibleServers/flex";

    fn config(start: &str, end: &str) -> serde_json::Value {
        json!({
            "name": "office",
            "server_id": SERVER,
            "start_ip_address": start,
            "end_ip_address": end,
        })
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(FlexibleServerFirewallRuleResource);
        let id = format!("{SERVER}/firewallRules/office");

        let state = resource
            .create(&ctx, config("10.0.0.1", "10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(state["id"], id.as_str());
        assert_eq!(state["server_id"], SERVER);
        assert_eq!(
            fake.requests_to(Method::Put, &id)[0].api_version,
            FLEXIBLE_SERVER_API_VERSION
        );

        let plan = resource
            .plan(Some(&state), config("10.0.0.1", "10.0.0.255"))
            .unwrap();
        let updated = resource
            .update(&ctx, state, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(updated["end_ip_address"], "10.0.0.255");

        resource.delete(&ctx, updated.clone()).await.unwrap();
        assert!(resource.read(&ctx, updated).await.unwrap().is_null());
    }

    #[test]
    fn test_server_id_must_be_flexible() {
        let mut bad = config("10.0.0.1", "10.0.0.1");
        bad["server_id"] = json!(SERVER.replace("flexibleServers", "servers"));
        let diagnostics = erase_resource(FlexibleServerFirewallRuleResource).validate(&bad);
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("server_id")));
    }
}
