use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::SINGLE_SERVER_API_VERSION;
use crate::error::ProviderError;
use crate::ids::{FirewallRuleId, ResourceId};
use crate::resource::{Resource, ResourceContext};
use crate::schema::{Attribute, Schema, Validator};
use crate::sdk::{FirewallRule, FirewallRuleProperties};
use crate::timeouts::Timeouts;

use super::{ensure_absent, resource_group_attribute, server_name_attribute, validate};

/// State of `azurerm_postgresql_firewall_rule`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewallRuleModel {
    pub id: String,
    pub name: String,
    pub resource_group_name: String,
    pub server_name: String,
    pub start_ip_address: String,
    pub end_ip_address: String,
}

impl FirewallRuleModel {
    fn body(&self) -> FirewallRule {
        FirewallRule {
            properties: FirewallRuleProperties {
                start_ip_address: self.start_ip_address.clone(),
                end_ip_address: self.end_ip_address.clone(),
            },
            ..Default::default()
        }
    }
}

/// A firewall rule on a single server.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirewallRuleResource;

/// The start and end address attributes shared by both server families.
pub(crate) fn address_range_schema(schema: Schema) -> Schema {
    schema
        .with_attribute(
            "start_ip_address",
            Attribute::required_string().with_validator(Validator::IsIpv4Address),
        )
        .with_attribute(
            "end_ip_address",
            Attribute::required_string().with_validator(Validator::IsIpv4Address),
        )
}

#[async_trait]
impl Resource for FirewallRuleResource {
    type Model = FirewallRuleModel;

    fn type_name(&self) -> &'static str {
        "azurerm_postgresql_firewall_rule"
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
                .with_attribute("resource_group_name", resource_group_attribute())
                .with_attribute("server_name", server_name_attribute()),
        )
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 5, 30, 30)
    }

    fn validate_id(&self, id: &str) -> Result<(), ProviderError> {
        FirewallRuleId::parse(id).map(drop).map_err(Into::into)
    }

    async fn create(
        &self,
        ctx: &ResourceContext,
        model: FirewallRuleModel,
    ) -> Result<FirewallRuleModel, ProviderError> {
        let id = FirewallRuleId::new(
            ctx.subscription_id(),
            &model.resource_group_name,
            &model.server_name,
            &model.name,
        );
        let client = ctx.client::<FirewallRule>(SINGLE_SERVER_API_VERSION);

        let existing = client
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("checking for presence of existing {id}")))?;
        ensure_absent(existing, self.type_name(), &id.id())?;

        client
            .put(&id.id(), &model.body())
            .await
            .map_err(|e| e.context(format!("creating {id}")))?;

        let model = FirewallRuleModel {
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
        model: FirewallRuleModel,
    ) -> Result<Option<FirewallRuleModel>, ProviderError> {
        let id = FirewallRuleId::parse(&model.id)?;
        let Some(rule) = ctx
            .client::<FirewallRule>(SINGLE_SERVER_API_VERSION)
            .get(&id.id())
            .await
            .map_err(|e| e.context(format!("retrieving {id}")))?
        else {
            debug!(%id, "firewall rule not found");
            return Ok(None);
        };

        Ok(Some(FirewallRuleModel {
            id: id.id(),
            name: id.name,
            resource_group_name: id.resource_group_name,
            server_name: id.server_name,
            start_ip_address: rule.properties.start_ip_address,
            end_ip_address: rule.properties.end_ip_address,
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        _prior: FirewallRuleModel,
        planned: FirewallRuleModel,
    ) -> Result<FirewallRuleModel, ProviderError> {
        let id = FirewallRuleId::parse(&planned.id)?;
        ctx.client::<FirewallRule>(SINGLE_SERVER_API_VERSION)
            .put(&id.id(), &planned.body())
            .await
            .map_err(|e| e.context(format!("updating {id}")))?;
        self.read(ctx, planned)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{id} was not found after update")))
    }

    async fn delete(
        &self,
        ctx: &ResourceContext,
        model: FirewallRuleModel,
    ) -> Result<(), ProviderError> {
        let id = FirewallRuleId::parse(&model.id)?;
        ctx.client::<FirewallRule>(SINGLE_SERVER_API_VERSION)
            .delete(&id.id())
            .await
            .map_err(|e| e.context(format!("deleting {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ArmTransport;
    use crate::resource::erase_resource;
    use crate::testing::{FakeArm, Method};
    use serde_json::json;
    use std::sync::Arc;

    const SUB: &str = "00000000-0000-0000-0000-000000000000";
    const ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/servers/pgsrv/firewallRules/office";

    fn config(end: &str) -> serde_json::Value {
        json!({
            "name": "office",
            "resource_group_name": "rg",
            "server_name": "pgsrv",
            "start_ip_address": "10.0.0.1",
            "end_ip_address": end,
        })
    }

    #[test]
    fn test_validate_addresses() {
        let resource = erase_resource(FirewallRuleResource);
        assert!(resource.validate(&config("10.0.0.9")).is_empty());
        let diagnostics = resource.validate(&config("10.0.0.256"));
        assert!(diagnostics
            .iter()
            .any(|d| d.attribute.as_deref() == Some("end_ip_address")));
    }

    #[tokio::test]
    async fn test_update_in_place() {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(FirewallRuleResource);

        let created = resource.create(&ctx, config("10.0.0.1")).await.unwrap();
        let plan = resource
            .plan(Some(&created), config("10.0.0.9"))
            .unwrap();
        assert!(!plan.requires_replace);
        assert_eq!(plan.changes.len(), 1);

        let updated = resource
            .update(&ctx, created, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(updated["end_ip_address"], "10.0.0.9");
        assert_eq!(fake.requests_to(Method::Put, ID).len(), 2);
    }

    #[tokio::test]
    async fn test_read_after_out_of_band_delete() {
        let fake = Arc::new(FakeArm::new());
        let ctx = ResourceContext::new(fake.clone(), SUB);
        let resource = erase_resource(FirewallRuleResource);

        let created = resource.create(&ctx, config("10.0.0.1")).await.unwrap();
        fake.delete(ID, SINGLE_SERVER_API_VERSION).await.unwrap();
        assert!(resource.read(&ctx, created).await.unwrap().is_null());
    }
}
