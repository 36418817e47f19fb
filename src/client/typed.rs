//! Serde-typed access to one kind of ARM entity.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::ArmTransport;
use crate::error::ProviderError;

/// A thin wrapper over [`ArmTransport`] that (de)serializes `M`.
#[derive(Debug)]
pub struct TypedClient<M> {
    arm: Arc<dyn ArmTransport>,
    api_version: &'static str,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for TypedClient<M> {
    fn clone(&self) -> Self {
        Self {
            arm: Arc::clone(&self.arm),
            api_version: self.api_version,
            _model: PhantomData,
        }
    }
}

impl<M> TypedClient<M>
where
    M: Serialize + DeserializeOwned,
{
    /// Bind `arm` to `api_version`.
    pub fn new(arm: Arc<dyn ArmTransport>, api_version: &'static str) -> Self {
        Self {
            arm,
            api_version,
            _model: PhantomData,
        }
    }

    /// The API version requests are sent with.
    pub fn api_version(&self) -> &'static str {
        self.api_version
    }

    /// Fetch `id`, or `None` if it does not exist.
    pub async fn get(&self, id: &str) -> Result<Option<M>, ProviderError> {
        match self.arm.get(id, self.api_version).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    /// List every entity in the collection at `path`.
    pub async fn list(&self, path: &str) -> Result<Vec<M>, ProviderError> {
        self.arm
            .list(path, self.api_version)
            .await?
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(ProviderError::from))
            .collect()
    }

    /// Create or replace `id` with `model`.
    pub async fn put<B: Serialize + ?Sized>(&self, id: &str, model: &B) -> Result<(), ProviderError> {
        let body = serde_json::to_value(model)?;
        self.arm.put(id, self.api_version, &body).await.map(drop)
    }

    /// Apply a partial update to `id`.
    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        id: &str,
        update: &B,
    ) -> Result<(), ProviderError> {
        let body = serde_json::to_value(update)?;
        self.arm.patch(id, self.api_version, &body).await.map(drop)
    }

    /// Delete `id`. Already-gone entities are not an error.
    pub async fn delete(&self, id: &str) -> Result<(), ProviderError> {
        self.arm.delete(id, self.api_version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::FirewallRule;
    use crate::testing::FakeArm;
    use serde_json::json;

    const RULE: &str = "/subscriptions/s/resourceGroups/rg/providers/Microsoft.DBforPostgreSQL/servers/srv/firewallRules/office";

    #[tokio::test]
    async fn test_typed_round_trip() {
        let fake = Arc::new(FakeArm::new());
        let client: TypedClient<FirewallRule> =
            TypedClient::new(fake.clone(), super::super::SINGLE_SERVER_API_VERSION);

        assert!(client.get(RULE).await.unwrap().is_none());

        client
            .put(
                RULE,
                &json!({"properties": {"startIpAddress": "10.0.0.1", "endIpAddress": "10.0.0.9"}}),
            )
            .await
            .unwrap();

        let rule = client.get(RULE).await.unwrap().unwrap();
        assert_eq!(rule.properties.start_ip_address, "10.0.0.1");
        assert_eq!(rule.properties.end_ip_address, "10.0.0.9");

        client.delete(RULE).await.unwrap();
        client.delete(RULE).await.unwrap();
        assert!(client.get(RULE).await.unwrap().is_none());
    }
}
