//! Azure Database for PostgreSQL resources for Hemmer providers.
//!
//! This crate manages PostgreSQL single servers and flexible servers through
//! Azure Resource Manager, together with their databases, firewall rules,
//! virtual network rules, server parameters, Entra ID administrators and
//! customer-managed keys.
//!
//! # Overview
//!
//! - **Resource IDs**: typed, case-sensitive parsers and formatters for every
//!   managed ID ([`ids`])
//! - **Long-running operations**: a generic state poller ([`poller`]) and an
//!   ARM client that follows `Azure-AsyncOperation` and `Location` ([`client`])
//! - **Lifecycle**: the [`Resource`] and [`DataSource`] traits, bounded by
//!   per-operation [`timeouts`] and serialised through a [`locks`] registry
//! - **Service**: [`PostgresProvider`] implements [`ProviderService`] by
//!   dispatching on the resource type name
//! - **Logging**: `tracing` to stderr ([`logging`])
//!
//! # Quick Start
//!
//! ```ignore
//! use azurerm_postgresql::{init_logging, PostgresProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = PostgresProvider::new();
//!     provider
//!         .configure(json!({
//!             "subscription_id": "00000000-0000-0000-0000-000000000000",
//!             "tenant_id": "00000000-0000-0000-0000-000000000000",
//!             "client_id": "00000000-0000-0000-0000-000000000000",
//!             "client_secret": "secret",
//!         }))
//!         .await?;
//!
//!     let plan = provider
//!         .plan(
//!             "azurerm_postgresql_flexible_server_database",
//!             None,
//!             json!({"name": "app", "server_id": "/subscriptions/.../flexibleServers/flex"}),
//!             json!({}),
//!         )
//!         .await?;
//!     let state = provider
//!         .create("azurerm_postgresql_flexible_server_database", plan.planned_state)
//!         .await?;
//!     tracing::info!(id = %state["id"], "created");
//!     Ok(())
//! }
//! ```
//!
//! # Resource Types
//!
//! | Type | Parent |
//! |------|--------|
//! | `azurerm_postgresql_server` | resource group |
//! | `azurerm_postgresql_database` | single server |
//! | `azurerm_postgresql_firewall_rule` | single server |
//! | `azurerm_postgresql_virtual_network_rule` | single server |
//! | `azurerm_postgresql_configuration` | single server |
//! | `azurerm_postgresql_active_directory_administrator` | single server |
//! | `azurerm_postgresql_server_key` | single server |
//! | `azurerm_postgresql_flexible_server` | resource group |
//! | `azurerm_postgresql_flexible_server_database` | flexible server |
//! | `azurerm_postgresql_flexible_server_firewall_rule` | flexible server |
//! | `azurerm_postgresql_flexible_server_configuration` | flexible server |
//!
//! Data sources `azurerm_postgresql_server` and
//! `azurerm_postgresql_flexible_server` look up existing servers by name.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod ids;
pub mod locks;
pub mod logging;
pub mod plan;
pub mod poller;
pub mod registration;
pub mod resource;
pub mod schema;
pub mod sdk;
pub mod service;
pub mod testing;
pub mod timeouts;
pub mod types;
pub mod validation;

mod resources;

// Re-export main types at crate root
pub use client::{ArmClient, ArmTransport};
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use ids::{IdKind, ResourceId};
pub use locks::LockRegistry;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use poller::{Refresh, StateChangeConf};
pub use registration::{PostgresRegistration, ServiceRegistration};
pub use resource::{DataSource, Resource, ResourceContext};
pub use schema::ProviderSchema;
pub use service::{PostgresProvider, ProviderService};
pub use timeouts::Timeouts;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
