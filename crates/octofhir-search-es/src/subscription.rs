//! Matching of changed resources against active Subscriptions.
//!
//! Resource changes arrive as a batch of [`ChangeRecord`]s from the store's
//! change stream. Each created or updated resource is checked in memory
//! against the criteria of every active `Subscription`, and one notification
//! per match is handed to a [`NotificationSink`].

use async_trait::async_trait;
use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SearchSettings;
use crate::error::{Result, SearchError};
use crate::matcher::matches;
use crate::query::{ParsedQuery, parse_query_string};
use crate::refresh_cache::AsyncRefreshCache;
use crate::registry::SearchParameterRegistry;

/// Entries per [`NotificationSink::publish_batch`] call.
pub const MAX_BATCH_SIZE: usize = 10;

/// Status of documents that are live, i.e. not deleted or pending.
pub const AVAILABLE_STATUS: &str = "AVAILABLE";

/// Active Subscription with its criteria already parsed.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: String,
    pub tenant_id: Option<String>,
    pub channel_type: String,
    pub channel_header: Vec<String>,
    pub channel_payload: Option<String>,
    pub endpoint: String,
    pub parsed_criteria: ParsedQuery,
}

fn str_field(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

/// Id of a stored document; multi-tenant documents keep the FHIR id in `_id`.
fn document_id(resource: &Value) -> Option<String> {
    if resource.get("_tenantId").is_some_and(|t| !t.is_null()) {
        str_field(resource, "/_id")
    } else {
        str_field(resource, "/id")
    }
}

/// Read a stored `Subscription` resource.
pub fn parse_subscription(
    resource: &Value,
    registry: &SearchParameterRegistry,
) -> Result<Subscription> {
    let criteria = resource
        .get("criteria")
        .and_then(Value::as_str)
        .ok_or_else(|| SearchError::invalid("Subscription has no criteria"))?;
    let channel_header = resource
        .pointer("/channel/header")
        .and_then(Value::as_array)
        .map(|headers| {
            headers
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(Subscription {
        id: document_id(resource)
            .ok_or_else(|| SearchError::invalid("Subscription has no id"))?,
        tenant_id: str_field(resource, "/_tenantId"),
        channel_type: str_field(resource, "/channel/type").unwrap_or_default(),
        channel_header,
        channel_payload: str_field(resource, "/channel/payload"),
        endpoint: str_field(resource, "/channel/endpoint").unwrap_or_default(),
        parsed_criteria: parse_query_string(registry, criteria)?,
    })
}

/// `true` when `resource` belongs to the subscription's tenant and meets its criteria.
pub fn match_subscription(
    subscription: &Subscription,
    resource: &Value,
    base_url: Option<&str>,
) -> bool {
    subscription.tenant_id.as_deref() == resource.get("_tenantId").and_then(Value::as_str)
        && matches(&subscription.parsed_criteria, resource, base_url)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedResource {
    pub id: Option<String>,
    pub resource_type: Option<String>,
    pub version_id: Option<String>,
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionNotification {
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub channel_type: String,
    pub endpoint: String,
    pub channel_payload: Option<String>,
    pub channel_header: Vec<String>,
    pub matched_resource: MatchedResource,
}

pub fn build_notification(subscription: &Subscription, resource: &Value) -> SubscriptionNotification {
    SubscriptionNotification {
        subscription_id: subscription.id.clone(),
        tenant_id: str_field(resource, "/_tenantId"),
        channel_type: subscription.channel_type.clone(),
        endpoint: subscription.endpoint.clone(),
        channel_payload: subscription.channel_payload.clone(),
        channel_header: subscription.channel_header.clone(),
        matched_resource: MatchedResource {
            id: document_id(resource),
            resource_type: str_field(resource, "/resourceType"),
            version_id: str_field(resource, "/meta/versionId"),
            last_updated: str_field(resource, "/meta/lastUpdated"),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEventName {
    Insert,
    Modify,
    Remove,
}

/// One entry of the store's change stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub event_name: ChangeEventName,
    /// Stored document after the change
    #[serde(default)]
    pub new_image: Option<Value>,
}

/// Created or updated documents that are currently available.
pub fn filter_eligible_resources(records: &[ChangeRecord]) -> Vec<&Value> {
    records
        .iter()
        .filter(|r| matches!(r.event_name, ChangeEventName::Insert | ChangeEventName::Modify))
        .filter_map(|r| {
            if r.new_image.is_none() {
                tracing::error!(
                    "new image is missing from change record, dropping it. Is the change stream configured to include new images?"
                );
            }
            r.new_image.as_ref()
        })
        .filter(|doc| doc.get("documentStatus").and_then(Value::as_str) == Some(AVAILABLE_STATUS))
        .collect()
}

/// Source of the stored, currently active `Subscription` resources.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn active_subscriptions(&self) -> anyhow::Result<Vec<Value>>;
}

/// One message of a published batch.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEntry {
    /// Unique within its batch
    pub id: Uuid,
    pub channel_type: String,
    /// Serialized [`SubscriptionNotification`]
    pub message: String,
}

/// Destination of subscription notifications, e.g. a message topic.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn publish_batch(&self, entries: Vec<NotificationEntry>) -> anyhow::Result<()>;
}

/// Matches change batches against the cached set of active subscriptions.
pub struct StreamSubscriptionMatcher {
    active: AsyncRefreshCache<Vec<Subscription>>,
    sink: Arc<dyn NotificationSink>,
    base_url: String,
}

impl StreamSubscriptionMatcher {
    /// Load the active subscriptions and keep them refreshed.
    ///
    /// Subscriptions whose criteria cannot be parsed are skipped with a warning.
    pub async fn new(
        registry: Arc<SearchParameterRegistry>,
        store: Arc<dyn SubscriptionStore>,
        sink: Arc<dyn NotificationSink>,
        settings: &SearchSettings,
    ) -> Result<Self> {
        let active = AsyncRefreshCache::new(
            move || {
                let registry = registry.clone();
                let store = store.clone();
                async move {
                    tracing::info!("refreshing cache of active subscriptions");
                    let resources = store.active_subscriptions().await?;
                    let subscriptions: Vec<Subscription> = resources
                        .iter()
                        .filter_map(|r| match parse_subscription(r, &registry) {
                            Ok(s) => Some(s),
                            Err(e) => {
                                tracing::warn!(
                                    id = ?document_id(r),
                                    error = %e,
                                    "skipping subscription with invalid criteria"
                                );
                                None
                            }
                        })
                        .collect();
                    tracing::info!(count = subscriptions.len(), "found active subscriptions");
                    Ok(subscriptions)
                }
            },
            settings.subscriptions.refresh_interval(),
        )
        .await?;

        Ok(Self {
            active,
            sink,
            base_url: settings.base_url().to_string(),
        })
    }

    pub fn active_subscriptions(&self) -> Arc<Vec<Subscription>> {
        self.active.get()
    }

    /// Notifications for every (subscription, resource) match in `records`.
    pub fn notifications(&self, records: &[ChangeRecord]) -> Vec<SubscriptionNotification> {
        tracing::info!(records = records.len(), "change records in batch");
        let resources = filter_eligible_resources(records);
        tracing::info!(resources = resources.len(), "created or updated resources");

        let subscriptions = self.active.get();
        tracing::info!(subscriptions = subscriptions.len(), "active subscriptions");

        subscriptions
            .iter()
            .flat_map(|subscription| {
                resources
                    .iter()
                    .filter(move |r| match_subscription(subscription, r, Some(&self.base_url)))
                    .map(move |r| build_notification(subscription, r))
            })
            .collect()
    }

    /// Match `records` and publish the notifications. Returns how many were sent.
    pub async fn process(&self, records: &[ChangeRecord]) -> Result<usize> {
        let notifications = self.notifications(records);
        for n in &notifications {
            tracing::info!(
                subscription = %format!("Subscription/{}", n.subscription_id),
                resource_type = ?n.matched_resource.resource_type,
                resource_id = ?n.matched_resource.id,
                "subscription matched"
            );
        }

        let batches = notifications
            .chunks(MAX_BATCH_SIZE)
            .map(|batch| {
                batch
                    .iter()
                    .map(|n| -> Result<NotificationEntry> {
                        Ok(NotificationEntry {
                            id: Uuid::new_v4(),
                            channel_type: n.channel_type.clone(),
                            message: serde_json::to_string(n)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        try_join_all(batches.into_iter().map(|b| self.sink.publish_batch(b))).await?;
        tracing::info!(sent = notifications.len(), "notifications sent");
        Ok(notifications.len())
    }

    /// Stop refreshing the active subscriptions.
    pub fn stop(&self) {
        self.active.stop();
    }
}
