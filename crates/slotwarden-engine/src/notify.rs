//! Notification fan-out.
//!
//! The dispatcher resolves a slot's targets at send time, expanding the
//! `ALL_MOBILE` wildcard against whatever the registry reports *now*, then
//! delivers to every target concurrently. Each delivery has its own timeout
//! and its own result; one slow or failing target never holds up the rest.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::join_all;
use serde::Serialize;
use slotwarden_core::constants::{
    ALL_MOBILE_TARGET, NOTIFICATION_BODY_TEMPLATE, NOTIFICATION_TITLE_TEMPLATE,
};
use slotwarden_core::{AccessMethod, Error, Result, Slot};
use tracing::{debug, warn};

use crate::policy::AccessOutcome;

/// Message delivered to one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

impl NotificationMessage {
    /// Render the fixed title/body templates for an access attempt.
    pub fn for_access(
        slot: &Slot,
        outcome: &str,
        method: &str,
        timestamp: DateTime<Utc>,
        test: bool,
    ) -> Self {
        let stamp = timestamp.to_rfc3339_opts(SecondsFormat::Secs, true);
        let title = NOTIFICATION_TITLE_TEMPLATE.replace("{outcome}", outcome);
        let body = NOTIFICATION_BODY_TEMPLATE
            .replace("{user}", slot.display_name())
            .replace("{slot}", &slot.id.to_string())
            .replace("{method}", method)
            .replace("{timestamp}", &stamp);

        Self {
            title,
            body,
            data: serde_json::json!({
                "slot": slot.id,
                "user": slot.display_name(),
                "outcome": outcome,
                "method": method,
                "timestamp": stamp,
                "test": test,
            }),
        }
    }
}

/// External registry of notification destinations.
pub trait NotificationRegistry: Send + Sync {
    /// Mobile targets currently registered. Queried on every wildcard
    /// expansion, never cached.
    fn list_mobile_targets(&self) -> impl Future<Output = Result<BTreeSet<String>>> + Send;

    /// Deliver one message to one target.
    fn send(
        &self,
        target: &str,
        message: &NotificationMessage,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Per-target outcome of one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl DeliveryReport {
    /// Nothing was attempted.
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }

    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Resolves targets and fans messages out through a registry.
#[derive(Debug)]
pub struct NotificationDispatcher<N> {
    registry: N,
    delivery_timeout: Duration,
}

impl<N: NotificationRegistry> NotificationDispatcher<N> {
    pub fn new(registry: N, delivery_timeout: Duration) -> Self {
        Self {
            registry,
            delivery_timeout,
        }
    }

    pub fn registry(&self) -> &N {
        &self.registry
    }

    /// Notify a slot's targets about an evaluated access.
    ///
    /// A no-op when the slot has notifications turned off.
    pub async fn dispatch(
        &self,
        slot: &Slot,
        outcome: AccessOutcome,
        method: AccessMethod,
        timestamp: DateTime<Utc>,
    ) -> DeliveryReport {
        if !slot.notification_enabled {
            return DeliveryReport::default();
        }
        let message =
            NotificationMessage::for_access(slot, outcome.label(), method.as_str(), timestamp, false);
        self.deliver(&slot.notification_targets, &message).await
    }

    /// Send a synthetic message to a slot's targets.
    ///
    /// Bypasses policy and the device. Sent whether or not notifications are
    /// enabled on the slot, so an operator can check delivery before turning
    /// them on.
    pub async fn dispatch_test(&self, slot: &Slot) -> DeliveryReport {
        let message = NotificationMessage::for_access(slot, "test", "test", Utc::now(), true);
        self.deliver(&slot.notification_targets, &message).await
    }

    /// Expand the wildcard against the registry's current mobile targets.
    async fn resolve(
        &self,
        configured: &BTreeSet<String>,
        report: &mut DeliveryReport,
    ) -> BTreeSet<String> {
        let mut resolved: BTreeSet<String> = configured
            .iter()
            .filter(|target| target.as_str() != ALL_MOBILE_TARGET)
            .cloned()
            .collect();

        if configured.contains(ALL_MOBILE_TARGET) {
            match self.registry.list_mobile_targets().await {
                Ok(mobile) => {
                    debug!("{} expanded to {} targets", ALL_MOBILE_TARGET, mobile.len());
                    resolved.extend(mobile);
                }
                Err(e) => {
                    warn!("Could not list mobile targets: {}", e);
                    report.failed.push((ALL_MOBILE_TARGET.to_string(), e));
                }
            }
        }

        resolved
    }

    async fn deliver(
        &self,
        configured: &BTreeSet<String>,
        message: &NotificationMessage,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let targets = self.resolve(configured, &mut report).await;

        let mut sends = Vec::with_capacity(targets.len());
        for target in &targets {
            sends.push(self.send_one(target, message));
        }

        for (target, result) in join_all(sends).await {
            match result {
                Ok(()) => report.delivered.push(target.to_string()),
                Err(e) => {
                    warn!("Notification to {} failed: {}", target, e);
                    report.failed.push((target.to_string(), e));
                }
            }
        }

        report
    }

    async fn send_one<'a>(
        &self,
        target: &'a str,
        message: &NotificationMessage,
    ) -> (&'a str, Result<()>) {
        let timeout = self.delivery_timeout;
        let result = match tokio::time::timeout(timeout, self.registry.send(target, message)).await {
            Ok(result) => result,
            Err(_) => Err(Error::delivery(
                target,
                format!("timed out after {}ms", timeout.as_millis()),
            )),
        };
        (target, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNotifier;
    use slotwarden_core::SlotId;

    fn notifying_slot(targets: &[&str]) -> Slot {
        let mut slot = Slot::unassigned(SlotId::new(2));
        slot.name = "Nanny".to_string();
        slot.notification_enabled = true;
        slot.notification_targets = targets.iter().map(|t| t.to_string()).collect();
        slot
    }

    #[test]
    fn test_message_templates() {
        let slot = notifying_slot(&[]);
        let at = "2025-04-01T07:30:00Z".parse().unwrap();

        let message = NotificationMessage::for_access(&slot, "granted", "pin", at, false);

        assert_eq!(message.title, "Lock access granted");
        assert_eq!(message.body, "Nanny (slot 2) used pin at 2025-04-01T07:30:00Z");
        assert_eq!(message.data["slot"], 2);
        assert_eq!(message.data["test"], false);
    }

    #[tokio::test]
    async fn test_disabled_notifications_are_noop() {
        let notifier = MockNotifier::new();
        let dispatcher = NotificationDispatcher::new(notifier.clone(), Duration::from_secs(1));
        let mut slot = notifying_slot(&["phone"]);
        slot.notification_enabled = false;

        let report = dispatcher
            .dispatch(&slot, AccessOutcome::Granted, AccessMethod::Pin, Utc::now())
            .await;

        assert!(report.is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_wildcard_expands_at_send_time() {
        let notifier = MockNotifier::with_mobile_targets(["phone_a"]);
        let dispatcher = NotificationDispatcher::new(notifier.clone(), Duration::from_secs(1));
        let slot = notifying_slot(&[ALL_MOBILE_TARGET, "email"]);

        let first = dispatcher
            .dispatch(&slot, AccessOutcome::Granted, AccessMethod::Pin, Utc::now())
            .await;
        assert_eq!(first.delivered, vec!["email", "phone_a"]);

        notifier.register_mobile_target("phone_b");
        let second = dispatcher
            .dispatch(&slot, AccessOutcome::Granted, AccessMethod::Pin, Utc::now())
            .await;
        assert_eq!(second.delivered, vec!["email", "phone_a", "phone_b"]);
    }

    #[tokio::test]
    async fn test_failures_are_independent() {
        let notifier = MockNotifier::with_mobile_targets(["phone_a", "phone_b"]);
        notifier.fail_target("phone_a");
        let dispatcher = NotificationDispatcher::new(notifier.clone(), Duration::from_secs(1));
        let slot = notifying_slot(&[ALL_MOBILE_TARGET]);

        let report = dispatcher
            .dispatch(&slot, AccessOutcome::DeniedExpired, AccessMethod::Pin, Utc::now())
            .await;

        assert_eq!(report.delivered, vec!["phone_b"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "phone_a");
        assert!(matches!(report.failed[0].1, Error::Delivery { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_target_does_not_block_others() {
        let notifier = MockNotifier::with_mobile_targets(["fast", "slow"]);
        notifier.delay_target("slow", Duration::from_secs(60));
        let dispatcher = NotificationDispatcher::new(notifier.clone(), Duration::from_secs(5));
        let slot = notifying_slot(&[ALL_MOBILE_TARGET]);

        let started = tokio::time::Instant::now();
        let report = dispatcher
            .dispatch(&slot, AccessOutcome::Granted, AccessMethod::Pin, Utc::now())
            .await;

        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(report.delivered, vec!["fast"]);
        assert_eq!(report.failed[0].0, "slow");
    }

    #[tokio::test]
    async fn test_registry_failure_reported_against_wildcard() {
        let notifier = MockNotifier::new();
        notifier.fail_listing(true);
        let dispatcher = NotificationDispatcher::new(notifier.clone(), Duration::from_secs(1));
        let slot = notifying_slot(&[ALL_MOBILE_TARGET, "email"]);

        let report = dispatcher
            .dispatch(&slot, AccessOutcome::Granted, AccessMethod::Pin, Utc::now())
            .await;

        assert_eq!(report.delivered, vec!["email"]);
        assert_eq!(report.failed[0].0, ALL_MOBILE_TARGET);
    }

    #[tokio::test]
    async fn test_test_dispatch_ignores_enabled_flag() {
        let notifier = MockNotifier::new();
        let dispatcher = NotificationDispatcher::new(notifier.clone(), Duration::from_secs(1));
        let mut slot = notifying_slot(&["email"]);
        slot.notification_enabled = false;

        let report = dispatcher.dispatch_test(&slot).await;

        assert_eq!(report.delivered, vec!["email"]);
        let sent = notifier.sent();
        assert_eq!(sent[0].1.data["test"], true);
        assert_eq!(sent[0].1.title, "Lock access test");
    }
}
