//! In-process notification registry for tests and development.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use slotwarden_core::{Error, Result};

use crate::notify::{NotificationMessage, NotificationRegistry};

#[derive(Debug, Default)]
struct NotifierState {
    mobile_targets: BTreeSet<String>,
    failing: BTreeSet<String>,
    delays: BTreeMap<String, Duration>,
    fail_listing: bool,
    sent: Vec<(String, NotificationMessage)>,
}

/// Mock notification registry.
///
/// Clones share state, so a test keeps one clone to register targets or
/// inspect deliveries while the engine owns another.
///
/// # Examples
///
/// ```
/// use slotwarden_engine::mock::MockNotifier;
/// use slotwarden_engine::notify::{NotificationMessage, NotificationRegistry};
///
/// #[tokio::main]
/// async fn main() -> slotwarden_core::Result<()> {
///     let notifier = MockNotifier::with_mobile_targets(["phone"]);
///     assert_eq!(notifier.list_mobile_targets().await?.len(), 1);
///
///     let message = NotificationMessage {
///         title: "t".into(),
///         body: "b".into(),
///         data: serde_json::Value::Null,
///     };
///     notifier.send("phone", &message).await?;
///     assert_eq!(notifier.sent_to("phone").len(), 1);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockNotifier {
    state: Arc<Mutex<NotifierState>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mobile_targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let notifier = Self::new();
        for target in targets {
            notifier.register_mobile_target(target);
        }
        notifier
    }

    fn state(&self) -> MutexGuard<'_, NotifierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_mobile_target(&self, target: impl Into<String>) {
        self.state().mobile_targets.insert(target.into());
    }

    pub fn unregister_mobile_target(&self, target: &str) {
        self.state().mobile_targets.remove(target);
    }

    /// Reject every delivery to `target`.
    pub fn fail_target(&self, target: impl Into<String>) {
        self.state().failing.insert(target.into());
    }

    /// Delay every delivery to `target`.
    pub fn delay_target(&self, target: impl Into<String>, delay: Duration) {
        self.state().delays.insert(target.into(), delay);
    }

    /// Make `list_mobile_targets` fail.
    pub fn fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    /// Every successful delivery, in completion order.
    pub fn sent(&self) -> Vec<(String, NotificationMessage)> {
        self.state().sent.clone()
    }

    pub fn sent_to(&self, target: &str) -> Vec<NotificationMessage> {
        self.state()
            .sent
            .iter()
            .filter(|(to, _)| to == target)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

impl NotificationRegistry for MockNotifier {
    async fn list_mobile_targets(&self) -> Result<BTreeSet<String>> {
        let state = self.state();
        if state.fail_listing {
            return Err(Error::delivery("registry", "listing unavailable"));
        }
        Ok(state.mobile_targets.clone())
    }

    async fn send(&self, target: &str, message: &NotificationMessage) -> Result<()> {
        let (delay, failing) = {
            let state = self.state();
            (state.delays.get(target).copied(), state.failing.contains(target))
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(Error::delivery(target, "rejected by mock"));
        }

        self.state()
            .sent
            .push((target.to_string(), message.clone()));
        Ok(())
    }
}
