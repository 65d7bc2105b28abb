//! ---
//! devdata_section: "01-core-functionality"
//! devdata_subsection: "module"
//! devdata_type: "source"
//! devdata_scope: "code"
//! devdata_description: "Change subscriptions and their dispatch order."
//! devdata_version: "v0.0.0-prealpha"
//! devdata_owner: "tbd"
//! ---
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::ElementError;
use crate::value::Value;

/// Shared change handler. Context is whatever the closure captures.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

/// Identifier of one registered subscription, unique within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Raw identifier.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Handle returned by [`crate::DataElement::observe`].
///
/// Dropping the handle does not revoke the subscription; pass it to
/// [`crate::DataElement::unsubscribe`] to stop delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    id: SubscriptionId,
    element: String,
}

impl Subscription {
    pub(crate) fn new(id: SubscriptionId, element: impl Into<String>) -> Self {
        Self {
            id,
            element: element.into(),
        }
    }

    /// Identifier of the subscription.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Name of the element the subscription belongs to.
    pub fn element(&self) -> &str {
        &self.element
    }
}

/// Outcome of the native observation activation performed by `try_observe`.
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    /// This call engaged the native observe hook.
    Engaged,
    /// Observation was already active; the hook was not invoked.
    AlreadyActive,
    /// The native hook failed. The subscription stays registered and a later
    /// observe call retries the activation.
    Failed(ElementError),
}

impl Activation {
    /// Whether the element is observing after the call.
    pub fn is_active(&self) -> bool {
        !matches!(self, Activation::Failed(_))
    }
}

/// Subscription and activation results of a `try_observe` call, kept separate.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// The registered subscription.
    pub subscription: Subscription,
    /// What happened to the native observation.
    pub activation: Activation,
}

#[derive(Default)]
pub(crate) struct SubscriptionList {
    entries: Vec<(SubscriptionId, Handler)>,
}

impl SubscriptionList {
    pub(crate) fn push(&mut self, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        self.entries.push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Handlers in registration order, detached from the list so dispatch can
    /// run without holding the element state lock.
    pub(crate) fn snapshot(&self) -> Vec<Handler> {
        self.entries
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect()
    }
}

impl fmt::Debug for SubscriptionList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionList")
            .field(
                "entries",
                &self.entries.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_not_reused_after_removal() {
        let mut list = SubscriptionList::default();
        let first = list.push(Arc::new(|_: &Value| {}));
        assert!(list.remove(first));
        let second = list.push(Arc::new(|_: &Value| {}));
        assert!(second.get() > first.get());
        assert!(!list.remove(first));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn snapshot_preserves_registration_order() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut list = SubscriptionList::default();
        for tag in ["a", "b", "c"] {
            let seen = Arc::clone(&seen);
            list.push(Arc::new(move |_: &Value| seen.lock().push(tag)));
        }
        for handler in list.snapshot() {
            handler(&Value::from(1));
        }
        assert_eq!(*seen.lock(), vec!["a", "b", "c"]);
    }
}
