//! Deferred decisions requested by the driver mid-inclusion.
//!
//! Each decision kind owns one slot for the whole gateway. The driver's
//! callback opens the slot and waits on it; a command from any session
//! resolves it. Every slot remembers which broker opened it, and an abort
//! only discards the aborting broker's slots, so a flow whose request was
//! refused cannot tear down the decision another flow is waiting on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use zwgate_core::model::InclusionGrant;
use zwgate_core::InclusionUserCallbacks;

use crate::events;
use crate::ids::SessionId;
use crate::registry::SessionRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DecisionKind {
    GrantSecurityClasses,
    ValidateDskAndEnterPin,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GrantSecurityClasses => "grantSecurityClasses",
            Self::ValidateDskAndEnterPin => "validateDSKAndEnterPIN",
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("a {0} decision is already pending")]
    Busy(DecisionKind),
    #[error("no {0} decision is pending")]
    NotPending(DecisionKind),
}

/// Identifies the broker that opened a slot.
pub type OwnerId = u64;

enum SlotState<T> {
    Idle,
    AwaitingDecision {
        owner: OwnerId,
        opened_at: DateTime<Utc>,
        tx: oneshot::Sender<T>,
    },
}

impl<T> SlotState<T> {
    fn is_live(&self) -> bool {
        matches!(self, Self::AwaitingDecision { tx, .. } if !tx.is_closed())
    }
}

/// Single-slot rendezvous for one decision kind.
pub struct DecisionSlot<T> {
    kind: DecisionKind,
    state: Mutex<SlotState<T>>,
}

impl<T> DecisionSlot<T> {
    pub fn new(kind: DecisionKind) -> Self {
        Self {
            kind,
            state: Mutex::new(SlotState::Idle),
        }
    }

    pub fn kind(&self) -> DecisionKind {
        self.kind
    }

    /// Start waiting for a decision on behalf of `owner`.
    ///
    /// A live slot is left untouched and the request refused. A slot whose
    /// previous waiter went away is treated as idle.
    pub fn open(&self, owner: OwnerId) -> Result<oneshot::Receiver<T>, DecisionError> {
        let mut state = self.state.lock();
        if state.is_live() {
            return Err(DecisionError::Busy(self.kind));
        }
        let (tx, rx) = oneshot::channel();
        *state = SlotState::AwaitingDecision {
            owner,
            opened_at: Utc::now(),
            tx,
        };
        Ok(rx)
    }

    /// Hand `value` to the waiter. The slot is idle afterwards either way.
    pub fn resolve(&self, value: T) -> Result<(), DecisionError> {
        let previous = std::mem::replace(&mut *self.state.lock(), SlotState::Idle);
        match previous {
            SlotState::AwaitingDecision { tx, opened_at, .. } => {
                tx.send(value)
                    .map_err(|_| DecisionError::NotPending(self.kind))?;
                debug!(
                    kind = %self.kind,
                    waited_ms = (Utc::now() - opened_at).num_milliseconds(),
                    "decision resolved"
                );
                Ok(())
            }
            SlotState::Idle => Err(DecisionError::NotPending(self.kind)),
        }
    }

    /// Discard the pending decision whoever opened it. Returns whether one
    /// was pending.
    pub fn cancel(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state.lock(), SlotState::Idle);
        previous.is_live()
    }

    /// Discard the pending decision only if `owner` opened it.
    pub fn cancel_owned_by(&self, owner: OwnerId) -> bool {
        let mut state = self.state.lock();
        let owned = matches!(
            &*state,
            SlotState::AwaitingDecision { owner: current, .. } if *current == owner
        );
        if !owned {
            return false;
        }
        let live = state.is_live();
        *state = SlotState::Idle;
        live
    }

    pub fn is_pending(&self) -> bool {
        self.state.lock().is_live()
    }
}

/// The decision slots of the gateway.
pub struct DecisionHub {
    pub grant: DecisionSlot<InclusionGrant>,
    pub dsk_pin: DecisionSlot<String>,
    next_owner: AtomicU64,
}

impl DecisionHub {
    pub fn new() -> Self {
        Self {
            grant: DecisionSlot::new(DecisionKind::GrantSecurityClasses),
            dsk_pin: DecisionSlot::new(DecisionKind::ValidateDskAndEnterPin),
            next_owner: AtomicU64::new(1),
        }
    }

    /// A fresh owner id for a new broker.
    pub fn next_owner(&self) -> OwnerId {
        self.next_owner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns how many pending decisions were discarded.
    pub fn cancel_all(&self) -> usize {
        usize::from(self.grant.cancel()) + usize::from(self.dsk_pin.cancel())
    }

    /// Discard the decisions `owner` opened. Returns how many were pending.
    pub fn cancel_owned_by(&self, owner: OwnerId) -> usize {
        usize::from(self.grant.cancel_owned_by(owner))
            + usize::from(self.dsk_pin.cancel_owned_by(owner))
    }
}

impl Default for DecisionHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Callbacks handed to the driver for one `begin_inclusion`.
///
/// Decision events go to the session that started the inclusion while it
/// is still listening, and to every listening session otherwise.
pub struct InclusionBroker {
    registry: Weak<SessionRegistry>,
    origin: SessionId,
    owner: OwnerId,
}

impl InclusionBroker {
    pub fn new(registry: Weak<SessionRegistry>, origin: SessionId, owner: OwnerId) -> Self {
        Self {
            registry,
            origin,
            owner,
        }
    }

    async fn await_decision<T: Send>(
        &self,
        slot: impl Fn(&SessionRegistry) -> &DecisionSlot<T>,
        event: Value,
    ) -> Option<T> {
        let rx = {
            let registry = self.registry.upgrade()?;
            let slot = slot(&registry);
            let rx = match slot.open(self.owner) {
                Ok(rx) => rx,
                Err(error) => {
                    warn!(origin = %self.origin, %error, "decision requested while another is pending");
                    return None;
                }
            };
            info!(origin = %self.origin, kind = %slot.kind(), "awaiting client decision");
            registry.send_decision_event(&self.origin, event);
            rx
        };
        match rx.await {
            Ok(value) => Some(value),
            Err(_) => {
                debug!(origin = %self.origin, "decision discarded");
                None
            }
        }
    }
}

#[async_trait]
impl InclusionUserCallbacks for InclusionBroker {
    async fn grant_security_classes(&self, requested: InclusionGrant) -> Option<InclusionGrant> {
        let event = events::grant_security_classes(&requested);
        self.await_decision(|r| &r.decisions().grant, event).await
    }

    async fn validate_dsk_and_enter_pin(&self, dsk: String) -> Option<String> {
        let event = events::validate_dsk_and_enter_pin(&dsk);
        self.await_decision(|r| &r.decisions().dsk_pin, event).await
    }

    fn abort(&self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let discarded = registry.decisions().cancel_owned_by(self.owner);
        info!(origin = %self.origin, owner = self.owner, discarded, "inclusion aborted");
        let _ = registry.broadcast_event(&events::inclusion_aborted());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use tokio::sync::mpsc;
    use zwgate_core::model::SecurityClass;
    use zwgate_core::sim::SimulatedDriver;

    use crate::registry::RegistryConfig;
    use crate::websocket::session::{Outbound, Session};

    type Listener = (Arc<SessionRegistry>, Arc<Session>, mpsc::Receiver<Outbound>);

    async fn listening_registry() -> Listener {
        let registry =
            SessionRegistry::new(Arc::new(SimulatedDriver::new(1)), RegistryConfig::default());
        let (tx, mut rx) = mpsc::channel(16);
        let session = Arc::new(Session::new(SessionId::new(), 33, tx));
        registry.register(Arc::clone(&session));
        registry.start_listening(&session, "1").unwrap();
        let _state = rx.recv().await;
        (registry, session, rx)
    }

    async fn next_event(rx: &mut mpsc::Receiver<Outbound>) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no frame arrived");
        let Some(Outbound::Text(text)) = frame else {
            panic!("expected a text frame, got {frame:?}");
        };
        let frame: Value = serde_json::from_str(&text).unwrap();
        frame["event"].clone()
    }

    async fn wait_pending<T>(slot: &DecisionSlot<T>) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !slot.is_pending() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("decision never requested");
    }

    fn grant() -> InclusionGrant {
        InclusionGrant {
            security_classes: vec![SecurityClass::S2Authenticated],
            client_side_auth: false,
        }
    }

    #[tokio::test]
    async fn resolve_delivers_value_once() {
        let slot = DecisionSlot::new(DecisionKind::GrantSecurityClasses);
        let rx = slot.open(1).unwrap();
        assert!(slot.is_pending());

        slot.resolve(grant()).unwrap();
        assert_eq!(rx.await.unwrap(), grant());
        assert!(!slot.is_pending());

        assert_eq!(
            slot.resolve(grant()),
            Err(DecisionError::NotPending(DecisionKind::GrantSecurityClasses))
        );
    }

    #[test]
    fn resolve_without_pending_fails() {
        let slot = DecisionSlot::<String>::new(DecisionKind::ValidateDskAndEnterPin);
        assert_eq!(
            slot.resolve("12345".into()),
            Err(DecisionError::NotPending(DecisionKind::ValidateDskAndEnterPin))
        );
    }

    #[test]
    fn second_open_is_busy() {
        let slot = DecisionSlot::<String>::new(DecisionKind::ValidateDskAndEnterPin);
        let _rx = slot.open(1).unwrap();
        assert_eq!(
            slot.open(2).unwrap_err(),
            DecisionError::Busy(DecisionKind::ValidateDskAndEnterPin)
        );
    }

    #[test]
    fn abandoned_slot_can_reopen() {
        let slot = DecisionSlot::<String>::new(DecisionKind::ValidateDskAndEnterPin);
        drop(slot.open(1).unwrap());
        assert!(!slot.is_pending());
        assert!(slot.open(2).is_ok());
    }

    #[test]
    fn resolve_after_waiter_left_fails() {
        let slot = DecisionSlot::<String>::new(DecisionKind::ValidateDskAndEnterPin);
        drop(slot.open(1).unwrap());
        assert!(slot.resolve("12345".into()).is_err());
        assert!(!slot.is_pending());
    }

    #[tokio::test]
    async fn cancel_wakes_waiter_without_value() {
        let slot = DecisionSlot::<InclusionGrant>::new(DecisionKind::GrantSecurityClasses);
        let rx = slot.open(1).unwrap();
        assert!(slot.cancel());
        assert!(rx.await.is_err());
        assert!(!slot.cancel());
    }

    #[test]
    fn hub_cancel_all_counts_pending() {
        let hub = DecisionHub::new();
        assert_eq!(hub.cancel_all(), 0);
        let _a = hub.grant.open(1).unwrap();
        let _b = hub.dsk_pin.open(2).unwrap();
        assert_eq!(hub.cancel_all(), 2);
        assert!(!hub.grant.is_pending());
        assert!(!hub.dsk_pin.is_pending());
    }

    #[test]
    fn cancel_only_touches_own_slot() {
        let hub = DecisionHub::new();
        let first = hub.next_owner();
        let second = hub.next_owner();
        assert_ne!(first, second);

        let _rx = hub.grant.open(first).unwrap();
        assert!(hub.grant.open(second).is_err());
        assert_eq!(hub.cancel_owned_by(second), 0);
        assert!(hub.grant.is_pending());

        assert_eq!(hub.cancel_owned_by(first), 1);
        assert!(!hub.grant.is_pending());
    }

    #[tokio::test]
    async fn abort_wakes_waiter_and_notifies_listeners() {
        let (registry, session, mut rx) = listening_registry().await;
        let broker = registry.inclusion_broker(&session.id);
        let waiting = tokio::spawn({
            let broker = Arc::clone(&broker);
            async move { broker.grant_security_classes(grant()).await }
        });

        wait_pending(&registry.decisions().grant).await;
        assert_eq!(next_event(&mut rx).await["event"], "grant security classes");

        broker.abort();
        assert_eq!(waiting.await.unwrap(), None);
        assert!(!registry.decisions().grant.is_pending());
        let aborted = next_event(&mut rx).await;
        assert_eq!(aborted["source"], "controller");
        assert_eq!(aborted["event"], "inclusion aborted");
    }

    #[tokio::test]
    async fn refused_broker_cannot_discard_pending_decision() {
        let (registry, session, _rx) = listening_registry().await;
        let first = registry.inclusion_broker(&session.id);
        let waiting = tokio::spawn({
            let first = Arc::clone(&first);
            async move { first.grant_security_classes(grant()).await }
        });
        wait_pending(&registry.decisions().grant).await;

        let second = registry.inclusion_broker(&session.id);
        assert_eq!(second.grant_security_classes(grant()).await, None);
        second.abort();
        assert!(registry.decisions().grant.is_pending());

        registry.decisions().grant.resolve(grant()).unwrap();
        assert_eq!(waiting.await.unwrap(), Some(grant()));
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(
            DecisionKind::GrantSecurityClasses.to_string(),
            "grantSecurityClasses"
        );
        assert_eq!(
            DecisionKind::ValidateDskAndEnterPin.as_str(),
            "validateDSKAndEnterPIN"
        );
    }
}
