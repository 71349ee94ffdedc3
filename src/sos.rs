//! Emergency SOS alert lifecycle
//!
//! ```text
//! Idle --trigger--> Confirming --confirm--> Sending --ack--> Active
//!   ^                   |                      |              |
//!   +------cancel-------+                      |        (cooldown)
//!   +------------------failure-----------------+              |
//!   +------------------------- Cooldown <---------------------+
//! ```
//!
//! Only `Idle` accepts a trigger, so at most one alert is ever outstanding.
//! There is no user cancel once the alert is sent.

use crate::api::SharedBackend;
use crate::error::{Error, Result};
use crate::model::{SosReceipt, SosRequest};
use crate::timer::{self, TaskHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SosStatus {
    #[default]
    Idle,
    /// Form open, nothing sent
    Confirming,
    /// Request in flight
    Sending,
    /// Acknowledged by the backend
    Active,
    Cooldown,
}

impl std::fmt::Display for SosStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SosStatus::Idle => "idle",
            SosStatus::Confirming => "confirming",
            SosStatus::Sending => "sending",
            SosStatus::Active => "active",
            SosStatus::Cooldown => "cooldown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SosAlert {
    pub status: SosStatus,
    pub location: Option<String>,
    pub message: Option<String>,
    pub alert_id: Option<String>,
    pub nearby_notified_count: Option<u32>,
    pub authorities_notified: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SosEvent {
    Trigger,
    Edit {
        location: Option<String>,
        message: Option<String>,
    },
    Confirm,
    Cancel,
    Acknowledged(SosReceipt),
    Failed,
    CooldownElapsed,
    CooldownFinished,
    /// Forced return to idle (sign-out)
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SosEffect {
    Submit(SosRequest),
    ArmCooldown,
    FinishCooldown,
}

/// Compute the next alert for `event`; events a state does not accept are no-ops
pub fn transition(alert: &SosAlert, event: SosEvent) -> (SosAlert, Vec<SosEffect>) {
    use SosStatus::*;

    match (alert.status, event) {
        (Idle, SosEvent::Trigger) => (
            SosAlert {
                status: Confirming,
                ..SosAlert::default()
            },
            vec![],
        ),
        (Confirming, SosEvent::Edit { location, message }) => (
            SosAlert {
                location,
                message,
                ..alert.clone()
            },
            vec![],
        ),
        (Confirming, SosEvent::Confirm) => {
            let request =
                SosRequest::with_defaults(alert.location.as_deref(), alert.message.as_deref());
            (
                SosAlert {
                    status: Sending,
                    ..alert.clone()
                },
                vec![SosEffect::Submit(request)],
            )
        }
        (Confirming, SosEvent::Cancel) => (SosAlert::default(), vec![]),
        (Sending, SosEvent::Acknowledged(receipt)) => (
            SosAlert {
                status: Active,
                alert_id: Some(receipt.alert_id),
                nearby_notified_count: Some(receipt.nearby_users_notified),
                authorities_notified: Some(receipt.authorities_notified),
                ..alert.clone()
            },
            vec![SosEffect::ArmCooldown],
        ),
        (Sending, SosEvent::Failed) => (SosAlert::default(), vec![]),
        (Active, SosEvent::CooldownElapsed) => (
            SosAlert {
                status: Cooldown,
                ..alert.clone()
            },
            vec![SosEffect::FinishCooldown],
        ),
        (Cooldown, SosEvent::CooldownFinished) => (SosAlert::default(), vec![]),
        (_, SosEvent::Reset) => (SosAlert::default(), vec![]),
        (status, event) => {
            debug!(%status, ?event, "ignored SOS event");
            (alert.clone(), vec![])
        }
    }
}

fn apply(state: &watch::Sender<SosAlert>, event: SosEvent) -> Vec<SosEffect> {
    let mut effects = Vec::new();
    state.send_if_modified(|alert| {
        let (next, fx) = transition(alert, event);
        effects = fx;
        if next == *alert {
            return false;
        }
        info!(from = %alert.status, to = %next.status, "SOS transition");
        *alert = next;
        true
    });
    effects
}

/// Fails a submission whose future is dropped before the backend answers,
/// so the machine never stays in `Sending`
struct InFlight {
    state: Option<Arc<watch::Sender<SosAlert>>>,
}

impl InFlight {
    fn arm(state: Arc<watch::Sender<SosAlert>>) -> Self {
        Self { state: Some(state) }
    }

    fn disarm(mut self) {
        self.state = None;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            warn!("SOS submission abandoned before a response");
            apply(&state, SosEvent::Failed);
        }
    }
}

/// Drives the SOS state machine against the backend
pub struct SosController {
    backend: SharedBackend,
    cooldown: Duration,
    state: Arc<watch::Sender<SosAlert>>,
    cooldown_timer: Option<TaskHandle>,
}

impl SosController {
    pub fn new(backend: SharedBackend, cooldown: Duration) -> Self {
        let (state, _) = watch::channel(SosAlert::default());
        Self {
            backend,
            cooldown,
            state: Arc::new(state),
            cooldown_timer: None,
        }
    }

    pub fn alert(&self) -> SosAlert {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SosStatus {
        self.state.borrow().status
    }

    pub fn subscribe(&self) -> watch::Receiver<SosAlert> {
        self.state.subscribe()
    }

    /// Whether the SOS control is enabled
    pub fn can_trigger(&self) -> bool {
        self.status() == SosStatus::Idle
    }

    /// Open the confirmation form; a no-op unless idle
    pub fn trigger(&mut self) -> SosStatus {
        apply(&self.state, SosEvent::Trigger);
        self.status()
    }

    pub fn set_details(&mut self, location: Option<String>, message: Option<String>) {
        apply(&self.state, SosEvent::Edit { location, message });
    }

    /// Close the form without sending
    pub fn cancel(&mut self) {
        apply(&self.state, SosEvent::Cancel);
    }

    /// Send the alert and wait for the backend
    ///
    /// Failure returns the machine to idle; the user starts over.
    pub async fn confirm(&mut self) -> Result<SosReceipt> {
        let request = apply(&self.state, SosEvent::Confirm)
            .into_iter()
            .find_map(|effect| match effect {
                SosEffect::Submit(request) => Some(request),
                _ => None,
            })
            .ok_or_else(|| {
                Error::InvalidTransition(format!("cannot send SOS while {}", self.status()))
            })?;

        let in_flight = InFlight::arm(self.state.clone());
        let outcome = self.backend.send_sos(&request).await;
        in_flight.disarm();

        match outcome {
            Ok(receipt) => {
                info!(alert_id = %receipt.alert_id, nearby = receipt.nearby_users_notified, "SOS acknowledged");
                let effects = apply(&self.state, SosEvent::Acknowledged(receipt.clone()));
                self.run(effects);
                Ok(receipt)
            }
            Err(e) => {
                warn!("SOS submission failed: {}", e);
                apply(&self.state, SosEvent::Failed);
                Err(e)
            }
        }
    }

    /// Trigger, fill in and confirm in one step
    pub async fn send(
        &mut self,
        location: Option<String>,
        message: Option<String>,
    ) -> Result<SosReceipt> {
        if self.trigger() != SosStatus::Confirming {
            return Err(Error::InvalidTransition(format!(
                "cannot send SOS while {}",
                self.status()
            )));
        }
        self.set_details(location, message);
        self.confirm().await
    }

    /// Cancel the cooldown timer and return to idle
    pub fn reset(&mut self) {
        if let Some(mut timer) = self.cooldown_timer.take() {
            timer.cancel();
        }
        apply(&self.state, SosEvent::Reset);
    }

    pub fn cooldown_pending(&self) -> bool {
        self.cooldown_timer.as_ref().is_some_and(TaskHandle::is_active)
    }

    fn run(&mut self, effects: Vec<SosEffect>) {
        for effect in effects {
            if effect == SosEffect::ArmCooldown {
                let state = self.state.clone();
                self.cooldown_timer = Some(timer::after(self.cooldown, async move {
                    let effects = apply(&state, SosEvent::CooldownElapsed);
                    if effects.contains(&SosEffect::FinishCooldown) {
                        apply(&state, SosEvent::CooldownFinished);
                    }
                }));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeBackend;

    const COOLDOWN: Duration = Duration::from_secs(30);

    fn receipt() -> SosReceipt {
        SosReceipt {
            alert_id: "alert-1".to_string(),
            nearby_users_notified: 5,
            authorities_notified: true,
        }
    }

    fn controller(fake: &FakeBackend) -> SosController {
        SosController::new(Arc::new(fake.clone()), COOLDOWN)
    }

    #[test]
    fn test_trigger_opens_form_without_request() {
        let (next, effects) = transition(&SosAlert::default(), SosEvent::Trigger);
        assert_eq!(next.status, SosStatus::Confirming);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_confirm_substitutes_defaults() {
        let confirming = SosAlert {
            status: SosStatus::Confirming,
            ..Default::default()
        };
        let (next, effects) = transition(&confirming, SosEvent::Confirm);
        assert_eq!(next.status, SosStatus::Sending);
        assert_eq!(
            effects,
            vec![SosEffect::Submit(SosRequest {
                location: "Location unavailable".to_string(),
                message: "Emergency assistance needed".to_string(),
            })]
        );
    }

    #[test]
    fn test_trigger_ignored_outside_idle() {
        for status in [
            SosStatus::Confirming,
            SosStatus::Sending,
            SosStatus::Active,
            SosStatus::Cooldown,
        ] {
            let alert = SosAlert {
                status,
                location: Some("kept".to_string()),
                ..Default::default()
            };
            let (next, effects) = transition(&alert, SosEvent::Trigger);
            assert_eq!(next, alert);
            assert!(effects.is_empty());
        }
    }

    #[test]
    fn test_cancel_clears_form() {
        let alert = SosAlert {
            status: SosStatus::Confirming,
            location: Some("Beach".to_string()),
            message: Some("help".to_string()),
            ..Default::default()
        };
        let (next, _) = transition(&alert, SosEvent::Cancel);
        assert_eq!(next, SosAlert::default());
    }

    #[test]
    fn test_no_cancel_once_active() {
        let active = SosAlert {
            status: SosStatus::Active,
            alert_id: Some("a".to_string()),
            ..Default::default()
        };
        let (next, _) = transition(&active, SosEvent::Cancel);
        assert_eq!(next.status, SosStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_enters_active_with_receipt() {
        let fake = FakeBackend::new();
        fake.state().sos = Some(receipt());
        let mut sos = controller(&fake);

        assert_eq!(sos.trigger(), SosStatus::Confirming);
        sos.set_details(Some("Old town".to_string()), None);
        let r = sos.confirm().await.unwrap();

        assert_eq!(r.alert_id, "alert-1");
        let alert = sos.alert();
        assert_eq!(alert.status, SosStatus::Active);
        assert_eq!(alert.alert_id.as_deref(), Some("alert-1"));
        assert_eq!(alert.nearby_notified_count, Some(5));
        assert_eq!(alert.authorities_notified, Some(true));
        assert!(!sos.can_trigger());

        let sent = fake.state().sos_requests.clone();
        assert_eq!(sent[0].location, "Old town");
        assert_eq!(sent[0].message, "Emergency assistance needed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_active_sends_nothing() {
        let fake = FakeBackend::new();
        fake.state().sos = Some(receipt());
        let mut sos = controller(&fake);

        sos.send(None, None).await.unwrap();
        assert_eq!(sos.trigger(), SosStatus::Active);
        assert!(matches!(sos.confirm().await, Err(Error::InvalidTransition(_))));
        assert!(sos.send(None, None).await.is_err());

        assert_eq!(fake.calls_to("POST /sos"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_returns_to_idle() {
        let fake = FakeBackend::new();
        let mut sos = controller(&fake);

        sos.trigger();
        sos.set_details(Some("Harbour".to_string()), Some("lost".to_string()));
        let err = sos.confirm().await.unwrap_err();

        assert_eq!(err.to_string(), "SOS service unavailable");
        assert_eq!(sos.alert(), SosAlert::default());
        assert!(!sos.cooldown_pending());
        assert!(sos.can_trigger());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_confirm_returns_to_idle() {
        let fake = FakeBackend::new();
        {
            let mut state = fake.state();
            state.sos = Some(receipt());
            state.sos_delay = Some(Duration::from_secs(60));
        }
        let mut sos = controller(&fake);

        sos.trigger();
        let result = tokio::time::timeout(Duration::from_secs(5), sos.confirm()).await;
        assert!(result.is_err());

        assert_eq!(sos.alert(), SosAlert::default());
        assert!(sos.can_trigger());
        assert!(!sos.cooldown_pending());

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(sos.trigger(), SosStatus::Confirming);
        assert_eq!(fake.calls_to("POST /sos"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_returns_to_idle() {
        let fake = FakeBackend::new();
        fake.state().sos = Some(receipt());
        let mut sos = controller(&fake);
        let mut rx = sos.subscribe();

        sos.send(None, None).await.unwrap();
        assert!(sos.cooldown_pending());

        tokio::time::sleep(COOLDOWN - Duration::from_secs(1)).await;
        assert_eq!(sos.status(), SosStatus::Active);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sos.status(), SosStatus::Idle);
        assert_eq!(sos.alert(), SosAlert::default());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().status, SosStatus::Idle);

        // A fresh alert may be raised again
        assert_eq!(sos.trigger(), SosStatus::Confirming);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_sending_is_noop() {
        let fake = FakeBackend::new();
        {
            let mut state = fake.state();
            state.sos = Some(receipt());
            state.sos_delay = Some(Duration::from_secs(5));
        }
        let sos = Arc::new(tokio::sync::Mutex::new(controller(&fake)));
        let mut rx = sos.lock().await.subscribe();

        let sender = sos.clone();
        let in_flight = tokio::spawn(async move { sender.lock().await.send(None, None).await });

        rx.wait_for(|a| a.status == SosStatus::Sending).await.unwrap();
        // The form is locked while the request is in flight
        let (next, effects) = transition(&rx.borrow().clone(), SosEvent::Trigger);
        assert_eq!(next.status, SosStatus::Sending);
        assert!(effects.is_empty());

        in_flight.await.unwrap().unwrap();
        assert_eq!(fake.calls_to("POST /sos"), 1);
        assert_eq!(sos.lock().await.status(), SosStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_cooldown() {
        let fake = FakeBackend::new();
        fake.state().sos = Some(receipt());
        let mut sos = controller(&fake);

        sos.send(None, None).await.unwrap();
        sos.reset();
        assert!(!sos.cooldown_pending());
        assert_eq!(sos.status(), SosStatus::Idle);

        // The cancelled timer must not disturb a new alert
        sos.trigger();
        tokio::time::sleep(COOLDOWN * 2).await;
        assert_eq!(sos.status(), SosStatus::Confirming);
    }
}
