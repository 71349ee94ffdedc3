//! Authentication session lifecycle
//!
//! `transition` is the pure state machine; `SessionManager` drives it against
//! the backend and the token store.

use crate::api::SharedBackend;
use crate::error::{Error, Result};
use crate::model::{Credentials, Id, Profile, ProfileUpdate, Registration, User};
use crate::storage::TokenStore;
use tracing::{info, warn};

/// The signed-in user and their opaque token
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: Id,
    pub display_name: String,
    pub email: String,
    pub verified: bool,
    pub profile_complete: bool,
    pub auth_token: String,
}

impl Session {
    pub fn from_user(user: User, auth_token: String) -> Self {
        Self {
            user_id: user.id,
            display_name: user.name,
            email: user.email,
            verified: user.verified,
            profile_complete: user.profile_complete,
            auth_token,
        }
    }

    pub fn from_profile(profile: &Profile, auth_token: String) -> Self {
        Self {
            user_id: profile.id.clone(),
            display_name: profile.name.clone(),
            email: profile.email.clone(),
            verified: profile.verified,
            profile_complete: profile.profile_complete,
            auth_token,
        }
    }

    fn refreshed(&self, profile: &Profile) -> Self {
        Self::from_profile(profile, self.auth_token.clone())
    }
}

/// A registration accepted by the backend but not yet verified
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRegistration {
    pub email: String,
    session: Session,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SessionState {
    #[default]
    Unauthenticated,
    PendingVerification(PendingRegistration),
    Authenticated(Session),
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Unauthenticated => "unauthenticated",
            SessionState::PendingVerification(_) => "pending verification",
            SessionState::Authenticated(_) => "authenticated",
        }
    }
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Persisted token resolved to a profile at startup
    Restored(Session),
    LoggedIn(Session),
    Registered(PendingRegistration),
    OtpVerified,
    VerificationAbandoned,
    LoggedOut,
    TokenRejected,
    ProfileRefreshed(Profile),
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            SessionEvent::Restored(_) => "restore",
            SessionEvent::LoggedIn(_) => "login",
            SessionEvent::Registered(_) => "register",
            SessionEvent::OtpVerified => "verify",
            SessionEvent::VerificationAbandoned => "abandon verification",
            SessionEvent::LoggedOut => "logout",
            SessionEvent::TokenRejected => "reject token",
            SessionEvent::ProfileRefreshed(_) => "refresh profile",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Store the token durably and start sending it
    PersistToken(String),
    /// Forget the token everywhere
    ClearToken,
}

/// Compute the next session state for `event`
pub fn transition(
    state: &SessionState,
    event: SessionEvent,
) -> Result<(SessionState, Vec<SessionEffect>)> {
    use SessionEffect::*;
    use SessionState::*;

    let next = match (state, event) {
        (Unauthenticated, SessionEvent::Restored(session)) => (Authenticated(session), vec![]),
        (Unauthenticated, SessionEvent::LoggedIn(session)) => {
            let token = session.auth_token.clone();
            (Authenticated(session), vec![PersistToken(token)])
        }
        (Unauthenticated, SessionEvent::Registered(pending)) => {
            (PendingVerification(pending), vec![])
        }
        (PendingVerification(pending), SessionEvent::OtpVerified) => {
            let session = pending.session.clone();
            let token = session.auth_token.clone();
            (Authenticated(session), vec![PersistToken(token)])
        }
        (PendingVerification(_), SessionEvent::VerificationAbandoned) => (Unauthenticated, vec![]),
        (_, SessionEvent::LoggedOut) => (Unauthenticated, vec![ClearToken]),
        (Unauthenticated | Authenticated(_), SessionEvent::TokenRejected) => {
            (Unauthenticated, vec![ClearToken])
        }
        (Authenticated(session), SessionEvent::ProfileRefreshed(profile)) => {
            (Authenticated(session.refreshed(&profile)), vec![])
        }
        (state, event) => {
            return Err(Error::InvalidTransition(format!(
                "cannot {} while {}",
                event.name(),
                state.name()
            )))
        }
    };

    Ok(next)
}

/// What `register` hands back: verification is still required
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationPending {
    pub email: String,
}

/// Owns the session state for the lifetime of the process
pub struct SessionManager {
    backend: SharedBackend,
    tokens: TokenStore,
    state: SessionState,
}

impl SessionManager {
    pub fn new(backend: SharedBackend, tokens: TokenStore) -> Self {
        Self {
            backend,
            tokens,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    fn current(&self) -> Result<&Session> {
        self.session().ok_or(Error::NotAuthenticated)
    }

    fn apply(&mut self, event: SessionEvent) -> Result<()> {
        let (next, effects) = transition(&self.state, event)?;

        for effect in effects {
            match effect {
                SessionEffect::PersistToken(token) => {
                    self.tokens.save(&token)?;
                    self.backend.set_token(Some(token));
                }
                SessionEffect::ClearToken => {
                    if let Err(e) = self.tokens.clear() {
                        warn!("Failed to clear stored token: {}", e);
                    }
                    self.backend.set_token(None);
                }
            }
        }

        if next.name() != self.state.name() {
            info!(from = self.state.name(), to = next.name(), "session transition");
        }
        self.state = next;
        Ok(())
    }

    /// Resolve a persisted token to a session, once, at startup
    ///
    /// Any failure counts as "not signed in": the stored token is dropped.
    pub async fn initialize(&mut self) -> bool {
        if !matches!(self.state, SessionState::Unauthenticated) {
            return self.is_authenticated();
        }

        let token = match self.tokens.load() {
            Ok(Some(token)) => token,
            Ok(None) => return false,
            Err(e) => {
                warn!("Unreadable token store, starting signed out: {}", e);
                let _ = self.apply(SessionEvent::TokenRejected);
                return false;
            }
        };

        self.backend.set_token(Some(token.clone()));
        let result = match self.backend.get_profile().await {
            Ok(profile) => self.apply(SessionEvent::Restored(Session::from_profile(&profile, token))),
            Err(e) => {
                warn!("Stored token rejected: {}", e);
                self.apply(SessionEvent::TokenRejected)
            }
        };

        if let Err(e) = result {
            warn!("Session restore failed: {}", e);
        }
        self.is_authenticated()
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<&Session> {
        self.expect_signed_out("login")?;
        credentials.validate()?;

        let response = self.backend.login(credentials).await?;
        self.apply(SessionEvent::LoggedIn(Session::from_user(
            response.user,
            response.token,
        )))?;
        self.current()
    }

    /// Submit registration; the session waits on `verify_otp`
    pub async fn register(&mut self, registration: &Registration) -> Result<RegistrationPending> {
        self.expect_signed_out("register")?;
        registration.validate()?;

        let response = self.backend.register(registration).await?;
        let pending = PendingRegistration {
            email: registration.email.clone(),
            session: Session::from_user(response.user, response.token),
        };
        self.apply(SessionEvent::Registered(pending))?;

        Ok(RegistrationPending {
            email: registration.email.clone(),
        })
    }

    /// Submit the one-time code; correctness is judged by the backend
    pub async fn verify_otp(&mut self, code: &str) -> Result<&Session> {
        if !matches!(self.state, SessionState::PendingVerification(_)) {
            return Err(Error::InvalidTransition(format!(
                "cannot verify while {}",
                self.state.name()
            )));
        }
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::Validation("verification code is required".to_string()));
        }

        self.backend.verify_otp(code).await?;
        self.apply(SessionEvent::OtpVerified)?;
        self.current()
    }

    /// Back out of a pending registration
    pub fn cancel_verification(&mut self) -> Result<()> {
        self.apply(SessionEvent::VerificationAbandoned)
    }

    /// Drop the session and stored token; never fails
    pub fn logout(&mut self) {
        // LoggedOut is accepted from every state
        let _ = self.apply(SessionEvent::LoggedOut);
    }

    /// Re-fetch the profile into the session
    ///
    /// A 401 means the token is gone server-side and signs the user out.
    pub async fn refresh_profile(&mut self) -> Result<Profile> {
        self.current()?;

        match self.backend.get_profile().await {
            Ok(profile) => {
                self.apply(SessionEvent::ProfileRefreshed(profile.clone()))?;
                Ok(profile)
            }
            Err(e) => {
                if e.is_unauthorized() {
                    warn!("Token rejected on profile refresh, signing out");
                    self.apply(SessionEvent::TokenRejected)?;
                }
                Err(e)
            }
        }
    }

    /// Save profile edits, then refresh the cached profile
    pub async fn update_profile(&mut self, update: &ProfileUpdate) -> Result<Profile> {
        self.current()?;
        self.backend.update_profile(update).await?;
        self.refresh_profile().await
    }

    fn expect_signed_out(&self, action: &str) -> Result<()> {
        match self.state {
            SessionState::Unauthenticated => Ok(()),
            ref other => Err(Error::InvalidTransition(format!(
                "cannot {} while {}",
                action,
                other.name()
            ))),
        }
    }
}
