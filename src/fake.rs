//! In-memory backend for unit tests

use crate::api::Backend;
use crate::error::{Error, Result};
use crate::model::{
    AuthResponse, Credentials, DashboardStats, HeatPoint, Id, Message, NewTrip, Profile,
    ProfileUpdate, Registration, SosReceipt, SosRequest, TouristId, Trip, TripCreated, User,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn server(status: u16, message: &str) -> Error {
    Error::Server {
        status,
        message: message.to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeState {
    pub token: Option<String>,
    pub calls: Vec<String>,
    pub auth: Option<AuthResponse>,
    pub profile: Option<Profile>,
    pub otp_error: Option<String>,
    pub update_error: Option<String>,
    pub trips: Vec<Trip>,
    pub messages: HashMap<Id, Vec<Message>>,
    pub messages_error: bool,
    pub messages_delay: Option<Duration>,
    pub send_error: Option<String>,
    pub sent: Vec<(Id, String)>,
    pub sos: Option<SosReceipt>,
    pub sos_delay: Option<Duration>,
    pub sos_requests: Vec<SosRequest>,
}

#[derive(Default, Clone)]
pub(crate) struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_user(self, id: i64, name: &str, token: &str) -> Self {
        let user = User {
            id: Id::from(id),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            verified: false,
            profile_complete: false,
        };
        {
            let mut state = self.state();
            state.profile = Some(Profile {
                id: user.id.clone(),
                name: user.name.clone(),
                email: user.email.clone(),
                ..Default::default()
            });
            state.auth = Some(AuthResponse {
                user,
                token: token.to_string(),
            });
        }
        self
    }

    pub fn calls_to(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == call).count()
    }

    pub fn set_messages(&self, trip: &Id, messages: Vec<Message>) {
        self.state().messages.insert(trip.clone(), messages);
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    fn authorized(&self) -> Result<()> {
        match self.state().token {
            Some(_) => Ok(()),
            None => Err(server(401, "Unauthorized")),
        }
    }
}

pub(crate) fn message(id: i64, sender: i64, content: &str) -> Message {
    Message {
        id: Id::from(id),
        sender_id: Id::from(sender),
        sender_name: Some(format!("user{}", sender)),
        content: content.to_string(),
        timestamp: format!("2024-05-01T10:00:{:02}", id % 60),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn set_token(&self, token: Option<String>) {
        self.state().token = token;
    }

    async fn login(&self, _credentials: &Credentials) -> Result<AuthResponse> {
        self.record("POST /login".to_string());
        self.state()
            .auth
            .clone()
            .ok_or_else(|| server(401, "Invalid credentials"))
    }

    async fn register(&self, _registration: &Registration) -> Result<AuthResponse> {
        self.record("POST /register".to_string());
        self.state()
            .auth
            .clone()
            .ok_or_else(|| server(400, "User already exists"))
    }

    async fn verify_otp(&self, _code: &str) -> Result<()> {
        self.record("POST /mock-otp".to_string());
        match self.state().otp_error.clone() {
            Some(msg) => Err(server(400, &msg)),
            None => Ok(()),
        }
    }

    async fn get_profile(&self) -> Result<Profile> {
        self.record("GET /profile".to_string());
        self.authorized()?;
        self.state()
            .profile
            .clone()
            .ok_or_else(|| server(401, "Unauthorized"))
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<()> {
        self.record("PUT /profile".to_string());
        self.authorized()?;
        let mut state = self.state();
        if let Some(msg) = state.update_error.clone() {
            return Err(server(500, &msg));
        }
        if let Some(profile) = state.profile.as_mut() {
            profile.bio = update.bio.clone();
            profile.location = update.location.clone();
            profile.interests = update.interests.clone();
            profile.emergency_contact = update.emergency_contact.clone();
            profile.profile_complete = true;
        }
        Ok(())
    }

    async fn get_tourist_id(&self) -> Result<Option<TouristId>> {
        self.record("GET /tourist-id".to_string());
        Ok(None)
    }

    async fn list_trips(&self) -> Result<Vec<Trip>> {
        self.record("GET /trips".to_string());
        Ok(self.state().trips.clone())
    }

    async fn create_trip(&self, _trip: &NewTrip) -> Result<TripCreated> {
        self.record("POST /trips".to_string());
        Ok(TripCreated {
            trip_id: Some(Id::from("new-trip")),
            message: None,
        })
    }

    async fn join_trip(&self, trip_id: &Id) -> Result<()> {
        self.record(format!("POST /trips/{}/join", trip_id));
        Ok(())
    }

    async fn list_messages(&self, trip_id: &Id) -> Result<Vec<Message>> {
        self.record(format!("GET /messages/{}", trip_id));
        let delay = self.state().messages_delay;
        // Snapshot before the delay so a slow fetch returns stale data
        let snapshot = self.state().messages.get(trip_id).cloned().unwrap_or_default();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state().messages_error {
            return Err(Error::Network("connection reset".to_string()));
        }
        Ok(snapshot)
    }

    async fn send_message(&self, trip_id: &Id, content: &str) -> Result<()> {
        self.record(format!("POST /messages/{}", trip_id));
        let mut state = self.state();
        if let Some(msg) = state.send_error.clone() {
            return Err(server(403, &msg));
        }
        state.sent.push((trip_id.clone(), content.to_string()));
        let next = state.messages.get(trip_id).map_or(0, |m| m.len()) as i64 + 1;
        state
            .messages
            .entry(trip_id.clone())
            .or_default()
            .push(message(next, 1, content));
        Ok(())
    }

    async fn send_sos(&self, request: &SosRequest) -> Result<SosReceipt> {
        self.record("POST /sos".to_string());
        self.state().sos_requests.push(request.clone());
        let delay = self.state().sos_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state()
            .sos
            .clone()
            .ok_or_else(|| server(503, "SOS service unavailable"))
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.record("GET /dashboard/stats".to_string());
        Ok(DashboardStats::default())
    }

    async fn heatmap(&self) -> Result<Vec<HeatPoint>> {
        self.record("GET /dashboard/heatmap".to_string());
        Ok(Vec::new())
    }
}
