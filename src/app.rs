//! Application shell: owns the session, chat sync and SOS controller and
//! switches between views.

use crate::api::{ApiClient, SharedBackend};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    conversations_for, Dashboard, Id, NewTrip, Profile, TouristId, Trip, TripCreated,
};
use crate::session::{Session, SessionManager};
use crate::sos::SosController;
use crate::storage::TokenStore;
use crate::sync::MessageSync;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Trips,
    Profile,
    Messages,
    Dashboard,
}

pub struct App {
    backend: SharedBackend,
    session: SessionManager,
    sync: MessageSync,
    sos: SosController,
    view: View,
}

impl App {
    pub fn new(config: &Config, backend: SharedBackend) -> Self {
        Self {
            session: SessionManager::new(backend.clone(), TokenStore::new(config)),
            sync: MessageSync::new(backend.clone(), config.poll_interval()),
            sos: SosController::new(backend.clone(), config.sos_cooldown()),
            backend,
            view: View::default(),
        }
    }

    /// Build against the HTTP backend named in `config`
    pub fn connect(config: &Config) -> Result<Self> {
        let backend: SharedBackend = Arc::new(ApiClient::new(config)?);
        Ok(Self::new(config, backend))
    }

    /// Restore any persisted session
    pub async fn start(&mut self) -> bool {
        let signed_in = self.session.initialize().await;
        info!(signed_in, "app started");
        signed_in
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    pub fn sync(&self) -> &MessageSync {
        &self.sync
    }

    pub fn sos(&self) -> &SosController {
        &self.sos
    }

    pub fn sos_mut(&mut self) -> &mut SosController {
        &mut self.sos
    }

    /// Switch panels; leaving Messages unmounts the chat
    pub fn navigate(&mut self, view: View) {
        if self.view == View::Messages && view != View::Messages {
            self.sync.deselect();
        }
        debug!(from = ?self.view, to = ?view, "navigate");
        self.view = view;
    }

    /// Show the chat list, selecting the first conversation if none is open
    pub async fn open_conversations(&mut self) -> Result<Vec<Trip>> {
        let user_id = self.user()?.user_id.clone();
        self.navigate(View::Messages);

        let trips = self.backend.list_trips().await?;
        let conversations = conversations_for(&trips, &user_id);

        if self.sync.selected().is_none() {
            if let Some(first) = conversations.first() {
                self.sync.select(first.id.clone());
            }
        }
        Ok(conversations)
    }

    pub fn select_conversation(&mut self, trip_id: Id) {
        self.view = View::Messages;
        self.sync.select(trip_id);
    }

    pub async fn send_message(&self, content: &str) -> Result<()> {
        self.user()?;
        self.sync.send(content).await
    }

    pub async fn trips(&self) -> Result<Vec<Trip>> {
        self.user()?;
        self.backend.list_trips().await
    }

    pub async fn create_trip(&self, trip: &NewTrip) -> Result<TripCreated> {
        self.user()?;
        trip.validate()?;
        self.backend.create_trip(trip).await
    }

    pub async fn join_trip(&self, trip_id: &Id) -> Result<()> {
        self.user()?;
        self.backend.join_trip(trip_id).await
    }

    pub async fn profile(&self) -> Result<Profile> {
        self.user()?;
        self.backend.get_profile().await
    }

    pub async fn tourist_id(&self) -> Result<Option<TouristId>> {
        self.user()?;
        self.backend.get_tourist_id().await
    }

    /// Stats and heatmap, fetched together
    pub async fn dashboard(&self) -> Result<Dashboard> {
        let (stats, heatmap) =
            tokio::try_join!(self.backend.dashboard_stats(), self.backend.heatmap())?;
        Ok(Dashboard { stats, heatmap })
    }

    /// Sign out and cancel everything tied to the session
    pub fn logout(&mut self) {
        self.sync.deselect();
        self.sos.reset();
        self.session.logout();
        self.view = View::Trips;
        info!("signed out");
    }

    fn user(&self) -> Result<&Session> {
        self.session.session().ok_or(Error::NotAuthenticated)
    }
}
