//! REST client for the Travel Match backend
//!
//! Every call carries the bearer token when one is held and surfaces the
//! server's `error` field verbatim on non-2xx responses.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{
    AuthResponse, Credentials, DashboardStats, HeatPoint, Id, Message, NewTrip, OtpRequest,
    OutgoingMessage, Profile, ProfileUpdate, Registration, SosReceipt, SosRequest, TouristId,
    Trip, TripCreated,
};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Endpoints the core components depend on
#[async_trait]
pub trait Backend: Send + Sync {
    /// Replace (or drop) the bearer token sent with every request
    fn set_token(&self, token: Option<String>);

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse>;
    async fn register(&self, registration: &Registration) -> Result<AuthResponse>;
    async fn verify_otp(&self, code: &str) -> Result<()>;

    async fn get_profile(&self) -> Result<Profile>;
    async fn update_profile(&self, update: &ProfileUpdate) -> Result<()>;
    /// `Ok(None)` until the backend has generated an ID
    async fn get_tourist_id(&self) -> Result<Option<TouristId>>;

    async fn list_trips(&self) -> Result<Vec<Trip>>;
    async fn create_trip(&self, trip: &NewTrip) -> Result<TripCreated>;
    async fn join_trip(&self, trip_id: &Id) -> Result<()>;

    async fn list_messages(&self, trip_id: &Id) -> Result<Vec<Message>>;
    async fn send_message(&self, trip_id: &Id, content: &str) -> Result<()>;

    async fn send_sos(&self, request: &SosRequest) -> Result<SosReceipt>;

    async fn dashboard_stats(&self) -> Result<DashboardStats>;
    async fn heatmap(&self) -> Result<Vec<HeatPoint>>;
}

pub type SharedBackend = Arc<dyn Backend>;

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// HTTP implementation of [`Backend`]
pub struct ApiClient {
    base: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            base: config.api_base.trim_end_matches('/').to_string(),
            http,
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T> {
        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = self.token() {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%method, path, status = status.as_u16(), "api response");

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&text)
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| "Request failed".to_string());
            return Err(Error::Server {
                status: status.as_u16(),
                message,
            });
        }

        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(text)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body)).await
    }

    async fn put<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(body)).await
    }
}

#[async_trait]
impl Backend for ApiClient {
    fn set_token(&self, token: Option<String>) {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = token;
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthResponse> {
        self.post("/login", credentials).await
    }

    async fn register(&self, registration: &Registration) -> Result<AuthResponse> {
        self.post("/register", registration).await
    }

    async fn verify_otp(&self, code: &str) -> Result<()> {
        let request = OtpRequest {
            code: code.to_string(),
        };
        let _: serde_json::Value = self.post("/mock-otp", &request).await?;
        Ok(())
    }

    async fn get_profile(&self) -> Result<Profile> {
        self.get("/profile").await
    }

    async fn update_profile(&self, update: &ProfileUpdate) -> Result<()> {
        let _: serde_json::Value = self.put("/profile", update).await?;
        Ok(())
    }

    async fn get_tourist_id(&self) -> Result<Option<TouristId>> {
        match self.get("/tourist-id").await {
            Ok(id) => Ok(Some(id)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_trips(&self) -> Result<Vec<Trip>> {
        self.get("/trips").await
    }

    async fn create_trip(&self, trip: &NewTrip) -> Result<TripCreated> {
        self.post("/trips", trip).await
    }

    async fn join_trip(&self, trip_id: &Id) -> Result<()> {
        let path = format!("/trips/{}/join", trip_id);
        let _: serde_json::Value = self.request(Method::POST, &path, None).await?;
        Ok(())
    }

    async fn list_messages(&self, trip_id: &Id) -> Result<Vec<Message>> {
        self.get(&format!("/messages/{}", trip_id)).await
    }

    async fn send_message(&self, trip_id: &Id, content: &str) -> Result<()> {
        let body = OutgoingMessage {
            content: content.to_string(),
        };
        let _: serde_json::Value = self.post(&format!("/messages/{}", trip_id), &body).await?;
        Ok(())
    }

    async fn send_sos(&self, request: &SosRequest) -> Result<SosReceipt> {
        self.post("/sos", request).await
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.get("/dashboard/stats").await
    }

    async fn heatmap(&self) -> Result<Vec<HeatPoint>> {
        self.get("/dashboard/heatmap").await
    }
}
