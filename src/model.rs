//! Wire types for the Travel Match REST backend
//!
//! Field names follow the backend's JSON. Forms carry their own
//! required-field checks so nothing incomplete is ever posted.

use crate::config::{DEFAULT_MAX_PARTICIPANTS, DEFAULT_SOS_LOCATION, DEFAULT_SOS_MESSAGE};
use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque backend identifier (accepts JSON strings or integers)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawId")]
pub struct Id(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for Id {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => Id(s),
            RawId::Number(n) => Id(n.to_string()),
        }
    }
}

impl Id {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id(s)
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id(n.to_string())
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(())
}

fn default_max_participants() -> u32 {
    DEFAULT_MAX_PARTICIPANTS
}

/// Treat an explicit `null` like a missing key
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCount {
    Number(u64),
    Text(String),
    Other(serde::de::IgnoredAny),
}

/// Trip size as a number or numeric string; anything else falls back to the default
fn participant_limit<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let limit = match Option::<RawCount>::deserialize(deserializer)? {
        Some(RawCount::Number(n)) => u32::try_from(n).ok(),
        Some(RawCount::Text(s)) => s.trim().parse().ok(),
        Some(RawCount::Other(_)) | None => None,
    };
    Ok(limit.unwrap_or(DEFAULT_MAX_PARTICIPANTS))
}

// ============================================================================
// Auth
// ============================================================================

/// User summary returned by login and registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub profile_complete: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        require("email", &self.email)?;
        require("password", &self.password)
    }
}

/// Sign-up form; phone is optional
#[derive(Debug, Clone, Default, Serialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
}

impl Registration {
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)?;
        require("email", &self.email)?;
        require("password", &self.password)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OtpRequest {
    pub code: String,
}

// ============================================================================
// Profile
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub id: Id,
    pub name: String,
    pub email: String,
    pub bio: String,
    pub location: String,
    pub interests: Vec<String>,
    pub emergency_contact: String,
    pub verified: bool,
    pub profile_complete: bool,
}

/// Editable part of the profile
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfileUpdate {
    pub bio: String,
    pub location: String,
    pub interests: Vec<String>,
    pub emergency_contact: String,
}

impl ProfileUpdate {
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            bio: profile.bio.clone(),
            location: profile.location.clone(),
            interests: profile.interests.clone(),
            emergency_contact: profile.emergency_contact.clone(),
        }
    }

    /// Split a comma-separated interests field, trimming each entry
    pub fn parse_interests(input: &str) -> Vec<String> {
        input
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Mock blockchain-backed tourist identity
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TouristId {
    pub id: String,
    pub created_at: String,
    pub blockchain_hash: String,
    #[serde(default)]
    pub verified: bool,
}

// ============================================================================
// Trips
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Creator {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A trip, which doubles as a chat room
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Trip {
    pub id: Id,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub destination: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_date: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end_date: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(
        default = "default_max_participants",
        deserialize_with = "participant_limit"
    )]
    pub max_participants: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub participants: Vec<Id>,
    #[serde(default)]
    pub creator_id: Option<Id>,
    #[serde(default)]
    pub creator: Option<Creator>,
}

impl Trip {
    pub fn has_participant(&self, user_id: &Id) -> bool {
        self.participants.contains(user_id)
    }

    pub fn is_full(&self) -> bool {
        self.participants.len() >= self.max_participants as usize
    }

    pub fn open_spots(&self) -> usize {
        (self.max_participants as usize).saturating_sub(self.participants.len())
    }
}

/// Trips the user takes part in; these are the user's conversations
pub fn conversations_for(trips: &[Trip], user_id: &Id) -> Vec<Trip> {
    trips
        .iter()
        .filter(|t| t.has_participant(user_id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTrip {
    pub title: String,
    pub destination: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
    pub max_participants: u32,
}

impl Default for NewTrip {
    fn default() -> Self {
        Self {
            title: String::new(),
            destination: String::new(),
            start_date: String::new(),
            end_date: String::new(),
            description: String::new(),
            max_participants: DEFAULT_MAX_PARTICIPANTS,
        }
    }
}

impl NewTrip {
    pub fn validate(&self) -> Result<()> {
        require("title", &self.title)?;
        require("destination", &self.destination)?;
        require("start_date", &self.start_date)?;
        require("end_date", &self.end_date)?;
        if self.max_participants == 0 {
            return Err(Error::Validation(
                "max_participants must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TripCreated {
    #[serde(default)]
    pub trip_id: Option<Id>,
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Messages
// ============================================================================

/// A chat message in a trip conversation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub id: Id,
    pub sender_id: Id,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub content: String,
    pub timestamp: String,
}

impl Message {
    /// Parse the backend's ISO-8601 timestamp (no zone suffix)
    pub fn sent_at(&self) -> Option<NaiveDateTime> {
        let raw = self.timestamp.trim_end_matches('Z');
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
    }

    pub fn sender_label(&self) -> &str {
        self.sender_name.as_deref().unwrap_or("Unknown")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutgoingMessage {
    pub content: String,
}

// ============================================================================
// SOS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosRequest {
    pub location: String,
    pub message: String,
}

impl SosRequest {
    /// Build the request, substituting defaults for blank fields
    pub fn with_defaults(location: Option<&str>, message: Option<&str>) -> Self {
        let pick = |value: Option<&str>, fallback: &str| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            location: pick(location, DEFAULT_SOS_LOCATION),
            message: pick(message, DEFAULT_SOS_MESSAGE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SosReceipt {
    pub alert_id: String,
    #[serde(default)]
    pub nearby_users_notified: u32,
    #[serde(default)]
    pub authorities_notified: bool,
}

// ============================================================================
// Dashboard
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiskArea {
    pub location: String,
    pub risk_level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DashboardStats {
    pub total_users: u64,
    pub active_trips: u64,
    pub total_trips: u64,
    pub emergency_alerts: u64,
    pub verified_tourists: u64,
    pub risk_areas: Vec<RiskArea>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HeatPoint {
    pub lat: f64,
    pub lng: f64,
    pub intensity: f64,
}

/// Authority dashboard snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub heatmap: Vec<HeatPoint>,
}
