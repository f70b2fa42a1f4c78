use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::participant::{NewParticipant, Participant};

#[derive(Debug, Clone, FromRow)]
pub struct Trip {
    pub id: String,
    pub destination: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub is_confirmed: bool,
    pub created_at: DateTime<Utc>,
}

/// A trip as loaded for confirmation: the owner is left out of `participants`.
#[derive(Debug, Clone)]
pub struct TripDetails {
    pub trip: Trip,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone)]
pub struct NewTrip {
    pub destination: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<NewParticipant>,
}
