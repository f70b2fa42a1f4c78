use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{
    db::DbPool,
    models::{
        participant::Participant,
        trip::{NewTrip, Trip, TripDetails},
    },
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Durable storage of trips and their participants.
#[async_trait]
pub trait TripRepository: Send + Sync {
    /// Inserts the trip and all of its participants in one transaction and
    /// returns the new trip id.
    async fn create(&self, trip: NewTrip) -> Result<String, RepositoryError>;

    /// Loads a trip together with its non-owner participants.
    async fn find_by_id(&self, trip_id: &str) -> Result<Option<TripDetails>, RepositoryError>;

    /// Marks a pending trip confirmed. Returns `false` when no pending trip
    /// matched, so concurrent callers see exactly one `true`.
    async fn set_confirmed(&self, trip_id: &str) -> Result<bool, RepositoryError>;
}

#[derive(Clone)]
pub struct SqliteTripRepository {
    pool: DbPool,
}

impl SqliteTripRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Every participant of a trip, owner first, in creation order.
    pub async fn list_participants(
        &self,
        trip_id: &str,
    ) -> Result<Vec<Participant>, RepositoryError> {
        let participants = sqlx::query_as::<_, Participant>(
            "SELECT id, trip_id, name, email, is_owner, is_confirmed
             FROM participants WHERE trip_id = ? ORDER BY position",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(participants)
    }

    pub async fn count_trips(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trips")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl TripRepository for SqliteTripRepository {
    async fn create(&self, trip: NewTrip) -> Result<String, RepositoryError> {
        let trip_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO trips (id, destination, starts_at, ends_at, is_confirmed, created_at)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(&trip_id)
        .bind(&trip.destination)
        .bind(trip.starts_at)
        .bind(trip.ends_at)
        .bind(trip.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, participant) in trip.participants.iter().enumerate() {
            sqlx::query(
                "INSERT INTO participants (id, trip_id, position, name, email, is_owner, is_confirmed)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&trip_id)
            .bind(position as i64)
            .bind(&participant.name)
            .bind(&participant.email)
            .bind(participant.is_owner)
            .bind(participant.is_confirmed)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(trip_id = %trip_id, participants = trip.participants.len(), "trip stored");
        Ok(trip_id)
    }

    async fn find_by_id(&self, trip_id: &str) -> Result<Option<TripDetails>, RepositoryError> {
        let Some(trip) = sqlx::query_as::<_, Trip>(
            "SELECT id, destination, starts_at, ends_at, is_confirmed, created_at
             FROM trips WHERE id = ?",
        )
        .bind(trip_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let participants = sqlx::query_as::<_, Participant>(
            "SELECT id, trip_id, name, email, is_owner, is_confirmed
             FROM participants WHERE trip_id = ? AND is_owner = 0 ORDER BY position",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(TripDetails { trip, participants }))
    }

    async fn set_confirmed(&self, trip_id: &str) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("UPDATE trips SET is_confirmed = 1 WHERE id = ? AND is_confirmed = 0")
                .bind(trip_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::{db::test_pool, models::participant::NewParticipant};

    fn sample_trip() -> NewTrip {
        let now = Utc::now();
        let starts_at = now + Duration::days(1);
        NewTrip {
            destination: "Lisboa".into(),
            starts_at,
            ends_at: starts_at + Duration::days(3),
            created_at: now,
            participants: vec![
                NewParticipant::owner("Ana", "ana@example.com"),
                NewParticipant::invitee("bob@example.com"),
                NewParticipant::invitee("cid@example.com"),
            ],
        }
    }

    #[tokio::test]
    async fn create_then_find_skips_owner() {
        let repo = SqliteTripRepository::new(test_pool().await);
        let trip_id = repo.create(sample_trip()).await.unwrap();

        let details = repo.find_by_id(&trip_id).await.unwrap().unwrap();
        assert_eq!(details.trip.destination, "Lisboa");
        assert!(!details.trip.is_confirmed);
        let emails: Vec<_> = details.participants.iter().map(|p| p.email.as_str()).collect();
        assert_eq!(emails, ["bob@example.com", "cid@example.com"]);
        assert!(details.participants.iter().all(|p| p.trip_id == trip_id));

        let all = repo.list_participants(&trip_id).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].is_owner && all[0].is_confirmed);
        assert_eq!(all[0].name.as_deref(), Some("Ana"));
    }

    #[tokio::test]
    async fn find_unknown_trip_is_none() {
        let repo = SqliteTripRepository::new(test_pool().await);
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_confirmed_flips_flag_only_once() {
        let repo = SqliteTripRepository::new(test_pool().await);
        let trip_id = repo.create(sample_trip()).await.unwrap();

        assert!(repo.set_confirmed(&trip_id).await.unwrap());
        let details = repo.find_by_id(&trip_id).await.unwrap().unwrap();
        assert!(details.trip.is_confirmed);

        assert!(!repo.set_confirmed(&trip_id).await.unwrap());
    }

    #[tokio::test]
    async fn set_confirmed_on_missing_trip_changes_nothing() {
        let repo = SqliteTripRepository::new(test_pool().await);
        assert!(!repo.set_confirmed("missing").await.unwrap());
    }
}
