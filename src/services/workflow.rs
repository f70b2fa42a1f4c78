use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::{
    clock::Clock,
    error::TripError,
    models::trip::NewTrip,
};

use super::{
    formatting::DateFormatter,
    invites::build_participants,
    mail::{Contact, MailConnector, MessageRef},
    notifications::{DispatchError, Notification, NotificationDispatcher, NotificationKind},
    repository::TripRepository,
    validator::validate_trip,
};

#[derive(Debug, Clone)]
pub struct CreateTrip {
    pub destination: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub owner_name: String,
    pub owner_email: String,
    pub emails_to_invite: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub trip_id: String,
    pub already_confirmed: bool,
}

/// Builds the URLs that end up in emails and redirects.
#[derive(Debug, Clone)]
pub struct Links {
    web_base_url: Url,
    api_base_url: Url,
}

impl Links {
    pub fn new(web_base_url: Url, api_base_url: Url) -> Self {
        Self {
            web_base_url,
            api_base_url,
        }
    }

    pub fn trip_confirmation(&self, trip_id: &str) -> String {
        format!("{}/trips/{trip_id}/confirm", base(&self.api_base_url))
    }

    pub fn participant_confirmation(&self, participant_id: &str) -> String {
        format!("{}/participants/{participant_id}/confirm", base(&self.api_base_url))
    }

    pub fn trip_page(&self, trip_id: &str) -> String {
        format!("{}/trips/{trip_id}", base(&self.web_base_url))
    }
}

fn base(url: &Url) -> &str {
    url.as_str().trim_end_matches('/')
}

/// Trip creation and confirmation, wired to storage, mail and the clock.
#[derive(Clone)]
pub struct TripService {
    repository: Arc<dyn TripRepository>,
    mailer: Arc<dyn MailConnector>,
    clock: Arc<dyn Clock>,
    dispatcher: NotificationDispatcher,
    dates: DateFormatter,
    links: Links,
}

impl TripService {
    pub fn new(
        repository: Arc<dyn TripRepository>,
        mailer: Arc<dyn MailConnector>,
        clock: Arc<dyn Clock>,
        dispatcher: NotificationDispatcher,
        dates: DateFormatter,
        links: Links,
    ) -> Self {
        Self {
            repository,
            mailer,
            clock,
            dispatcher,
            dates,
            links,
        }
    }

    pub fn links(&self) -> &Links {
        &self.links
    }

    /// Validates, stores the trip with all participants, then mails the owner.
    ///
    /// A failed owner mail fails the call even though the trip is already stored.
    #[instrument(skip_all, fields(destination = %request.destination))]
    pub async fn create_trip(&self, request: CreateTrip) -> Result<String, TripError> {
        let now = self.clock.now();
        validate_trip(&request.destination, request.starts_at, request.ends_at, now)?;

        let participants = build_participants(
            &request.owner_name,
            &request.owner_email,
            request.emails_to_invite,
        );
        let trip_id = self
            .repository
            .create(NewTrip {
                destination: request.destination.clone(),
                starts_at: request.starts_at,
                ends_at: request.ends_at,
                created_at: now,
                participants,
            })
            .await?;
        info!(trip_id = %trip_id, "trip created");

        let notification = Notification {
            kind: NotificationKind::TripCreated,
            recipient: Contact::new(Some(request.owner_name), request.owner_email),
            destination: request.destination,
            starts_at: self.dates.format(request.starts_at),
            ends_at: self.dates.format(request.ends_at),
            confirmation_link: self.links.trip_confirmation(&trip_id),
        };
        if let Err(err) = self.notify_owner(&notification).await {
            warn!(trip_id = %trip_id, error = %err, "trip stored but owner was not notified");
            return Err(err.into());
        }

        Ok(trip_id)
    }

    /// Flips the trip to confirmed once and mails every invitee.
    ///
    /// Calling it again on a confirmed trip neither writes nor mails.
    #[instrument(skip(self))]
    pub async fn confirm_trip(&self, trip_id: &str) -> Result<Confirmation, TripError> {
        let details = self
            .repository
            .find_by_id(trip_id)
            .await?
            .ok_or_else(|| TripError::TripNotFound(trip_id.to_string()))?;

        if details.trip.is_confirmed {
            debug!("trip already confirmed");
            return Ok(Confirmation {
                trip_id: details.trip.id,
                already_confirmed: true,
            });
        }

        if !self.repository.set_confirmed(trip_id).await? {
            // Another caller confirmed the trip between our read and write.
            debug!("trip confirmed concurrently");
            return Ok(Confirmation {
                trip_id: details.trip.id,
                already_confirmed: true,
            });
        }
        info!(invitees = details.participants.len(), "trip confirmed");

        let starts_at = self.dates.format(details.trip.starts_at);
        let ends_at = self.dates.format(details.trip.ends_at);
        let notifications = details
            .participants
            .iter()
            .map(|participant| Notification {
                kind: NotificationKind::ParticipantInvite,
                recipient: Contact::new(participant.name.clone(), participant.email.clone()),
                destination: details.trip.destination.clone(),
                starts_at: starts_at.clone(),
                ends_at: ends_at.clone(),
                confirmation_link: self.links.participant_confirmation(&participant.id),
            })
            .collect();

        let transport = self.mailer.connect().await.map_err(DispatchError::Connect)?;
        self.dispatcher
            .fan_out(transport, notifications)
            .await
            .into_result()?;

        Ok(Confirmation {
            trip_id: details.trip.id,
            already_confirmed: false,
        })
    }

    async fn notify_owner(&self, notification: &Notification) -> Result<MessageRef, DispatchError> {
        let transport = self.mailer.connect().await.map_err(DispatchError::Connect)?;
        self.dispatcher.send(transport.as_ref(), notification).await
    }
}
