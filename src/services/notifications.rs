use std::sync::Arc;

use askama::Template;
use futures::{stream, StreamExt};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::mail::{Contact, MailTransport, MessageRef, OutgoingMail, TransportError};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("could not render notification: {0}")]
    Render(#[from] askama::Error),
    #[error("could not open mail transport: {0}")]
    Connect(#[source] TransportError),
    #[error("delivery to {recipient} failed: {source}")]
    Transport {
        recipient: String,
        #[source]
        source: TransportError,
    },
    #[error("{failed} of {attempted} notifications failed, first: {source}")]
    Batch {
        failed: usize,
        attempted: usize,
        #[source]
        source: Box<DispatchError>,
    },
}

#[derive(Template)]
#[template(path = "email/trip_created.html")]
struct TripCreatedEmail<'a> {
    destination: &'a str,
    starts_at: &'a str,
    ends_at: &'a str,
    confirmation_link: &'a str,
}

#[derive(Template)]
#[template(path = "email/participant_invite.html")]
struct ParticipantInviteEmail<'a> {
    recipient_name: Option<&'a str>,
    destination: &'a str,
    starts_at: &'a str,
    ends_at: &'a str,
    confirmation_link: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Sent to the owner right after creation; links to the trip confirmation.
    TripCreated,
    /// Sent to each invitee once the trip is confirmed.
    ParticipantInvite,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: Contact,
    pub destination: String,
    pub starts_at: String,
    pub ends_at: String,
    pub confirmation_link: String,
}

impl Notification {
    pub fn subject(&self) -> String {
        match self.kind {
            NotificationKind::TripCreated => {
                format!("Confirme sua viagem para {}", self.destination)
            }
            NotificationKind::ParticipantInvite => format!(
                "Confirme sua presença na viagem para {} em {}",
                self.destination, self.starts_at
            ),
        }
    }

    pub fn render(&self) -> Result<String, DispatchError> {
        let html = match self.kind {
            NotificationKind::TripCreated => TripCreatedEmail {
                destination: &self.destination,
                starts_at: &self.starts_at,
                ends_at: &self.ends_at,
                confirmation_link: &self.confirmation_link,
            }
            .render()?,
            NotificationKind::ParticipantInvite => ParticipantInviteEmail {
                recipient_name: self.recipient.name.as_deref(),
                destination: &self.destination,
                starts_at: &self.starts_at,
                ends_at: &self.ends_at,
                confirmation_link: &self.confirmation_link,
            }
            .render()?,
        };
        Ok(html.trim().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct Delivery {
    pub recipient: Contact,
    pub message_ref: MessageRef,
}

#[derive(Debug)]
pub struct RecipientFailure {
    pub recipient: Contact,
    pub error: DispatchError,
}

/// Per-recipient outcome of one fan-out.
#[derive(Debug, Default)]
pub struct FanOutReport {
    pub delivered: Vec<Delivery>,
    pub failed: Vec<RecipientFailure>,
}

impl FanOutReport {
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    /// Strict aggregation: a single failed recipient fails the whole batch.
    pub fn into_result(self) -> Result<Vec<Delivery>, DispatchError> {
        let attempted = self.attempted();
        let failed = self.failed.len();
        match self.failed.into_iter().next() {
            None => Ok(self.delivered),
            Some(first) => Err(DispatchError::Batch {
                failed,
                attempted,
                source: Box::new(first.error),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    sender: Contact,
    concurrency: usize,
}

impl NotificationDispatcher {
    pub fn new(sender: Contact, concurrency: usize) -> Self {
        Self {
            sender,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn send(
        &self,
        transport: &dyn MailTransport,
        notification: &Notification,
    ) -> Result<MessageRef, DispatchError> {
        let html = notification.render()?;
        let mail = OutgoingMail {
            from: self.sender.clone(),
            to: notification.recipient.clone(),
            subject: notification.subject(),
            html,
        };
        let message_ref = transport
            .send(mail)
            .await
            .map_err(|source| DispatchError::Transport {
                recipient: notification.recipient.email.clone(),
                source,
            })?;
        debug!(recipient = %notification.recipient.email, message_ref = %message_ref, "notification sent");
        Ok(message_ref)
    }

    /// Sends every notification, at most `concurrency` at a time, and waits
    /// for all of them. Completion order across recipients is unspecified.
    pub async fn fan_out(
        &self,
        transport: Arc<dyn MailTransport>,
        notifications: Vec<Notification>,
    ) -> FanOutReport {
        let transport = transport.as_ref();
        let outcomes = stream::iter(notifications)
            .map(move |notification| async move {
                let outcome = self.send(transport, &notification).await;
                (notification.recipient, outcome)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut report = FanOutReport::default();
        for (recipient, outcome) in outcomes {
            match outcome {
                Ok(message_ref) => report.delivered.push(Delivery {
                    recipient,
                    message_ref,
                }),
                Err(error) => {
                    warn!(recipient = %recipient.email, error = %error, "notification failed");
                    report.failed.push(RecipientFailure { recipient, error });
                }
            }
        }
        info!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "notification fan-out finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::services::mail::{MailConnector, MemoryMailConnector};

    /// Tracks how many sends are in flight at once.
    #[derive(Default)]
    struct InFlightTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        sent: AtomicUsize,
    }

    #[async_trait]
    impl MailTransport for InFlightTransport {
        async fn send(&self, _mail: OutgoingMail) -> Result<MessageRef, TransportError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            for _ in 0..4 {
                tokio::task::yield_now().await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(MessageRef(format!("in-flight-{n}")))
        }
    }

    fn invite(email: &str, link: &str) -> Notification {
        Notification {
            kind: NotificationKind::ParticipantInvite,
            recipient: Contact::new(None, email),
            destination: "Paris".into(),
            starts_at: "18 de outubro de 2026".into(),
            ends_at: "23 de outubro de 2026".into(),
            confirmation_link: link.into(),
        }
    }

    fn dispatcher() -> NotificationDispatcher {
        NotificationDispatcher::new(
            Contact::new(Some("Equipe".into()), "viagens@example.com"),
            2,
        )
    }

    #[test]
    fn owner_mail_contains_trip_link_and_dates() {
        let notification = Notification {
            kind: NotificationKind::TripCreated,
            ..invite("ana@example.com", "http://localhost:3333/trips/t-1/confirm")
        };
        let html = notification.render().unwrap();
        assert!(html.contains("<strong>Paris</strong>"));
        assert!(html.contains("18 de outubro de 2026"));
        assert!(html.contains("23 de outubro de 2026"));
        assert!(html.contains(r#"href="http://localhost:3333/trips/t-1/confirm""#));
        assert_eq!(notification.subject(), "Confirme sua viagem para Paris");
    }

    #[test]
    fn destination_is_html_escaped() {
        let mut notification = invite("bob@example.com", "http://x/participants/p/confirm");
        notification.destination = "<script>".into();
        let html = notification.render().unwrap();
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn invite_subject_mentions_start_date() {
        let notification = invite("bob@example.com", "http://x");
        assert_eq!(
            notification.subject(),
            "Confirme sua presença na viagem para Paris em 18 de outubro de 2026"
        );
    }

    #[tokio::test]
    async fn fan_out_reaches_every_recipient() {
        let connector = MemoryMailConnector::new();
        let transport = connector.connect().await.unwrap();
        let notifications = vec![
            invite("bob@example.com", "http://x/participants/1/confirm"),
            invite("cid@example.com", "http://x/participants/2/confirm"),
            invite("dee@example.com", "http://x/participants/3/confirm"),
        ];

        let report = dispatcher().fan_out(transport, notifications).await;
        assert_eq!(report.attempted(), 3);
        let delivered = report.into_result().unwrap();
        assert_eq!(delivered.len(), 3);

        let bob = connector.sent_to("bob@example.com");
        assert_eq!(bob.len(), 1);
        assert!(bob[0].html.contains("http://x/participants/1/confirm"));
        assert_eq!(bob[0].from.email, "viagens@example.com");
    }

    #[tokio::test]
    async fn one_failure_fails_the_batch_after_trying_everyone() {
        let connector = MemoryMailConnector::new();
        connector.fail_for("cid@example.com");
        let transport = connector.connect().await.unwrap();
        let notifications = vec![
            invite("bob@example.com", "http://x/participants/1/confirm"),
            invite("cid@example.com", "http://x/participants/2/confirm"),
            invite("dee@example.com", "http://x/participants/3/confirm"),
        ];

        let report = dispatcher().fan_out(transport, notifications).await;
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].recipient.email, "cid@example.com");
        // The healthy recipients were still attempted.
        assert_eq!(connector.sent().len(), 2);

        match report.into_result() {
            Err(DispatchError::Batch {
                failed,
                attempted,
                source,
            }) => {
                assert_eq!((failed, attempted), (1, 3));
                assert!(matches!(*source, DispatchError::Transport { ref recipient, .. } if recipient == "cid@example.com"));
            }
            other => panic!("expected batch failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_fan_out_is_ok() {
        let connector = MemoryMailConnector::new();
        let transport = connector.connect().await.unwrap();
        let report = dispatcher().fan_out(transport, Vec::new()).await;
        assert!(report.into_result().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fan_out_runs_concurrently_up_to_the_limit() {
        let transport = Arc::new(InFlightTransport::default());
        let notifications = (0..7)
            .map(|i| invite(&format!("guest{i}@example.com"), "http://x/participants/p/confirm"))
            .collect();
        let dispatcher = NotificationDispatcher::new(
            Contact::new(None, "viagens@example.com"),
            3,
        );

        let report = dispatcher.fan_out(transport.clone(), notifications).await;
        assert_eq!(report.into_result().unwrap().len(), 7);

        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak > 1, "sends ran one at a time");
        assert!(peak <= 3, "{peak} sends in flight with a limit of 3");
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrency_of_one_sends_sequentially() {
        let transport = Arc::new(InFlightTransport::default());
        let notifications = (0..3)
            .map(|i| invite(&format!("guest{i}@example.com"), "http://x"))
            .collect();
        let dispatcher = NotificationDispatcher::new(Contact::new(None, "viagens@example.com"), 1);

        dispatcher.fan_out(transport.clone(), notifications).await;
        assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sent.load(Ordering::SeqCst), 3);
    }
}
