use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    config::AppConfig,
    db::DbPool,
    error::AppError,
    services::{
        formatting::DateFormatter,
        mail::{connector_from_config, Contact, MailConnector},
        notifications::NotificationDispatcher,
        repository::SqliteTripRepository,
        workflow::{Links, TripService},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub trips: TripService,
}

impl AppState {
    pub fn new(config: AppConfig, db: DbPool, mailer: Arc<dyn MailConnector>) -> Result<Self, AppError> {
        Self::with_clock(config, db, mailer, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: AppConfig,
        db: DbPool,
        mailer: Arc<dyn MailConnector>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let dates = DateFormatter::from_config(&config.date_locale, &config.date_format)?;
        let dispatcher = NotificationDispatcher::new(
            Contact::new(
                Some(config.mail.from_name.clone()),
                config.mail.from_address.clone(),
            ),
            config.notify_concurrency,
        );
        let links = Links::new(config.web_base_url.clone(), config.api_base_url.clone());
        let trips = TripService::new(
            Arc::new(SqliteTripRepository::new(db.clone())),
            mailer,
            clock,
            dispatcher,
            dates,
            links,
        );
        Ok(Self { config, db, trips })
    }

    /// Builds the state with the mail transport selected by the config.
    pub fn from_config(config: AppConfig, db: DbPool) -> Result<Self, AppError> {
        let mailer = connector_from_config(&config.mail)
            .map_err(|err| AppError::Config(err.to_string()))?;
        Self::new(config, db, mailer)
    }
}
