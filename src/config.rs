use std::{env, net::SocketAddr};

use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTransportKind {
    /// Log rendered mails instead of delivering them.
    Log,
    Smtp,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls: bool,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub transport: MailTransportKind,
    pub smtp: Option<SmtpConfig>,
    pub from_name: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    /// Human-facing trip pages live here.
    pub web_base_url: Url,
    /// Confirmation endpoints embedded in emails live here.
    pub api_base_url: Url,
    pub mail: MailConfig,
    pub notify_concurrency: usize,
    pub date_locale: String,
    pub date_format: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://trips.db?mode=rwc".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3333".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let web_base_url = parse_url("WEB_BASE_URL", "http://localhost:3000")?;
        let api_base_url = parse_url("API_BASE_URL", "http://localhost:3333")?;

        let transport = match env::var("MAIL_TRANSPORT")
            .unwrap_or_else(|_| "log".to_string())
            .to_lowercase()
            .as_str()
        {
            "log" => MailTransportKind::Log,
            "smtp" => MailTransportKind::Smtp,
            other => {
                return Err(AppError::Config(format!(
                    "invalid MAIL_TRANSPORT: {other} (expected log or smtp)"
                )))
            }
        };

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env::var("SMTP_PORT")
                    .unwrap_or_else(|_| "587".to_string())
                    .parse()
                    .map_err(|err| AppError::Config(format!("invalid SMTP_PORT: {err}")))?,
                username: env::var("SMTP_USERNAME").ok(),
                password: env::var("SMTP_PASSWORD").ok(),
                starttls: parse_bool("SMTP_STARTTLS", true)?,
            }),
            Err(_) => None,
        };
        if transport == MailTransportKind::Smtp && smtp.is_none() {
            return Err(AppError::Config(
                "MAIL_TRANSPORT=smtp requires SMTP_HOST".into(),
            ));
        }

        let mail = MailConfig {
            transport,
            smtp,
            from_name: env::var("MAIL_FROM_NAME")
                .unwrap_or_else(|_| "Equipe Gabu Flight".to_string()),
            from_address: env::var("MAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| "viagens@gabuflight.com".to_string()),
        };

        let notify_concurrency = env::var("NOTIFY_CONCURRENCY")
            .unwrap_or_else(|_| "8".to_string())
            .parse::<usize>()
            .map_err(|err| AppError::Config(format!("invalid NOTIFY_CONCURRENCY: {err}")))?;
        if notify_concurrency == 0 {
            return Err(AppError::Config(
                "NOTIFY_CONCURRENCY must be at least 1".into(),
            ));
        }

        let date_locale = env::var("DATE_LOCALE").unwrap_or_else(|_| "pt_BR".to_string());
        let date_format = env::var("DATE_FORMAT").unwrap_or_else(|_| "%-d de %B de %Y".to_string());

        Ok(Self {
            database_url,
            listen_addr,
            web_base_url,
            api_base_url,
            mail,
            notify_concurrency,
            date_locale,
            date_format,
        })
    }
}

fn parse_url(key: &str, default: &str) -> Result<Url, AppError> {
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|err| AppError::Config(format!("invalid {key}: {err}")))
}

fn parse_bool(key: &str, default: bool) -> Result<bool, AppError> {
    match env::var(key) {
        Err(_) => Ok(default),
        Ok(value) => match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(AppError::Config(format!("invalid {key}: {other}"))),
        },
    }
}
