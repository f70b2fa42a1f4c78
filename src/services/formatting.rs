use chrono::{DateTime, Locale, Utc};

use crate::error::AppError;

/// Renders trip dates for notification emails.
///
/// Locale and pattern are explicit so nothing depends on process-wide state.
#[derive(Debug, Clone)]
pub struct DateFormatter {
    locale: Locale,
    pattern: String,
}

impl DateFormatter {
    pub fn new(locale: Locale, pattern: impl Into<String>) -> Self {
        Self {
            locale,
            pattern: pattern.into(),
        }
    }

    /// Builds a formatter from a POSIX locale name such as `pt_BR`.
    pub fn from_config(locale: &str, pattern: &str) -> Result<Self, AppError> {
        let locale = Locale::try_from(locale)
            .map_err(|_| AppError::Config(format!("unknown DATE_LOCALE: {locale}")))?;
        Ok(Self::new(locale, pattern))
    }

    pub fn format(&self, at: DateTime<Utc>) -> String {
        at.format_localized(&self.pattern, self.locale).to_string()
    }
}

impl Default for DateFormatter {
    /// Long Brazilian Portuguese date, e.g. "18 de outubro de 2026".
    fn default() -> Self {
        Self::new(Locale::pt_BR, "%-d de %B de %Y")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn default_is_long_portuguese_date() {
        let at = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        assert_eq!(DateFormatter::default().format(at), "18 de outubro de 2026");
    }

    #[test]
    fn configured_locale_and_pattern_are_used() {
        let formatter = DateFormatter::from_config("en_US", "%B %-d, %Y").unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).unwrap();
        assert_eq!(formatter.format(at), "March 5, 2026");
    }

    #[test]
    fn unknown_locale_is_a_config_error() {
        let err = DateFormatter::from_config("xx_NOPE", "%Y").unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
