use chrono::{Duration, Utc};

/// Confirmation keys live for two days, like the emails say.
pub const CONFIRM_TTL_SECONDS: i64 = 2 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    origin: String,
    admin_email: Option<String>,
    confirm_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(origin: String) -> Self {
        Self {
            origin,
            admin_email: None,
            confirm_ttl_seconds: CONFIRM_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_admin_email(mut self, admin_email: Option<String>) -> Self {
        self.admin_email = admin_email;
        self
    }

    #[must_use]
    pub fn with_confirm_ttl_seconds(mut self, seconds: i64) -> Self {
        self.confirm_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    #[must_use]
    pub fn admin_email(&self) -> Option<&str> {
        self.admin_email.as_deref()
    }

    #[must_use]
    pub fn confirm_ttl_seconds(&self) -> i64 {
        self.confirm_ttl_seconds
    }

    /// Link the web client resolves into the confirmation page.
    #[must_use]
    pub fn confirm_url(&self, key: &str) -> String {
        format!("{}/confirm/{key}", self.origin.trim_end_matches('/'))
    }

    /// Human-readable validity window quoted in outgoing emails,
    /// e.g. "2 days (until 2 September 2026 12:00 UTC)".
    #[must_use]
    pub fn link_validity_phrase(&self) -> String {
        let days = self.confirm_ttl_seconds / 86_400;
        let until = Utc::now() + Duration::seconds(self.confirm_ttl_seconds);
        let days_phrase = if days == 1 {
            "1 day".to_string()
        } else {
            format!("{days} days")
        };
        format!("{days_phrase} (until {} UTC)", until.format("%-d %B %Y %H:%M"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirm_url_strips_trailing_slash() {
        let config = AuthConfig::new("https://retrolens.org/".to_string());
        assert_eq!(
            config.confirm_url("abc1234"),
            "https://retrolens.org/confirm/abc1234"
        );
    }

    #[test]
    fn validity_phrase_mentions_two_days() {
        let config = AuthConfig::new("https://retrolens.org".to_string());
        assert!(config.link_validity_phrase().starts_with("2 days (until "));
    }

    #[test]
    fn validity_phrase_singular_day() {
        let config = AuthConfig::new("https://retrolens.org".to_string())
            .with_confirm_ttl_seconds(86_400);
        assert!(config.link_validity_phrase().starts_with("1 day (until "));
    }
}
