//! Email outbox worker, templates and delivery abstractions.
//!
//! Registration and password recovery enqueue rows in `email_outbox` with
//! status `pending`. A background task periodically polls that table, locks
//! a batch via `FOR UPDATE SKIP LOCKED`, renders each row's template and
//! hands the result to an `EmailSender`. The worker then updates the outbox
//! row to `sent` or `failed`.
//!
//! Failed rows are retried with exponential backoff and jitter until a max
//! attempt threshold is reached. The default sender for local dev is
//! `LogEmailSender`, which logs and returns `Ok(())`; pointing the service
//! at an HTTP mail API switches delivery to `HttpEmailSender`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

pub const TEMPLATE_REGISTRATION: &str = "registration";
pub const TEMPLATE_RECALL: &str = "recall";

/// An outbox row ready for delivery.
#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub bcc_email: Option<String>,
    pub template: String,
    pub payload_json: String,
}

/// A rendered message: subject line plus plain-text body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
}

/// Fields every template expects in its payload.
#[derive(Deserialize, Debug)]
struct TemplatePayload {
    login: String,
    link: String,
    linkvalid: String,
}

/// Render a template into subject and body. Unknown templates are an
/// error so a bad enqueue shows up as a failed outbox row.
pub fn render_template(template: &str, payload_json: &str) -> Result<RenderedEmail> {
    let payload: TemplatePayload =
        serde_json::from_str(payload_json).context("failed to parse email payload")?;

    match template {
        TEMPLATE_REGISTRATION => Ok(RenderedEmail {
            subject: "Registration at Retrolens".to_string(),
            text: format!(
                "Hello, {login}!\n\n\
                 Thanks for registering at Retrolens!\n\
                 To confirm your registration and activate the account, follow the link below:\n\n\
                 {link}\n\n\
                 The link is valid for {linkvalid}.\n\
                 If you received this message by mistake, just ignore it.\n",
                login = payload.login,
                link = payload.link,
                linkvalid = payload.linkvalid,
            ),
        }),
        TEMPLATE_RECALL => Ok(RenderedEmail {
            subject: "Password recovery at Retrolens".to_string(),
            text: format!(
                "Hello, {login}!\n\n\
                 You requested a password recovery at Retrolens.\n\
                 To set a new password, follow the link below:\n\n\
                 {link}\n\n\
                 The link is valid for {linkvalid}.\n\
                 If you didn't request the recovery, ignore this message.\n",
                login = payload.login,
                link = payload.link,
                linkvalid = payload.linkvalid,
            ),
        }),
        other => anyhow::bail!("unknown email template: {other}"),
    }
}

/// Email delivery abstraction used by the outbox worker.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    async fn send(&self, message: &EmailMessage, rendered: &RenderedEmail) -> Result<()>;
}

/// Local dev sender that logs the rendered mail instead of sending it.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage, rendered: &RenderedEmail) -> Result<()> {
        info!(
            to_email = %message.to_email,
            bcc_email = message.bcc_email.as_deref().unwrap_or(""),
            template = %message.template,
            subject = %rendered.subject,
            body = %rendered.text,
            "email outbox send stub"
        );
        Ok(())
    }
}

/// Delivery through a JSON-over-HTTP mail API, authorized with a bearer key.
#[derive(Clone, Debug)]
pub struct HttpEmailSender {
    client: reqwest::Client,
    url: String,
    key: SecretString,
    from: String,
}

impl HttpEmailSender {
    pub fn new(url: String, key: SecretString, from: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(crate::api::APP_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build mail HTTP client")?;

        Ok(Self {
            client,
            url,
            key,
            from,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage, rendered: &RenderedEmail) -> Result<()> {
        let mut body = json!({
            "from": self.from,
            "to": [message.to_email],
            "subject": rendered.subject,
            "text": rendered.text,
        });

        if let Some(bcc) = &message.bcc_email {
            body["bcc"] = json!([bcc]);
        }

        self.client
            .post(&self.url)
            .bearer_auth(self.key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("failed to reach mail API")?
            .error_for_status()
            .context("mail API rejected the message")?;

        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl EmailWorkerConfig {
    /// Default worker config: 2s poll interval, 10 messages per batch,
    /// 5 max attempts, and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = if self.batch_size == 0 {
            1
        } else {
            self.batch_size
        };
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            poll_interval,
            batch_size,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for EmailWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that polls and processes the email outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn EmailSender>,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let poll_interval = config.poll_interval();

        loop {
            let batch_result = process_outbox_batch(&pool, sender.as_ref(), &config).await;
            if let Err(err) = batch_result {
                error!("email outbox batch failed: {err}");
            }

            sleep(poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn EmailSender,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    // Grab a locked batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, to_email, bcc_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(config.batch_size()).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    if rows.is_empty() {
        // Commit even on empty to release locks and keep poll loop consistent.
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0);
        let message = EmailMessage {
            to_email: row.get("to_email"),
            bcc_email: row.get("bcc_email"),
            template: row.get("template"),
            payload_json: row.get("payload_json"),
        };

        let send_result = match render_template(&message.template, &message.payload_json) {
            Ok(rendered) => sender.send(&message, &rendered).await,
            Err(err) => Err(err),
        };
        update_outbox_status(&mut tx, id, attempts, send_result, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

async fn update_outbox_status(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    send_result: Result<()>,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let next_attempt = attempts.saturating_add(1);
    let next_attempts_i32 = i32::try_from(next_attempt).unwrap_or(i32::MAX);
    match send_result {
        Ok(()) => {
            let query = r"
                UPDATE email_outbox
                SET status = 'sent',
                    attempts = $2,
                    last_error = NULL,
                    sent_at = NOW(),
                    next_attempt_at = NOW()
                WHERE id = $1
            ";
            let span = info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "UPDATE",
                db.statement = query
            );
            sqlx::query(query)
                .bind(id)
                .bind(next_attempts_i32)
                .execute(&mut **tx)
                .instrument(span)
                .await
                .context("failed to update outbox status to sent")?;
        }
        Err(err) => {
            let max_attempts = config.max_attempts();
            if next_attempt >= max_attempts {
                let query = r"
                    UPDATE email_outbox
                    SET status = 'failed',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW()
                    WHERE id = $1
                ";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(id)
                    .bind(next_attempts_i32)
                    .bind(err.to_string())
                    .execute(&mut **tx)
                    .instrument(span)
                    .await
                    .context("failed to update outbox status to failed")?;
            } else {
                let delay =
                    backoff_delay(next_attempt, config.backoff_base(), config.backoff_max());
                let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
                let query = r"
                    UPDATE email_outbox
                    SET status = 'pending',
                        attempts = $2,
                        last_error = $3,
                        next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
                    WHERE id = $1
                ";
                let span = info_span!(
                    "db.query",
                    db.system = "postgresql",
                    db.operation = "UPDATE",
                    db.statement = query
                );
                sqlx::query(query)
                    .bind(id)
                    .bind(next_attempts_i32)
                    .bind(err.to_string())
                    .bind(delay_ms)
                    .execute(&mut **tx)
                    .instrument(span)
                    .await
                    .context("failed to update outbox retry schedule")?;
            }
        }
    }

    Ok(())
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    let capped = if delay > max { max } else { delay };
    jitter_delay(capped)
}

fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> String {
        json!({
            "login": "kodak",
            "link": "https://retrolens.org/confirm/abc1234",
            "linkvalid": "2 days (until 2 September 2026 12:00 UTC)"
        })
        .to_string()
    }

    #[test]
    fn registration_template_renders() {
        let rendered = render_template(TEMPLATE_REGISTRATION, &payload()).unwrap();
        assert_eq!(rendered.subject, "Registration at Retrolens");
        assert!(rendered.text.contains("Hello, kodak!"));
        assert!(rendered
            .text
            .contains("https://retrolens.org/confirm/abc1234"));
        assert!(rendered.text.contains("valid for 2 days"));
    }

    #[test]
    fn recall_template_renders() {
        let rendered = render_template(TEMPLATE_RECALL, &payload()).unwrap();
        assert_eq!(rendered.subject, "Password recovery at Retrolens");
        assert!(rendered.text.contains("password recovery"));
        assert!(rendered
            .text
            .contains("https://retrolens.org/confirm/abc1234"));
    }

    #[test]
    fn unknown_template_is_an_error() {
        assert!(render_template("newsletter", &payload()).is_err());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(render_template(TEMPLATE_REGISTRATION, "{\"login\": 1}").is_err());
    }

    #[test]
    fn normalize_clamps_degenerate_values() {
        let config = EmailWorkerConfig::new()
            .with_poll_interval_seconds(0)
            .with_batch_size(0)
            .with_max_attempts(0)
            .normalize();
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.batch_size(), 1);
        assert_eq!(config.max_attempts(), 1);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        let first = backoff_delay(1, base, max);
        assert!(first >= Duration::from_millis(2_500));
        assert!(first <= Duration::from_secs(5));
        let late = backoff_delay(30, base, max);
        assert!(late <= max);
    }
}
