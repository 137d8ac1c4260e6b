use crate::{
    api,
    api::{
        config::AuthConfig,
        email::{EmailSender, EmailWorkerConfig, HttpEmailSender, LogEmailSender},
    },
    cli::{actions::Action, globals::GlobalArgs},
};
use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    let Action::Server {
        port,
        dsn,
        origin,
        admin_email,
        mail_url,
        mail_key,
        mail_from,
        outbox_poll_seconds,
        outbox_batch_size,
    } = action;

    // Reject malformed DSNs before the pool ever sees them
    let dsn = Url::parse(&dsn)?.to_string();

    let mut globals = GlobalArgs::new(origin.clone());
    globals.admin_email = admin_email.clone();
    globals.mail_from = mail_from;
    globals.mail_url = mail_url;
    if let Some(key) = mail_key {
        globals.set_mail_key(SecretString::from(key));
    }

    let sender: Arc<dyn EmailSender> = match &globals.mail_url {
        Some(url) => Arc::new(HttpEmailSender::new(
            url.clone(),
            globals.mail_key.clone(),
            globals.mail_from.clone(),
        )?),
        None => Arc::new(LogEmailSender),
    };

    let config = AuthConfig::new(origin).with_admin_email(admin_email);

    let email_config = EmailWorkerConfig::new()
        .with_poll_interval_seconds(outbox_poll_seconds)
        .with_batch_size(outbox_batch_size);

    api::new(port, dsn, config, sender, email_config).await
}
