pub mod server;

#[derive(Debug)]
pub enum Action {
    Server {
        port: u16,
        dsn: String,
        origin: String,
        admin_email: Option<String>,
        mail_url: Option<String>,
        mail_key: Option<String>,
        mail_from: String,
        outbox_poll_seconds: u64,
        outbox_batch_size: usize,
    },
}
