use secrecy::SecretString;

/// Settings shared by handlers and the mail pipeline, resolved once at startup.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub origin: String,
    pub admin_email: Option<String>,
    pub mail_from: String,
    pub mail_url: Option<String>,
    pub mail_key: SecretString,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(origin: String) -> Self {
        Self {
            origin,
            admin_email: None,
            mail_from: String::new(),
            mail_url: None,
            mail_key: SecretString::default(),
        }
    }

    pub fn set_mail_key(&mut self, key: SecretString) {
        self.mail_key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let origin = "https://retrolens.org".to_string();
        let args = GlobalArgs::new(origin);
        assert_eq!(args.origin, "https://retrolens.org");
        assert_eq!(args.mail_key.expose_secret(), "");
        assert!(args.admin_email.is_none());
    }
}
