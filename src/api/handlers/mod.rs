//! API handlers and shared input validation.
//!
//! The validation rules mirror what the web client enforces, so server-side
//! rejections only happen for clients bypassing the forms.

pub mod check_confirm;
pub mod health;
pub mod login;
pub mod logout;
pub mod pass_change;
pub mod photo_fields;
pub mod recall;
pub mod register;
pub mod who_am_i;

use rand::Rng;
use regex::Regex;

/// Registration confirmation keys are 7 characters.
pub const CONFIRM_KEY_REGISTER_LEN: usize = 7;
/// Password recovery keys are 8 characters; the length tells the flows apart.
pub const CONFIRM_KEY_RECALL_LEN: usize = 8;

const CONFIRM_KEY_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Login rules: 3-15 characters of letters, digits, dot, dash or
/// underscore, starting with a letter and ending with a letter or digit.
/// "anonymous" is reserved.
pub fn valid_login(login: &str) -> bool {
    let shape = Regex::new(r"^[.\w-]{3,15}$").is_ok_and(|re| re.is_match(login));
    let starts = Regex::new(r"^[A-Za-z]").is_ok_and(|re| re.is_match(login));
    let ends = Regex::new(r"[A-Za-z0-9]$").is_ok_and(|re| re.is_match(login));

    shape && starts && ends && !login.eq_ignore_ascii_case("anonymous")
}

/// Lightweight email sanity check used by auth handlers before persisting data.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Emails are compared and stored lowercase.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Random lowercase-alphanumeric confirmation key of the given length.
#[must_use]
pub fn gen_confirm_key(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CONFIRM_KEY_CHARSET.len());
            CONFIRM_KEY_CHARSET[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_logins() {
        for login in ["abc", "kodak", "Leica-M3", "a.b-c_1", "a23456789012345"] {
            assert!(valid_login(login), "{login} should be valid");
        }
    }

    #[test]
    fn invalid_logins() {
        // too short / too long
        assert!(!valid_login("ab"));
        assert!(!valid_login("a234567890123456"));
        // must start with a letter
        assert!(!valid_login("1abc"));
        assert!(!valid_login(".abc"));
        assert!(!valid_login("_abc"));
        // must end with a letter or digit
        assert!(!valid_login("abc."));
        assert!(!valid_login("abc-"));
        // forbidden characters
        assert!(!valid_login("ab c"));
        assert!(!valid_login("ab@c"));
        // reserved name, case-insensitive
        assert!(!valid_login("anonymous"));
        assert!(!valid_login("Anonymous"));
        assert!(!valid_login("ANONYMOUS"));
    }

    #[test]
    fn valid_emails() {
        assert!(valid_email("user@example.com"));
        assert!(valid_email("u.ser+tag@sub.example.org"));
        assert!(!valid_email("user@example"));
        assert!(!valid_email("user example.com"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("user@"));
    }

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  User@Example.COM "), "user@example.com");
    }

    #[test]
    fn confirm_keys_have_the_right_shape() {
        let register = gen_confirm_key(CONFIRM_KEY_REGISTER_LEN);
        let recall = gen_confirm_key(CONFIRM_KEY_RECALL_LEN);
        assert_eq!(register.len(), 7);
        assert_eq!(recall.len(), 8);
        for key in [register, recall] {
            assert!(key
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn confirm_keys_are_random() {
        let a = gen_confirm_key(CONFIRM_KEY_RECALL_LEN);
        let b = gen_confirm_key(CONFIRM_KEY_RECALL_LEN);
        assert_ne!(a, b);
    }
}
