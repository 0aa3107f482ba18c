//! Database models for gumshoe.
//!
//! Emails are stored lowercased and trimmed; every lookup goes through
//! [`normalize_email`] first.

pub mod blacklist;
pub mod subscriber;

pub use blacklist::*;
pub use subscriber::*;

/// Canonical storage form of an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Viewer@Example.COM "), "viewer@example.com");
    }
}
