//! Subjects and HTML bodies of outgoing mail.

use chrono::NaiveDate;
use url::Url;

use super::{MailError, OutgoingMail};
use crate::auth::SignedToken;

pub const VERIFICATION_SUBJECT: &str = "Verify Your Email to Access TV Gumshoe";

/// Renders mail whose links point at the public API.
#[derive(Debug, Clone)]
pub struct MailTemplates {
    api_url: Url,
}

impl MailTemplates {
    pub fn new(api_url: &str) -> Result<Self, MailError> {
        let api_url = Url::parse(api_url)
            .map_err(|e| MailError::Build(format!("invalid API URL '{api_url}': {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(MailError::Build(format!("invalid API URL '{api_url}'")));
        }
        Ok(Self { api_url })
    }

    /// `{api_url}/auth/{action}?email=..&expires=..&signature=..`
    fn link(&self, action: &str, token: &SignedToken) -> String {
        let mut url = self.api_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["auth", action]);
        }
        url.set_query(Some(&token.to_query()));
        url.to_string()
    }

    pub fn redirect_link(&self, token: &SignedToken) -> String {
        self.link("redirect", token)
    }

    pub fn blacklist_link(&self, token: &SignedToken) -> String {
        self.link("blacklist", token)
    }

    /// The daily digest of shows airing on `date`.
    pub fn daily_notification(
        &self,
        token: &SignedToken,
        shows: &[String],
        date: NaiveDate,
    ) -> OutgoingMail {
        let items: String = shows
            .iter()
            .map(|name| format!("<li>{}</li>", escape_html(name)))
            .collect();

        let html_body = format!(
            r#"<p>Hey there,</p>
<p>We're excited to let you know that the following shows have new episodes premiering today:</p>
<ul>{items}</ul>
<br />
<br />
<p>Don't like these emails? <a href="{blacklist}">Blacklist</a> this email address.</p>
"#,
            blacklist = escape_html(&self.blacklist_link(token)),
        );

        OutgoingMail {
            to: token.email.clone(),
            subject: daily_subject(date),
            html_body,
        }
    }

    /// The magic link granting access for the token's lifetime.
    pub fn verification_link(&self, token: &SignedToken) -> OutgoingMail {
        let html_body = format!(
            r#"<p>Hey there,</p>
<p>To access your account on Gumshoe, please verify your email address by clicking the link below. This link will expire in 24 hours and will grant you access to your account throughout that time. Feel free to request another link at anytime.</p>
<p>If you did not request this email, you can safely ignore it. Your account will remain secure.</p>
<br />
<a href="{redirect}" target="_blank">Verify My Email</a>
<br />
<br />
<p>Don't like these emails? <a href="{blacklist}">Blacklist</a> this email address.</p>
"#,
            redirect = escape_html(&self.redirect_link(token)),
            blacklist = escape_html(&self.blacklist_link(token)),
        );

        OutgoingMail {
            to: token.email.clone(),
            subject: VERIFICATION_SUBJECT.to_string(),
            html_body,
        }
    }
}

/// `New Episodes of Your Favorite Shows (March 5)`
pub fn daily_subject(date: NaiveDate) -> String {
    format!(
        "New Episodes of Your Favorite Shows ({})",
        date.format("%B %-d")
    )
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn token() -> SignedToken {
        SignedToken {
            email: "viewer@example.com".to_string(),
            expires: 1_709_683_200_000,
            signature: "ab12".to_string(),
        }
    }

    #[rstest]
    #[case("https://api.gumshoe.tv")]
    #[case("https://api.gumshoe.tv/")]
    fn test_links_join_api_path(#[case] base: &str) {
        let templates = MailTemplates::new(base).unwrap();

        assert_eq!(
            templates.redirect_link(&token()),
            "https://api.gumshoe.tv/auth/redirect?email=viewer%40example.com&expires=1709683200000&signature=ab12"
        );
        assert!(
            templates
                .blacklist_link(&token())
                .starts_with("https://api.gumshoe.tv/auth/blacklist?email=")
        );
    }

    #[test]
    fn test_links_keep_api_prefix() {
        let templates = MailTemplates::new("https://gumshoe.tv/api").unwrap();
        assert!(
            templates
                .redirect_link(&token())
                .starts_with("https://gumshoe.tv/api/auth/redirect?")
        );
    }

    #[rstest]
    #[case((2024, 3, 5), "New Episodes of Your Favorite Shows (March 5)")]
    #[case((2024, 12, 25), "New Episodes of Your Favorite Shows (December 25)")]
    fn test_daily_subject(#[case] (y, m, d): (i32, u32, u32), #[case] expected: &str) {
        assert_eq!(daily_subject(NaiveDate::from_ymd_opt(y, m, d).unwrap()), expected);
    }

    #[test]
    fn test_daily_notification_escapes_show_names() {
        let templates = MailTemplates::new("https://api.gumshoe.tv").unwrap();
        let shows = vec!["Law & Order".to_string(), "<script>".to_string()];

        let mail = templates.daily_notification(
            &token(),
            &shows,
            NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        );

        assert_eq!(mail.to, "viewer@example.com");
        assert!(mail.html_body.contains("<li>Law &amp; Order</li>"));
        assert!(mail.html_body.contains("<li>&lt;script&gt;</li>"));
        assert!(mail.html_body.contains("/auth/blacklist?email=viewer%40example.com&amp;expires="));
    }

    #[test]
    fn test_verification_link_mail() {
        let templates = MailTemplates::new("https://api.gumshoe.tv").unwrap();

        let mail = templates.verification_link(&token());

        assert_eq!(mail.subject, VERIFICATION_SUBJECT);
        assert!(mail.html_body.contains("/auth/redirect?"));
        assert!(mail.html_body.contains("/auth/blacklist?"));
    }

    #[test]
    fn test_rejects_invalid_api_url() {
        assert!(MailTemplates::new("mailto:someone@example.com").is_err());
        assert!(MailTemplates::new("not a url").is_err());
    }
}
