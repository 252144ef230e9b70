//! Verification message construction.

use chrono::{DateTime, Local};
use lettre::Message;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use rand::Rng;

use crate::error::MailError;

/// Envelope and header sender for a sending domain.
pub fn sender_address(sender_domain: &str) -> String {
    format!("noreply@{sender_domain}")
}

/// `<YYYYmmddHHMMSS.NNNN@domain>` with a random 4-digit suffix.
pub fn message_id(sender_domain: &str, now: DateTime<Local>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(1000..10_000);
    format!("<{}.{suffix}@{sender_domain}>", now.format("%Y%m%d%H%M%S"))
}

/// Build a plain-text message from `noreply@<sender_domain>` to `to`.
///
/// `Message-ID` and `Date` are stamped at call time, so every recipient
/// gets fresh headers.
pub fn compose(sender_domain: &str, to: &str, subject: &str, body: &str) -> Result<Message, MailError> {
    let from: Mailbox = sender_address(sender_domain)
        .parse()
        .map_err(|e| MailError::Message(format!("Invalid from address: {e}")))?;
    let to: Mailbox = to
        .parse()
        .map_err(|e| MailError::InvalidRecipient(format!("{to}: {e}")))?;

    let now = Local::now();
    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .message_id(Some(message_id(sender_domain, now)))
        .date(now.into())
        .header(ContentType::TEXT_PLAIN)
        .body(body.to_string())
        .map_err(|e| MailError::Message(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatted(message: &Message) -> String {
        String::from_utf8(message.formatted()).unwrap()
    }

    #[test]
    fn message_id_shape() {
        let re = regex::Regex::new(r"^<\d{14}\.\d{4}@mail\.example\.org>$").unwrap();
        let id = message_id("mail.example.org", Local::now());
        assert!(re.is_match(&id), "unexpected Message-ID {id}");
    }

    #[test]
    fn compose_sets_headers() {
        let message = compose("mail.example.org", "user@allowed.org", "Email Verification Code", "code 123456")
            .unwrap();
        let text = formatted(&message);

        assert!(text.contains("From: noreply@mail.example.org"));
        assert!(text.contains("To: user@allowed.org"));
        assert!(text.contains("Subject: Email Verification Code"));
        assert!(text.contains("Message-ID: <"));
        assert!(text.contains("@mail.example.org>"));
        assert!(text.contains("Date: "));
        assert!(text.contains("code 123456"));
    }

    #[test]
    fn envelope_uses_sender_domain() {
        let message = compose("mail.example.org", "user@allowed.org", "s", "b").unwrap();
        let envelope = message.envelope();
        assert_eq!(
            envelope.from().map(|a| a.to_string()),
            Some("noreply@mail.example.org".to_string())
        );
        let to: Vec<String> = envelope.to().iter().map(|a| a.to_string()).collect();
        assert_eq!(to, vec!["user@allowed.org"]);
    }

    #[test]
    fn invalid_recipient_is_rejected() {
        assert!(matches!(
            compose("mail.example.org", "not an address", "s", "b"),
            Err(MailError::InvalidRecipient(_))
        ));
    }
}
