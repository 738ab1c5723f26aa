use chrono::{DateTime, Utc};
use mail_parser::{MessageParser, MimeHeaders};
use serde::{Deserialize, Serialize};

use crate::error::{MailError, MailResult};

/// Normalized, deduplicated representation of a remote message, independent
/// of the wire format it arrived in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub uid: u32,
    /// RFC-822 `Message-ID`, the global dedupe key. Falls back to a
    /// synthesized value (`account-uid`) for malformed messages that omit it.
    pub message_id: String,
    pub subject: Option<String>,
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub date: DateTime<Utc>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub flags: Vec<String>,
}

/// Parses a raw RFC-822 byte stream (as returned by `FETCH ... (RFC822)`)
/// into a [`CanonicalMessage`]. Recurses through `multipart/*` parts to find
/// the first `text/plain` and `text/html` bodies; attachments are ignored.
pub fn parse_rfc822(
    account_fallback_id: &str,
    uid: u32,
    flags: Vec<String>,
    raw: &[u8],
) -> MailResult<CanonicalMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailError::Parse("mail-parser could not parse message".into()))?;

    let message_id = message
        .message_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("{account_fallback_id}-{uid}"));

    let subject = message.subject().map(|s| s.to_string());

    let from = message
        .from()
        .and_then(|f| f.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_default();

    let to = addr_list(message.to());
    let cc = addr_list(message.cc());
    let bcc = addr_list(message.bcc());

    let date = message
        .date()
        .and_then(|d| {
            DateTime::parse_from_rfc3339(&d.to_rfc3339())
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .unwrap_or_else(Utc::now);

    let body_text = message.body_text(0).map(|s| s.to_string());
    let body_html = message.body_html(0).map(|s| s.to_string());

    Ok(CanonicalMessage {
        uid,
        message_id,
        subject,
        from,
        to,
        cc,
        bcc,
        date,
        body_text,
        body_html,
        flags,
    })
}

fn addr_list(header: Option<&mail_parser::Address>) -> Vec<String> {
    match header {
        Some(addr) => addr
            .iter()
            .filter_map(|a| a.address())
            .map(|s| s.to_string())
            .collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_MESSAGE: &[u8] = b"From: alice@example.com\r\n\
To: bob@example.com\r\n\
Subject: Hello\r\n\
Message-ID: <abc123@example.com>\r\n\
Date: Mon, 6 Jan 2025 09:00:00 +0100\r\n\
Content-Type: text/plain\r\n\
\r\n\
Hello, Bob.\r\n";

    #[test]
    fn parses_simple_message() {
        let msg = parse_rfc822("acct1", 42, vec!["\\Seen".into()], SIMPLE_MESSAGE).unwrap();
        assert_eq!(msg.message_id, "abc123@example.com");
        assert_eq!(msg.from, "alice@example.com");
        assert_eq!(msg.to, vec!["bob@example.com".to_string()]);
        assert_eq!(msg.subject.as_deref(), Some("Hello"));
        assert_eq!(msg.body_text.as_deref(), Some("Hello, Bob."));
    }

    #[test]
    fn falls_back_to_synthetic_message_id() {
        let no_id = b"From: a@b.com\r\nTo: c@d.com\r\nSubject: x\r\n\r\nbody\r\n";
        let msg = parse_rfc822("acct1", 7, vec![], no_id).unwrap();
        assert_eq!(msg.message_id, "acct1-7");
    }
}
