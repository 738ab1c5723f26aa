//! IMAP session handling and MIME decoding for the mail ingestion pipeline.
//! Pure I/O and parsing: no scheduling, persistence, or analysis concerns
//! live here, so it can be exercised in isolation from the rest of the
//! pipeline.

pub mod error;
pub mod fetcher;
pub mod message;

pub use error::{MailError, MailResult};
pub use fetcher::{connect, test_connection, FetchOptions, ImapAccount, ImapSession};
pub use message::{parse_rfc822, CanonicalMessage};
