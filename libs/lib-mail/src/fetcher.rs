use std::time::Duration;

use async_imap::Session;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::error::{MailError, MailResult};
use crate::message::{parse_rfc822, CanonicalMessage};

/// Credentials and connection coordinates for a single IMAP account. The
/// password/token is read by the caller from the account store and handed
/// in per-call; nothing here persists it.
#[derive(Clone)]
pub struct ImapAccount {
    pub account_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
}

type TlsStream = async_native_tls::TlsStream<TcpStream>;

/// An open, authenticated IMAP session for one account. Not `Clone`: a
/// session is owned by whichever caller currently holds it out of the pool.
pub struct ImapSession {
    inner: Session<TlsStream>,
}

/// Options controlling one `fetch` call. `folder` defaults to `INBOX` at
/// the call site, matching the read-only contract for this fetcher.
pub struct FetchOptions {
    pub folder: String,
    pub since: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            folder: "INBOX".to_string(),
            since: None,
            before: None,
            limit: 1000,
        }
    }
}

/// Opens a new TLS IMAP session and authenticates. `connect_timeout` bounds
/// the whole dial-plus-login sequence.
pub async fn connect(account: &ImapAccount, connect_timeout: Duration) -> MailResult<ImapSession> {
    timeout(connect_timeout, connect_inner(account))
        .await
        .map_err(|_| MailError::Timeout(format!("connect to {} timed out", account.host)))?
}

async fn connect_inner(account: &ImapAccount) -> MailResult<ImapSession> {
    let tcp = TcpStream::connect((account.host.as_str(), account.port))
        .await
        .map_err(|e| MailError::Connection(e.to_string()))?;

    let tls = if account.use_tls {
        async_native_tls::connect(account.host.as_str(), tcp).await?
    } else {
        return Err(MailError::Connection(
            "plaintext IMAP is not supported".into(),
        ));
    };

    let client = async_imap::Client::new(tls);
    let session = client
        .login(&account.username, &account.password)
        .await
        .map_err(|(e, _client)| MailError::Authentication(e.to_string()))?;

    Ok(ImapSession { inner: session })
}

/// Opens a short-lived session purely to verify the account's credentials
/// and host are reachable, then logs out. Spec.md §4.3 `testConnection`.
pub async fn test_connection(account: &ImapAccount, connect_timeout: Duration) -> MailResult<()> {
    let mut session = connect(account, connect_timeout).await?;
    let result = session.test().await;
    let _ = session.close().await;
    result
}

impl ImapSession {
    /// Cheapest possible liveness probe — a `NOOP` round trip.
    pub async fn test(&mut self) -> MailResult<()> {
        self.inner
            .noop()
            .await
            .map_err(|e| MailError::Protocol(e.to_string()))
    }

    /// Selects `opts.folder` read-only, searches by date range, and fetches
    /// envelope, flags, and body for the matching UIDs in one round trip. A
    /// partial result (some messages fetched before an error) is returned
    /// as-is; the error only surfaces when nothing was fetched. Callers that
    /// want per-batch IMAP-failure isolation should use [`Self::list_uids`]
    /// and [`Self::fetch_by_uids`] instead.
    pub async fn fetch_emails(
        &mut self,
        opts: FetchOptions,
        fetch_timeout: Duration,
    ) -> MailResult<Vec<CanonicalMessage>> {
        let uids = self.list_uids(&opts, fetch_timeout).await?;
        self.fetch_by_uids(&opts.folder, &uids, fetch_timeout).await
    }

    /// Selects `opts.folder` read-only and searches by date range, returning
    /// the matching UIDs truncated to `opts.limit` (oldest dropped first).
    /// Does not fetch any message bodies.
    pub async fn list_uids(&mut self, opts: &FetchOptions, fetch_timeout: Duration) -> MailResult<Vec<u32>> {
        timeout(fetch_timeout, self.list_uids_inner(opts))
            .await
            .map_err(|_| MailError::Timeout("listUids timed out".into()))?
    }

    async fn list_uids_inner(&mut self, opts: &FetchOptions) -> MailResult<Vec<u32>> {
        self.inner
            .examine(&opts.folder)
            .await
            .map_err(|e| MailError::Connection(format!("SELECT {} failed: {e}", opts.folder)))?;

        let mut criteria = Vec::new();
        if let Some(since) = opts.since {
            criteria.push(format!("SINCE {}", since.format("%d-%b-%Y")));
        }
        if let Some(before) = opts.before {
            criteria.push(format!("BEFORE {}", before.format("%d-%b-%Y")));
        }
        let query = if criteria.is_empty() {
            "ALL".to_string()
        } else {
            criteria.join(" ")
        };

        let mut uids: Vec<u32> = self
            .inner
            .uid_search(&query)
            .await
            .map_err(|e| MailError::Protocol(format!("UID SEARCH failed: {e}")))?
            .into_iter()
            .collect();
        uids.sort_unstable();
        if uids.len() > opts.limit {
            let drop_count = uids.len() - opts.limit;
            uids.drain(0..drop_count);
        }
        Ok(uids)
    }

    /// Selects `folder` read-only and fetches envelope, flags, and body for
    /// exactly `uids`. Returns an empty vec without any round trip when
    /// `uids` is empty.
    pub async fn fetch_by_uids(
        &mut self,
        folder: &str,
        uids: &[u32],
        fetch_timeout: Duration,
    ) -> MailResult<Vec<CanonicalMessage>> {
        timeout(fetch_timeout, self.fetch_by_uids_inner(folder, uids))
            .await
            .map_err(|_| MailError::Timeout("fetchByUids timed out".into()))?
    }

    async fn fetch_by_uids_inner(&mut self, folder: &str, uids: &[u32]) -> MailResult<Vec<CanonicalMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }

        self.inner
            .examine(folder)
            .await
            .map_err(|e| MailError::Connection(format!("SELECT {folder} failed: {e}")))?;

        let set = uids
            .iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>()
            .join(",");

        let mut messages = Vec::with_capacity(uids.len());
        let mut stream = self
            .inner
            .uid_fetch(&set, "(UID FLAGS RFC822)")
            .await
            .map_err(|e| MailError::Protocol(format!("UID FETCH failed: {e}")))?;

        loop {
            let item = match stream.try_next().await {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(e) => {
                    if messages.is_empty() {
                        return Err(MailError::Protocol(format!(
                            "UID FETCH stream failed: {e}"
                        )));
                    }
                    tracing::warn!("IMAP fetch stream ended early: {e}");
                    break;
                }
            };

            let Some(uid) = item.uid else { continue };
            let Some(raw) = item.body() else { continue };
            let flags = item
                .flags()
                .map(|f| f.to_string())
                .collect::<Vec<_>>();

            match parse_rfc822(&uid.to_string(), uid, flags, raw) {
                Ok(msg) => messages.push(msg),
                Err(e) => tracing::warn!(uid, "failed to parse message: {e}"),
            }
        }

        Ok(messages)
    }

    /// Gracefully logs out. Errors are swallowed by the caller (a connection
    /// already in a bad state does not need a clean LOGOUT to be released).
    pub async fn close(mut self) -> MailResult<()> {
        self.inner
            .logout()
            .await
            .map_err(|e| MailError::Connection(e.to_string()))
    }
}
