//! Per-account IMAP connection pool: at most one live session per
//! `accountId`, shared across concurrently running executions. A second
//! execution that wants the same account's connection waits behind a
//! mutex, bounded by a configurable acquire timeout, rather than dialing a
//! competing session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lib_mail::{connect, ImapAccount, ImapSession};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{AppError, AppResult};

struct Slot {
    session: Option<ImapSession>,
    last_healthy_at: Option<DateTime<Utc>>,
}

impl Default for Slot {
    fn default() -> Self {
        Slot {
            session: None,
            last_healthy_at: None,
        }
    }
}

/// A checked-out connection. Holding this across a whole execution's
/// fetch calls is what gives the pool its per-account mutual exclusion;
/// dropping it (via `release` or plain drop) frees the slot for the next
/// waiter.
pub struct PooledConnection {
    account_id: i32,
    guard: OwnedMutexGuard<Slot>,
}

impl PooledConnection {
    pub fn session(&mut self) -> AppResult<&mut ImapSession> {
        self.guard
            .session
            .as_mut()
            .ok_or_else(|| AppError::Fatal(format!("no session held for account {}", self.account_id)))
    }

    fn mark_healthy(&mut self, at: DateTime<Utc>) {
        self.guard.last_healthy_at = Some(at);
    }
}

/// Keyed on `accountId`; entries are created lazily on first `acquire`.
#[derive(Default)]
pub struct ImapConnectionPool {
    slots: Mutex<HashMap<i32, Arc<Mutex<Slot>>>>,
}

impl ImapConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot_for(&self, account_id: i32) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock().await;
        slots
            .entry(account_id)
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    /// Waits up to `acquire_timeout` for the account's slot, dials a fresh
    /// session if none is cached or the cached one has gone stale beyond
    /// `health_freshness`, and returns it checked out.
    pub async fn acquire(
        &self,
        account: &ImapAccount,
        account_id: i32,
        connect_timeout: Duration,
        health_freshness: Duration,
        acquire_timeout: Duration,
    ) -> AppResult<PooledConnection> {
        let slot = self.slot_for(account_id).await;
        let guard = tokio::time::timeout(acquire_timeout, slot.lock_owned())
            .await
            .map_err(|_| {
                AppError::Transient(format!(
                    "timed out waiting for account {account_id}'s pooled connection"
                ))
            })?;

        let mut conn = PooledConnection { account_id, guard };
        self.ensure_healthy_inner(&mut conn, account, connect_timeout, health_freshness)
            .await?;
        Ok(conn)
    }

    /// Re-dials if the held session is missing or stale; no-op otherwise.
    /// Exposed separately so a caller can refresh mid-execution (e.g.
    /// between batches) without re-acquiring the slot.
    pub async fn ensure_healthy(
        &self,
        conn: &mut PooledConnection,
        account: &ImapAccount,
        connect_timeout: Duration,
        health_freshness: Duration,
    ) -> AppResult<()> {
        self.ensure_healthy_inner(conn, account, connect_timeout, health_freshness)
            .await
    }

    async fn ensure_healthy_inner(
        &self,
        conn: &mut PooledConnection,
        account: &ImapAccount,
        connect_timeout: Duration,
        health_freshness: Duration,
    ) -> AppResult<()> {
        let now = Utc::now();
        let fresh_enough = conn
            .guard
            .last_healthy_at
            .map(|t| now.signed_duration_since(t).to_std().unwrap_or_default() < health_freshness)
            .unwrap_or(false);

        if conn.guard.session.is_some() && fresh_enough {
            return Ok(());
        }

        if let Some(mut session) = conn.guard.session.take() {
            if session.test().await.is_ok() {
                conn.guard.session = Some(session);
                conn.mark_healthy(now);
                return Ok(());
            }
            tracing::warn!(account_id = conn.account_id, "pooled IMAP session stale, re-dialing");
            let _ = session.close().await;
        }

        let session = connect(account, connect_timeout).await?;
        conn.guard.session = Some(session);
        conn.mark_healthy(now);
        Ok(())
    }

    /// Hands the slot back to the pool. The session itself is left cached
    /// so a later `acquire`/`ensure_healthy` within `health_freshness` can
    /// reuse it without re-dialing; dropping `conn` simply unlocks the
    /// slot's mutex for the next waiter.
    pub async fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Closes every cached session; used at shutdown.
    pub async fn close_all(&self) {
        let slots = self.slots.lock().await;
        for (account_id, slot) in slots.iter() {
            let mut guard = slot.lock().await;
            if let Some(session) = guard.session.take() {
                if let Err(e) = session.close().await {
                    tracing::warn!(account_id, "error closing IMAP session during shutdown: {e}");
                }
            }
        }
    }
}
