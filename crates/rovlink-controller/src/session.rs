//! Per-actuator session bookkeeping.
//!
//! A session is created by the first `Ready` handshake from an actuator and
//! reused by every later one.  Each handshake issues a fresh
//! [`ConnectionToken`]; disconnects and liveness updates must present the
//! token of the connection they come from, so a stale connection that
//! closes late cannot take down its successor.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rovlink_types::{Command, RovError};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Default silence after which a session is considered lost.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionToken(u64);

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub actuator_id: String,
    pub connected: bool,
    pub last_seen_at: DateTime<Utc>,
}

struct Session {
    connected: bool,
    last_seen_at: DateTime<Utc>,
    last_seen: Instant,
    token: ConnectionToken,
    /// Dropped on disconnect, which discards anything not yet written.
    outbox: Option<mpsc::UnboundedSender<Command>>,
}

pub struct SessionTable {
    sessions: HashMap<String, Session>,
    next_token: u64,
    timeout: Duration,
}

impl SessionTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            next_token: 0,
            timeout,
        }
    }

    /// Register a completed handshake.  Any previous connection of the same
    /// actuator loses its outbox.
    pub fn connect(
        &mut self,
        actuator_id: &str,
        outbox: mpsc::UnboundedSender<Command>,
    ) -> ConnectionToken {
        self.next_token += 1;
        let token = ConnectionToken(self.next_token);
        self.sessions.insert(
            actuator_id.to_string(),
            Session {
                connected: true,
                last_seen_at: Utc::now(),
                last_seen: Instant::now(),
                token,
                outbox: Some(outbox),
            },
        );
        token
    }

    /// Mark the session disconnected if `token` is still current.  Returns
    /// `true` when this call changed the session state.
    pub fn disconnect(&mut self, actuator_id: &str, token: ConnectionToken) -> bool {
        match self.sessions.get_mut(actuator_id) {
            Some(session) if session.token == token && session.connected => {
                session.connected = false;
                session.outbox = None;
                true
            }
            _ => false,
        }
    }

    /// Record traffic from the connection holding `token`.
    pub fn touch(&mut self, actuator_id: &str, token: ConnectionToken) -> bool {
        match self.sessions.get_mut(actuator_id) {
            Some(session) if session.token == token && session.connected => {
                session.last_seen = Instant::now();
                session.last_seen_at = Utc::now();
                true
            }
            _ => false,
        }
    }

    /// Hand `cmd` to the session's connection.
    ///
    /// # Errors
    ///
    /// Returns [`RovError::NotConnected`] for unknown, disconnected or
    /// closing sessions.  Nothing is queued in that case.
    pub fn dispatch(&self, actuator_id: &str, cmd: Command) -> Result<(), RovError> {
        let not_connected = || RovError::NotConnected(actuator_id.to_string());
        let session = self.sessions.get(actuator_id).ok_or_else(not_connected)?;
        if !session.connected {
            return Err(not_connected());
        }
        session
            .outbox
            .as_ref()
            .ok_or_else(not_connected)?
            .send(cmd)
            .map_err(|_| not_connected())
    }

    /// Disconnect every session silent for longer than the timeout and
    /// return their ids.
    pub fn sweep(&mut self) -> Vec<String> {
        let now = Instant::now();
        let mut expired = Vec::new();
        for (id, session) in &mut self.sessions {
            if session.connected && now.duration_since(session.last_seen) > self.timeout {
                session.connected = false;
                session.outbox = None;
                expired.push(id.clone());
            }
        }
        expired
    }

    pub fn is_connected(&self, actuator_id: &str) -> bool {
        self.sessions
            .get(actuator_id)
            .is_some_and(|session| session.connected)
    }

    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<_> = self
            .sessions
            .iter()
            .map(|(id, session)| SessionInfo {
                actuator_id: id.clone(),
                connected: session.connected,
                last_seen_at: session.last_seen_at,
            })
            .collect();
        infos.sort_by(|a, b| a.actuator_id.cmp(&b.actuator_id));
        infos
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TIMEOUT)
    }
}
