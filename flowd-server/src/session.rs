//! Session management.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use uuid::Uuid;

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial state, waiting for HELLO.
    Connected,
    /// Handshake complete, ready for commands.
    Ready,
    /// Session is closing.
    Closing,
}

/// A client session.
pub struct Session {
    /// Unique session ID.
    pub id: String,

    /// Remote address.
    pub remote_addr: SocketAddr,

    /// Session state.
    state: SessionState,

    /// Negotiated protocol version.
    protocol_version: u16,

    /// Client name from HELLO.
    client_name: Option<String>,

    /// Request counter.
    request_count: AtomicU64,

    /// Session creation time.
    created_at: Instant,

    /// Last activity time.
    last_activity: Instant,
}

impl Session {
    /// Creates a new session.
    pub fn new(remote_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4().to_string(),
            remote_addr,
            state: SessionState::Connected,
            protocol_version: 0,
            client_name: None,
            request_count: AtomicU64::new(0),
            created_at: now,
            last_activity: now,
        }
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Sets the session state.
    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    /// Returns true once the HELLO handshake has completed.
    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Marks the handshake as complete.
    pub fn complete_handshake(&mut self, protocol_version: u16, client_name: Option<String>) {
        self.state = SessionState::Ready;
        self.protocol_version = protocol_version;
        self.client_name = client_name;
    }

    /// Returns the negotiated protocol version.
    pub fn protocol_version(&self) -> u16 {
        self.protocol_version
    }

    /// Returns the client name, if announced.
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    /// Records one handled request.
    pub fn record_request(&mut self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.last_activity = Instant::now();
    }

    /// Returns the number of requests handled on this session.
    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Returns how long the session has existed.
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Returns how long the session has been idle.
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.elapsed()
    }
}
