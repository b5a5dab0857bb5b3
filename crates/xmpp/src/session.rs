use minidom::Element;
use tracing::{debug, info, warn};
use xmpp_parsers::iq::Iq;

use preen_core::config::{GatePolicy, SecurityMode, SessionConfig};
use preen_core::error::{Result, SessionError, TransportError};

use crate::stanza;
use crate::transport::SessionTransport;

/// Presence announced immediately after a successful login.
const LOGIN_PRESENCE_PRIORITY: i8 = 50;
const LOGIN_PRESENCE_STATUS: &str = "Available";

/// The session's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Authenticated,
}

/// The session state machine.
///
/// Owns the transport and the authenticated-session lifecycle. Every
/// privileged operation in the domain crates runs through the gates here;
/// the session is the only writer of its own state, so a caller holding
/// `&mut Session` has exclusive claim over transitions (wrap the whole
/// value in a mutex if multiple tasks must share one).
pub struct Session<T>
where
    T: SessionTransport,
{
    transport: T,
    state: SessionState,
    generation: u64,
    insecure_acknowledged: bool,
}

impl<T> Session<T>
where
    T: SessionTransport,
{
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SessionState::Disconnected,
            generation: 0,
            insecure_acknowledged: false,
        }
    }

    /// Construct a session, connect it, and log in when ambient credentials
    /// are configured. Without credentials the session ends `Connected` and
    /// never attempts authentication.
    pub async fn initialize(transport: T) -> Result<Self> {
        let mut session = Self::new(transport);
        session.ensure_connected().await?;
        if session.config().credentials.is_some() {
            session.login().await?;
        }
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Monotonic counter bumped by every connection-affecting transition.
    /// Layers that cache state derived from a particular connection tag it
    /// with this value and re-resolve when it goes stale.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn config(&self) -> &SessionConfig {
        self.transport.config()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Connect the transport if it is not already connected. Idempotent; a
    /// connect failure is surfaced, never retried here.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            if matches!(self.state, SessionState::Disconnected) {
                self.state = SessionState::Connected;
            }
            return Ok(());
        }

        self.transport.connect().await?;
        self.generation = self.generation.wrapping_add(1);

        if matches!(self.state, SessionState::Authenticated) {
            // The server-side session did not survive the stream; callers
            // must log in again.
            warn!("authentication did not survive reconnect");
        }
        self.state = SessionState::Connected;
        debug!(generation = self.generation, "transport connected");
        Ok(())
    }

    /// Log in with the ambient credentials from the configuration.
    ///
    /// Soft contract: `Ok(true)` on success, `Ok(false)` when credentials
    /// are missing or rejected (logged, no state change). Only transport
    /// faults propagate as errors.
    pub async fn login(&mut self) -> Result<bool> {
        if self.config().credentials.is_none() {
            warn!("login skipped: no credentials configured");
            return Ok(false);
        }

        self.ensure_connected().await?;
        if self.is_authenticated() {
            debug!("login skipped: already authenticated");
            return Ok(true);
        }

        match self.transport.login().await {
            Ok(()) => {
                self.finish_login().await;
                Ok(true)
            }
            Err(error) => {
                warn!(%error, "login failed");
                Ok(false)
            }
        }
    }

    /// Log in with explicit credentials, overriding any configured ones.
    /// Same soft contract as [`Session::login`].
    pub async fn login_as(&mut self, username: &str, password: &str) -> Result<bool> {
        self.ensure_connected().await?;
        if self.is_authenticated() {
            debug!("login skipped: already authenticated");
            return Ok(true);
        }

        match self.transport.login_with(username, password).await {
            Ok(()) => {
                self.finish_login().await;
                Ok(true)
            }
            Err(error) => {
                warn!(username, %error, "login failed");
                Ok(false)
            }
        }
    }

    async fn finish_login(&mut self) {
        self.state = SessionState::Authenticated;
        info!("session authenticated");

        let presence = stanza::available_presence(
            LOGIN_PRESENCE_PRIORITY,
            Some(LOGIN_PRESENCE_STATUS),
            None,
        );
        if let Err(error) = self.transport.send_stanza(presence.into()).await {
            warn!(%error, "failed to broadcast initial presence");
        }
    }

    /// Announce unavailability, disconnect, and reconnect so the session is
    /// left `Connected` and ready for a future login. No-op while logged
    /// out.
    pub async fn logout(&mut self) -> Result<()> {
        if !self.is_authenticated() {
            debug!("logout skipped: not authenticated");
            return Ok(());
        }

        if let Err(error) = self
            .transport
            .send_stanza(stanza::unavailable_presence().into())
            .await
        {
            warn!(%error, "failed to announce unavailability during logout");
        }

        self.transport.disconnect().await;
        self.state = SessionState::Disconnected;
        self.generation = self.generation.wrapping_add(1);
        info!("session logged out");

        self.ensure_connected().await
    }

    /// Gate for privileged operations. Checks the state before touching the
    /// transport, reconnects if needed, then re-checks (a reconnect drops
    /// authentication). Returns `Ok(false)` under the lenient policy and a
    /// typed error under the strict one.
    pub async fn require_authenticated(&mut self, operation: &'static str) -> Result<bool> {
        if !self.is_authenticated() {
            return self.gate_rejected(operation, SessionError::NotAuthenticated);
        }

        self.ensure_connected().await?;
        if !self.is_authenticated() {
            return self.gate_rejected(operation, SessionError::NotAuthenticated);
        }

        Ok(true)
    }

    /// Inverse gate, for operations that must not run inside an
    /// authenticated session (account registration).
    pub async fn require_unauthenticated(&mut self, operation: &'static str) -> Result<bool> {
        if self.is_authenticated() {
            return self.gate_rejected(operation, SessionError::AlreadyAuthenticated);
        }

        self.ensure_connected().await?;
        Ok(true)
    }

    fn gate_rejected(&self, operation: &'static str, strict_error: SessionError) -> Result<bool> {
        match self.config().gate_policy {
            GatePolicy::Lenient => {
                warn!(operation, state = ?self.state, "operation skipped: wrong session state");
                Ok(false)
            }
            GatePolicy::Strict => Err(strict_error),
        }
    }

    /// Record the explicit opt-in to account management over an insecure
    /// channel. Logged exactly once per session; never blocks.
    pub fn acknowledge_security_mode(&mut self) {
        if matches!(self.config().security, SecurityMode::Disabled) && !self.insecure_acknowledged
        {
            warn!(
                "channel security disabled by configuration: account management will proceed \
                 over an insecure channel"
            );
            self.insecure_acknowledged = true;
        }
    }

    pub fn insecure_acknowledged(&self) -> bool {
        self.insecure_acknowledged
    }

    /// Send an IQ and await its response, bounded by the configured response
    /// timeout so a mute server cannot hang the caller.
    pub async fn exchange_iq(&mut self, iq: Iq) -> Result<Iq> {
        let timeout = self.config().response_timeout();
        match tokio::time::timeout(timeout, self.transport.exchange_iq(iq)).await {
            Ok(result) => result.map_err(SessionError::from),
            Err(_) => Err(TransportError::Timeout.into()),
        }
    }

    /// Fire-and-forget stanza emission.
    pub async fn send_stanza(&mut self, stanza: Element) -> Result<()> {
        self.transport
            .send_stanza(stanza)
            .await
            .map_err(SessionError::from)
    }
}

// The session tests live in `tests/session.rs`: they drive the session with
// the mock transport from `preen-test-support`, and that crate's cyclic
// dev-dependency on `preen-xmpp` means an in-crate unit-test module would see
// a second copy of the `SessionTransport` trait.
