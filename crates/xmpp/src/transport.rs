use std::future::Future;

use minidom::Element;
use xmpp_parsers::iq::Iq;

use preen_core::config::SessionConfig;
use preen_core::error::{AuthError, TransportError};

/// The connection collaborator the session state machine drives.
///
/// Implementations own the socket, TLS, SASL negotiation, and stanza
/// framing; none of that is this crate's concern. The contract is minimal:
/// connect/disconnect, a connection-state query, fire-and-forget stanza
/// emission, and a paired IQ exchange that awaits the matching structured
/// response. An IQ *error* response is an `Ok` value of `exchange_iq` — the
/// domain layer maps server fault conditions, not the transport.
pub trait SessionTransport: Send + 'static {
    /// Read-only access to the configuration the transport was built with
    /// (credentials, server, security policy).
    fn config(&self) -> &SessionConfig;

    fn is_connected(&self) -> bool;

    fn connect(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;

    fn disconnect(&mut self) -> impl Future<Output = ()> + Send;

    /// Authenticate with the ambient credentials from `config()`.
    fn login(&mut self) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Authenticate with explicitly supplied credentials.
    fn login_with(
        &mut self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;

    /// Emit a stanza without awaiting any confirmation.
    fn send_stanza(&mut self, stanza: Element)
    -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Send an IQ and await the response the server pairs with its id.
    fn exchange_iq(&mut self, iq: Iq) -> impl Future<Output = Result<Iq, TransportError>> + Send;
}
