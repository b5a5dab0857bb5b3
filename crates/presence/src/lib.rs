//! Presence controller: builds presence stanzas and routes them through the
//! session's authentication gate. All sends are fire-and-forget; delivery is
//! the transport's concern.

use jid::BareJid;
use tracing::debug;
use xmpp_parsers::presence::Show;

use preen_core::error::Result;
use preen_xmpp::session::Session;
use preen_xmpp::stanza;
use preen_xmpp::transport::SessionTransport;

/// Availability mode announced in a presence broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresenceMode {
    #[default]
    Available,
    Chat,
    Away,
    Xa,
    Dnd,
}

impl PresenceMode {
    fn show(self) -> Option<Show> {
        match self {
            PresenceMode::Available => None,
            PresenceMode::Chat => Some(Show::Chat),
            PresenceMode::Away => Some(Show::Away),
            PresenceMode::Xa => Some(Show::Xa),
            PresenceMode::Dnd => Some(Show::Dnd),
        }
    }
}

/// Broadcast availability with the given priority, status text, and mode.
/// Returns `Ok(false)` when the session is not authenticated.
pub async fn broadcast_availability<T>(
    session: &mut Session<T>,
    priority: i8,
    status: Option<&str>,
    mode: PresenceMode,
) -> Result<bool>
where
    T: SessionTransport,
{
    if !session.require_authenticated("broadcast_availability").await? {
        return Ok(false);
    }

    let presence = stanza::available_presence(priority, status, mode.show());
    session.send_stanza(presence.into()).await?;
    debug!(priority, mode = ?mode, "availability broadcast");
    Ok(true)
}

/// Announce unavailability. Returns `Ok(false)` when not authenticated.
pub async fn broadcast_unavailable<T>(session: &mut Session<T>) -> Result<bool>
where
    T: SessionTransport,
{
    if !session.require_authenticated("broadcast_unavailable").await? {
        return Ok(false);
    }

    session
        .send_stanza(stanza::unavailable_presence().into())
        .await?;
    Ok(true)
}

/// Ask `target` for a presence subscription. No confirmation is awaited;
/// the server answers asynchronously through the roster event path.
pub async fn request_subscription<T>(session: &mut Session<T>, target: &BareJid) -> Result<bool>
where
    T: SessionTransport,
{
    if !session.require_authenticated("request_subscription").await? {
        return Ok(false);
    }

    session
        .send_stanza(stanza::subscribe_presence(target).into())
        .await?;
    debug!(target = %target, "subscription requested");
    Ok(true)
}
