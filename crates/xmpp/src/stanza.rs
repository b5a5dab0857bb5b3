//! Stanza construction and response parsing.
//!
//! Presence stanzas use the typed `xmpp-parsers` structs; IQ query payloads
//! (roster, registration, search, service discovery) are built and parsed as
//! raw elements, which keeps this layer independent of any particular
//! server's extension dialect.

use jid::{BareJid, Jid};
use minidom::Element;
use tracing::debug;
use uuid::Uuid;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::presence::{Presence, Show, Type as PresenceType};
use xmpp_parsers::stanza_error::DefinedCondition;

use preen_core::error::SessionError;

/// RFC 6121 roster management namespace.
pub const ROSTER_NS: &str = "jabber:iq:roster";

/// XEP-0077 in-band registration namespace.
pub const REGISTER_NS: &str = "jabber:iq:register";

/// XEP-0055 user search namespace.
pub const SEARCH_NS: &str = "jabber:iq:search";

/// XEP-0030 service discovery items namespace.
pub const DISCO_ITEMS_NS: &str = "http://jabber.org/protocol/disco#items";

/// XEP-0004 data forms namespace.
pub const DATA_FORMS_NS: &str = "jabber:x:data";

fn next_id() -> String {
    Uuid::new_v4().to_string()
}

// ── Presence ─────────────────────────────────────────────────────────

/// Build an available presence with the given priority, status text, and
/// optional show value (`None` means plainly available).
pub fn available_presence(priority: i8, status: Option<&str>, show: Option<Show>) -> Presence {
    let mut presence = Presence::new(PresenceType::None);
    presence.priority = priority;
    presence.show = show;

    if let Some(text) = status {
        presence.statuses.insert(String::new(), text.to_string());
    }

    presence
}

pub fn unavailable_presence() -> Presence {
    Presence::new(PresenceType::Unavailable)
}

/// Build a subscription request addressed to `target`.
pub fn subscribe_presence(target: &BareJid) -> Presence {
    let mut presence = Presence::new(PresenceType::Subscribe);
    presence.to = Some(Jid::from(target.clone()));
    presence
}

// ── Roster ───────────────────────────────────────────────────────────

/// Build a roster get IQ requesting the full contact list.
pub fn roster_get() -> Iq {
    Iq {
        from: None,
        to: None,
        id: next_id(),
        payload: IqType::Get(Element::builder("query", ROSTER_NS).build()),
    }
}

/// Build a roster set IQ creating (or renaming) the entry for `address`.
pub fn roster_add(address: &BareJid, name: Option<&str>) -> Iq {
    let mut item = Element::builder("item", ROSTER_NS).attr("jid", address.to_string());
    if let Some(name) = name {
        item = item.attr("name", name);
    }

    let query = Element::builder("query", ROSTER_NS).append(item.build()).build();

    Iq {
        from: None,
        to: None,
        id: next_id(),
        payload: IqType::Set(query),
    }
}

/// Parse the entries of a roster result payload into (address, name) pairs.
pub fn parse_roster_items(
    query: &Element,
) -> Result<Vec<(BareJid, Option<String>)>, SessionError> {
    if query.name() != "query" || query.ns() != ROSTER_NS {
        return Err(SessionError::MalformedResponse(format!(
            "expected a roster query payload, got <{}/>",
            query.name()
        )));
    }

    let mut items = Vec::new();
    for item in query
        .children()
        .filter(|c| c.name() == "item" && c.ns() == ROSTER_NS)
    {
        let jid_attr = item.attr("jid").ok_or_else(|| {
            SessionError::MalformedResponse("roster item missing 'jid' attribute".to_string())
        })?;

        let address: BareJid = jid_attr.parse().map_err(|e| {
            SessionError::MalformedResponse(format!("invalid roster item jid '{jid_attr}': {e}"))
        })?;

        items.push((address, item.attr("name").map(str::to_string)));
    }

    Ok(items)
}

// ── In-band registration ─────────────────────────────────────────────

/// Build a registration set IQ for a new account.
pub fn register_account(username: &str, password: &str) -> Iq {
    let query = Element::builder("query", REGISTER_NS)
        .append(
            Element::builder("username", REGISTER_NS)
                .append(username.to_string())
                .build(),
        )
        .append(
            Element::builder("password", REGISTER_NS)
                .append(password.to_string())
                .build(),
        )
        .build();

    Iq {
        from: None,
        to: None,
        id: next_id(),
        payload: IqType::Set(query),
    }
}

/// Build the account-removal set IQ for the authenticated user.
pub fn unregister_account() -> Iq {
    let query = Element::builder("query", REGISTER_NS)
        .append(Element::builder("remove", REGISTER_NS).build())
        .build();

    Iq {
        from: None,
        to: None,
        id: next_id(),
        payload: IqType::Set(query),
    }
}

// ── Service discovery ────────────────────────────────────────────────

/// An item advertised in a disco#items result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoItem {
    pub jid: BareJid,
    pub name: Option<String>,
}

/// Build a disco#items query addressed to `target` (usually the server
/// domain).
pub fn disco_items(target: &BareJid) -> Iq {
    Iq {
        from: None,
        to: Some(Jid::from(target.clone())),
        id: next_id(),
        payload: IqType::Get(Element::builder("query", DISCO_ITEMS_NS).build()),
    }
}

/// Parse a disco#items result payload. Items with unparseable jids are
/// skipped rather than failing the whole discovery.
pub fn parse_disco_items(query: &Element) -> Result<Vec<DiscoItem>, SessionError> {
    if query.name() != "query" || query.ns() != DISCO_ITEMS_NS {
        return Err(SessionError::MalformedResponse(format!(
            "expected a disco#items payload, got <{}/>",
            query.name()
        )));
    }

    let mut items = Vec::new();
    for item in query
        .children()
        .filter(|c| c.name() == "item" && c.ns() == DISCO_ITEMS_NS)
    {
        let Some(jid_attr) = item.attr("jid") else {
            continue;
        };
        match jid_attr.parse::<BareJid>() {
            Ok(jid) => items.push(DiscoItem {
                jid,
                name: item.attr("name").map(str::to_string),
            }),
            Err(error) => {
                debug!(jid = jid_attr, %error, "skipping disco item with invalid jid");
            }
        }
    }

    Ok(items)
}

// ── User search ──────────────────────────────────────────────────────

/// Build the get IQ requesting the search service's query form.
pub fn search_form_request(service: &BareJid) -> Iq {
    Iq {
        from: None,
        to: Some(Jid::from(service.clone())),
        id: next_id(),
        payload: IqType::Get(Element::builder("query", SEARCH_NS).build()),
    }
}

/// Build the submit IQ for a wildcard search: every result column enabled,
/// the search term matching everything. The service enumerates its whole
/// directory rather than filtering.
pub fn wildcard_search(service: &BareJid) -> Iq {
    let form = Element::builder("x", DATA_FORMS_NS)
        .attr("type", "submit")
        .append(hidden_field("FORM_TYPE", SEARCH_NS))
        .append(form_field("Username", "1"))
        .append(form_field("Email", "1"))
        .append(form_field("Name", "1"))
        .append(form_field("search", "*"))
        .build();

    let query = Element::builder("query", SEARCH_NS).append(form).build();

    Iq {
        from: None,
        to: Some(Jid::from(service.clone())),
        id: next_id(),
        payload: IqType::Set(query),
    }
}

fn form_field(var: &str, value: &str) -> Element {
    Element::builder("field", DATA_FORMS_NS)
        .attr("var", var)
        .append(
            Element::builder("value", DATA_FORMS_NS)
                .append(value.to_string())
                .build(),
        )
        .build()
}

fn hidden_field(var: &str, value: &str) -> Element {
    Element::builder("field", DATA_FORMS_NS)
        .attr("var", var)
        .attr("type", "hidden")
        .append(
            Element::builder("value", DATA_FORMS_NS)
                .append(value.to_string())
                .build(),
        )
        .build()
}

// ── IQ response handling ─────────────────────────────────────────────

/// A server-reported error condition extracted from an IQ error response.
#[derive(Debug, Clone)]
pub struct IqFault {
    pub condition: DefinedCondition,
    pub text: Option<String>,
}

impl IqFault {
    /// The server's message, falling back to the condition name.
    pub fn message(&self) -> String {
        self.text
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("{:?}", self.condition))
    }
}

/// Extract the fault from an IQ response, if it is an error response.
pub fn iq_fault(iq: &Iq) -> Option<IqFault> {
    match &iq.payload {
        IqType::Error(error) => Some(IqFault {
            condition: error.defined_condition.clone(),
            text: error.texts.values().next().cloned(),
        }),
        _ => None,
    }
}

/// Unwrap an IQ response into its result payload. Error responses map to
/// [`SessionError::ServerFault`]; anything that is neither a result nor an
/// error is a malformed reply.
pub fn expect_result(iq: &Iq) -> Result<Option<&Element>, SessionError> {
    match &iq.payload {
        IqType::Result(payload) => Ok(payload.as_ref()),
        IqType::Error(_) => {
            let fault = iq_fault(iq).map(|f| f.message()).unwrap_or_default();
            Err(SessionError::ServerFault(fault))
        }
        _ => Err(SessionError::MalformedResponse(
            "expected an IQ result or error response".to_string(),
        )),
    }
}
