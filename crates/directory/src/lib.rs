//! Server-wide user directory, backed by the server's search service.
//!
//! The full flow is discovery-then-search: a disco#items query against the
//! server domain locates the search service, the service's query form is
//! fetched, and a wildcard submission enumerates every registered user. A
//! server without a search service is a distinct failure
//! ([`SessionError::NoSearchServiceFound`]); an empty directory is an `Ok`
//! result with no rows.

use jid::BareJid;
use minidom::Element;
use tracing::debug;

use preen_core::error::{Result, SessionError};
use preen_xmpp::session::Session;
use preen_xmpp::stanza::{self, DiscoItem, DATA_FORMS_NS, SEARCH_NS};
use preen_xmpp::transport::SessionTransport;

/// One row of the server's user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub username: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Enumerate every user registered on the server.
///
/// Requires an authenticated session; gated calls return an empty listing
/// without touching the server. Otherwise runs the whole discovery-and-search
/// conversation: locate the search service, fetch its form, submit the
/// wildcard query, and parse the rows.
pub async fn registered_users<T>(session: &mut Session<T>) -> Result<Vec<RegisteredUser>>
where
    T: SessionTransport,
{
    if !session.require_authenticated("registered_users").await? {
        return Ok(Vec::new());
    }

    let service = discover_search_service(session).await?;
    debug!(service = %service, "using search service");

    // The form fetch is part of the XEP-0055 conversation. Its contents are
    // not inspected; the wildcard submission always asks for the same
    // columns.
    let form_response = session
        .exchange_iq(stanza::search_form_request(&service))
        .await?;
    stanza::expect_result(&form_response)?;

    let search_response = session.exchange_iq(stanza::wildcard_search(&service)).await?;
    let payload = stanza::expect_result(&search_response)?.ok_or_else(|| {
        SessionError::MalformedResponse("search result carried no payload".to_string())
    })?;

    parse_search_results(payload)
}

/// Locate the server's user-search component via disco#items.
///
/// The search service is recognised by its address: the first label of the
/// service's domain starts with `search` (`search.example.com`).
async fn discover_search_service<T>(session: &mut Session<T>) -> Result<BareJid>
where
    T: SessionTransport,
{
    let server = session.config().server.clone();
    let server_jid = server.parse::<BareJid>().map_err(|error| {
        SessionError::MalformedResponse(format!("server domain {server:?} is not a valid address: {error}"))
    })?;

    let response = session.exchange_iq(stanza::disco_items(&server_jid)).await?;
    let payload = stanza::expect_result(&response)?.ok_or_else(|| {
        SessionError::MalformedResponse("disco#items result carried no payload".to_string())
    })?;

    stanza::parse_disco_items(payload)?
        .into_iter()
        .find(looks_like_search_service)
        .map(|item| item.jid)
        .ok_or(SessionError::NoSearchServiceFound)
}

fn looks_like_search_service(item: &DiscoItem) -> bool {
    item.jid
        .domain()
        .as_str()
        .split('.')
        .next()
        .is_some_and(|label| label.starts_with("search"))
}

/// Parse a search result payload into directory rows.
///
/// Modern services answer with a data-form `<x>` of result items; older ones
/// answer with plain `<item jid=..>` children. Rows with no recoverable
/// username are skipped rather than failing the listing.
fn parse_search_results(query: &Element) -> Result<Vec<RegisteredUser>> {
    if query.name() != "query" || query.ns() != SEARCH_NS {
        return Err(SessionError::MalformedResponse(format!(
            "expected a search result payload, got <{}/>",
            query.name()
        )));
    }

    if let Some(form) = query.get_child("x", DATA_FORMS_NS) {
        return Ok(parse_form_rows(form));
    }
    Ok(parse_legacy_rows(query))
}

fn parse_form_rows(form: &Element) -> Vec<RegisteredUser> {
    let mut users = Vec::new();
    for item in form
        .children()
        .filter(|c| c.name() == "item" && c.ns() == DATA_FORMS_NS)
    {
        let username = field_value(item, "Username")
            .or_else(|| field_value(item, "jid").and_then(|jid| localpart(&jid)));
        let Some(username) = username else {
            debug!("skipping search row with no username");
            continue;
        };
        users.push(RegisteredUser {
            username,
            email: field_value(item, "Email"),
            name: field_value(item, "Name"),
        });
    }
    users
}

fn parse_legacy_rows(query: &Element) -> Vec<RegisteredUser> {
    let mut users = Vec::new();
    for item in query
        .children()
        .filter(|c| c.name() == "item" && c.ns() == SEARCH_NS)
    {
        let Some(username) = item.attr("jid").and_then(|jid| localpart(jid)) else {
            debug!("skipping search row with no username");
            continue;
        };
        users.push(RegisteredUser {
            username,
            email: child_text(item, "email"),
            name: child_text(item, "nick").or_else(|| child_text(item, "first")),
        });
    }
    users
}

/// The non-empty text of the form field named `var`, if present.
fn field_value(item: &Element, var: &str) -> Option<String> {
    item.children()
        .filter(|c| c.name() == "field" && c.ns() == DATA_FORMS_NS)
        .find(|c| c.attr("var") == Some(var))
        .and_then(|field| field.get_child("value", DATA_FORMS_NS))
        .map(|value| value.text())
        .filter(|text| !text.is_empty())
}

fn child_text(item: &Element, name: &str) -> Option<String> {
    item.get_child(name, SEARCH_NS)
        .map(|child| child.text())
        .filter(|text| !text.is_empty())
}

fn localpart(jid: &str) -> Option<String> {
    jid.parse::<BareJid>()
        .ok()
        .and_then(|jid| jid.node().map(|node| node.to_string()))
}
