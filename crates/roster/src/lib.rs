//! Contact directory backed by the server-side roster.
//!
//! Reads go through a generation-tagged cache: a snapshot fetched over one
//! connection is never served once the session has reconnected, because the
//! roster state known to the server may have changed across streams. Roster
//! events from the transport's dispatch path only update this cache — they
//! never touch session state.

use std::collections::BTreeMap;

use jid::BareJid;
use tracing::{debug, warn};

use preen_core::error::{Result, SessionError};
use preen_core::event::{RosterChange, RosterEvent, RosterEvents};
use preen_xmpp::session::Session;
use preen_xmpp::stanza;
use preen_xmpp::transport::SessionTransport;

/// A single roster entry: one contact per unique bare address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub address: BareJid,
    pub name: Option<String>,
}

struct CachedRoster {
    generation: u64,
    contacts: BTreeMap<String, Contact>,
}

/// The contact directory.
#[derive(Default)]
pub struct ContactDirectory {
    cache: Option<CachedRoster>,
    events: RosterEvents,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The roster-change bus observers subscribe to.
    pub fn events(&self) -> &RosterEvents {
        &self.events
    }

    /// Create a roster entry for `address`, optionally requesting a presence
    /// subscription right after. Entry creation and subscription are
    /// independent steps: a failed subscription does not roll back the
    /// entry. Returns `Ok(false)` when not authenticated.
    pub async fn add_contact<T>(
        &mut self,
        session: &mut Session<T>,
        address: &BareJid,
        name: Option<&str>,
        auto_subscribe: bool,
    ) -> Result<bool>
    where
        T: SessionTransport,
    {
        if !session.require_authenticated("add_contact").await? {
            return Ok(false);
        }

        let response = session.exchange_iq(stanza::roster_add(address, name)).await?;
        stanza::expect_result(&response)?;

        if let Some(cache) = &mut self.cache {
            if cache.generation == session.generation() {
                cache.contacts.insert(
                    address.to_string(),
                    Contact {
                        address: address.clone(),
                        name: name.map(str::to_string),
                    },
                );
            }
        }

        self.events.publish(RosterEvent::new(RosterChange::ContactAdded {
            address: address.to_string(),
            name: name.map(str::to_string),
        }));

        if auto_subscribe {
            if let Err(error) = session
                .send_stanza(stanza::subscribe_presence(address).into())
                .await
            {
                warn!(
                    address = %address,
                    %error,
                    "subscription request failed after the roster entry was created"
                );
            }
        }

        debug!(address = %address, "contact added");
        Ok(true)
    }

    /// A fresh snapshot of every roster entry. Ordering is whatever the
    /// server returned; callers must not rely on it. Returns an empty list
    /// when not authenticated.
    pub async fn contacts<T>(&mut self, session: &mut Session<T>) -> Result<Vec<Contact>>
    where
        T: SessionTransport,
    {
        if !session.require_authenticated("get_contacts").await? {
            return Ok(Vec::new());
        }

        self.refresh(session).await?;
        Ok(self
            .cache
            .as_ref()
            .map(|c| c.contacts.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Look up a single entry. Absence is `Ok(None)`, not an error. Served
    /// from the cache while its generation is current, refetched otherwise.
    pub async fn contact_details<T>(
        &mut self,
        session: &mut Session<T>,
        address: &BareJid,
    ) -> Result<Option<Contact>>
    where
        T: SessionTransport,
    {
        if !session.require_authenticated("get_contact_details").await? {
            return Ok(None);
        }

        if !self.cache_is_fresh(session.generation()) {
            self.refresh(session).await?;
        }

        Ok(self
            .cache
            .as_ref()
            .and_then(|c| c.contacts.get(&address.to_string()).cloned()))
    }

    /// Apply a roster change observed on the transport's dispatch path.
    /// Updates the read-only cache and nothing else; in particular it never
    /// reenters session-state mutation.
    pub fn apply_event(&mut self, event: &RosterEvent) {
        let Some(cache) = &mut self.cache else {
            return;
        };

        match &event.change {
            RosterChange::ContactAdded { address, name }
            | RosterChange::ContactUpdated { address, name } => {
                match address.parse::<BareJid>() {
                    Ok(jid) => {
                        cache.contacts.insert(
                            address.clone(),
                            Contact {
                                address: jid,
                                name: name.clone(),
                            },
                        );
                    }
                    Err(error) => {
                        debug!(address, %error, "ignoring roster event with invalid address");
                    }
                }
            }
            RosterChange::ContactRemoved { address } => {
                cache.contacts.remove(address);
            }
            // Presence carries no roster-entry data; nothing to cache here.
            RosterChange::PresenceChanged { .. } => {}
        }
    }

    fn cache_is_fresh(&self, generation: u64) -> bool {
        self.cache
            .as_ref()
            .is_some_and(|c| c.generation == generation)
    }

    async fn refresh<T>(&mut self, session: &mut Session<T>) -> Result<()>
    where
        T: SessionTransport,
    {
        let response = session.exchange_iq(stanza::roster_get()).await?;
        let payload = stanza::expect_result(&response)?.ok_or_else(|| {
            SessionError::MalformedResponse("roster result carried no query payload".to_string())
        })?;

        let mut contacts = BTreeMap::new();
        for (address, name) in stanza::parse_roster_items(payload)? {
            contacts.insert(address.to_string(), Contact { address, name });
        }

        debug!(entries = contacts.len(), "roster snapshot refreshed");
        self.cache = Some(CachedRoster {
            generation: session.generation(),
            contacts,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use minidom::Element;
    use preen_core::config::{Credentials, SessionConfig};
    use preen_core::error::TransportError;
    use preen_test_support::{init_test_logging, MockTransport};
    use preen_xmpp::stanza::ROSTER_NS;

    use super::*;

    fn bare(s: &str) -> BareJid {
        s.parse().expect("test jid should parse")
    }

    fn roster_payload(entries: &[(&str, Option<&str>)]) -> Element {
        let mut query = Element::builder("query", ROSTER_NS);
        for (jid, name) in entries {
            let mut item = Element::builder("item", ROSTER_NS).attr("jid", *jid);
            if let Some(name) = name {
                item = item.attr("name", *name);
            }
            query = query.append(item.build());
        }
        query.build()
    }

    async fn authenticated_session() -> Session<MockTransport> {
        init_test_logging();
        let config = SessionConfig::new("example.com")
            .with_credentials(Credentials::new("alice", "secret"));
        Session::initialize(MockTransport::new(config))
            .await
            .expect("initialize should succeed")
    }

    #[tokio::test(flavor = "current_thread")]
    async fn add_contact_creates_one_entry_and_one_subscribe() {
        let mut session = authenticated_session().await;
        let mut directory = ContactDirectory::new();
        let mut events = directory.events().subscribe();

        let added = directory
            .add_contact(&mut session, &bare("bob@example.com"), Some("Bob"), true)
            .await
            .expect("add should succeed");
        assert!(added);

        let transport = session.transport();
        assert_eq!(transport.exchanged_iqs.len(), 1);

        let subscribes: Vec<_> = transport
            .sent_stanzas
            .iter()
            .filter(|s| s.name() == "presence" && s.attr("type") == Some("subscribe"))
            .collect();
        assert_eq!(subscribes.len(), 1);
        assert_eq!(subscribes[0].attr("to"), Some("bob@example.com"));

        let event = events.try_recv().expect("an event should be published");
        assert!(matches!(
            event.change,
            RosterChange::ContactAdded { ref address, .. } if address == "bob@example.com"
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_subscription_does_not_roll_back_the_entry() {
        let mut session = authenticated_session().await;
        session
            .transport_mut()
            .fail_next_send(TransportError::Stream("write failed".to_string()));
        let mut directory = ContactDirectory::new();

        let added = directory
            .add_contact(&mut session, &bare("bob@example.com"), None, true)
            .await
            .expect("add should still succeed");
        assert!(added);
        assert_eq!(session.transport().exchanged_iqs.len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn contacts_returns_the_server_snapshot() {
        let mut session = authenticated_session().await;
        session.transport_mut().push_iq_result(Some(roster_payload(&[
            ("bob@example.com", Some("Bob")),
            ("carol@example.com", None),
        ])));
        let mut directory = ContactDirectory::new();

        let contacts = directory
            .contacts(&mut session)
            .await
            .expect("fetch should succeed");
        assert_eq!(contacts.len(), 2);
        assert!(contacts.iter().any(|c| c.address == bare("bob@example.com")
            && c.name.as_deref() == Some("Bob")));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn exchange_failure_surfaces_as_a_transport_fault() {
        let mut session = authenticated_session().await;
        session
            .transport_mut()
            .push_iq_fault(TransportError::Stream("connection reset".to_string()));
        let mut directory = ContactDirectory::new();

        let result = directory.contacts(&mut session).await;
        assert!(matches!(
            result,
            Err(SessionError::Transport(TransportError::Stream(_)))
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn gated_reads_return_neutral_values() {
        let transport = MockTransport::new(SessionConfig::new("example.com"));
        let mut session = Session::initialize(transport)
            .await
            .expect("initialize should succeed");
        let mut directory = ContactDirectory::new();

        let contacts = directory
            .contacts(&mut session)
            .await
            .expect("gate should not error");
        assert!(contacts.is_empty());

        let details = directory
            .contact_details(&mut session, &bare("bob@example.com"))
            .await
            .expect("gate should not error");
        assert!(details.is_none());
        assert!(session.transport().exchanged_iqs.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_entry_is_absent_not_an_error() {
        let mut session = authenticated_session().await;
        session
            .transport_mut()
            .push_iq_result(Some(roster_payload(&[("carol@example.com", None)])));
        let mut directory = ContactDirectory::new();

        let details = directory
            .contact_details(&mut session, &bare("bob@example.com"))
            .await
            .expect("lookup should succeed");
        assert!(details.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn fresh_cache_is_served_without_a_refetch() {
        let mut session = authenticated_session().await;
        session
            .transport_mut()
            .push_iq_result(Some(roster_payload(&[("bob@example.com", Some("Bob"))])));
        let mut directory = ContactDirectory::new();

        directory
            .contacts(&mut session)
            .await
            .expect("fetch should succeed");
        let details = directory
            .contact_details(&mut session, &bare("bob@example.com"))
            .await
            .expect("lookup should succeed");

        assert_eq!(details.map(|c| c.name), Some(Some("Bob".to_string())));
        // One roster fetch total: the lookup hit the cache.
        assert_eq!(session.transport().exchanged_iqs.len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stale_generation_forces_a_refetch() {
        let mut session = authenticated_session().await;
        session
            .transport_mut()
            .push_iq_result(Some(roster_payload(&[("bob@example.com", None)])));
        let mut directory = ContactDirectory::new();
        directory
            .contacts(&mut session)
            .await
            .expect("fetch should succeed");

        // Reconnect: the old snapshot may no longer match the server.
        session.logout().await.expect("logout should succeed");
        session.login().await.expect("login should succeed");
        session
            .transport_mut()
            .push_iq_result(Some(roster_payload(&[("carol@example.com", None)])));

        let details = directory
            .contact_details(&mut session, &bare("carol@example.com"))
            .await
            .expect("lookup should succeed");
        assert!(details.is_some());
        assert_eq!(session.transport().exchanged_iqs.len(), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn applied_events_update_the_cache_only() {
        let mut session = authenticated_session().await;
        session
            .transport_mut()
            .push_iq_result(Some(roster_payload(&[("bob@example.com", None)])));
        let mut directory = ContactDirectory::new();
        directory
            .contacts(&mut session)
            .await
            .expect("fetch should succeed");

        directory.apply_event(&RosterEvent::new(RosterChange::ContactAdded {
            address: "carol@example.com".to_string(),
            name: Some("Carol".to_string()),
        }));
        directory.apply_event(&RosterEvent::new(RosterChange::ContactRemoved {
            address: "bob@example.com".to_string(),
        }));

        let carol = directory
            .contact_details(&mut session, &bare("carol@example.com"))
            .await
            .expect("lookup should succeed");
        assert_eq!(carol.and_then(|c| c.name), Some("Carol".to_string()));

        let bob = directory
            .contact_details(&mut session, &bare("bob@example.com"))
            .await
            .expect("lookup should succeed");
        assert!(bob.is_none());

        // Still one fetch; events fed the cache directly.
        assert_eq!(session.transport().exchanged_iqs.len(), 1);
        assert!(session.is_authenticated());
    }
}
