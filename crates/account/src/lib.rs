//! Account self-management: create and delete the user's own account.
//!
//! The contract here is the fault mapping: a `conflict` condition on
//! registration is the expected duplicate-account outcome and surfaces as
//! [`SessionError::AccountConflict`]; every other server-reported condition
//! becomes [`SessionError::ServerFault`] carrying the server's message.

use tracing::info;
use xmpp_parsers::stanza_error::DefinedCondition;

use preen_core::error::{Result, SessionError};
use preen_xmpp::session::Session;
use preen_xmpp::stanza;
use preen_xmpp::transport::SessionTransport;

/// Register a new account on the server.
///
/// Must run outside an authenticated session; gated calls while logged in
/// return `Ok(false)` without contacting the server. A duplicate username is
/// `Err(AccountConflict)` — an outcome callers branch on, not a crash.
pub async fn create_account<T>(
    session: &mut Session<T>,
    username: &str,
    password: &str,
) -> Result<bool>
where
    T: SessionTransport,
{
    if !session.require_unauthenticated("create_account").await? {
        return Ok(false);
    }
    session.acknowledge_security_mode();

    let response = session
        .exchange_iq(stanza::register_account(username, password))
        .await?;

    match stanza::iq_fault(&response) {
        Some(fault) if fault.condition == DefinedCondition::Conflict => {
            Err(SessionError::AccountConflict)
        }
        Some(fault) => Err(SessionError::ServerFault(fault.message())),
        None => {
            stanza::expect_result(&response)?;
            info!(username, "account created");
            Ok(true)
        }
    }
}

/// Delete the authenticated user's account.
///
/// Deletion while logged out is a no-op: the gate logs a warning and the
/// call returns `Ok(false)`.
pub async fn delete_account<T>(session: &mut Session<T>) -> Result<bool>
where
    T: SessionTransport,
{
    if !session.require_authenticated("delete_account").await? {
        return Ok(false);
    }
    session.acknowledge_security_mode();

    let response = session.exchange_iq(stanza::unregister_account()).await?;
    match stanza::iq_fault(&response) {
        Some(fault) => Err(SessionError::ServerFault(fault.message())),
        None => {
            stanza::expect_result(&response)?;
            info!("account deleted");
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use preen_core::config::{Credentials, GatePolicy, SessionConfig};
    use preen_test_support::{init_test_logging, MockTransport};
    use preen_xmpp::stanza::REGISTER_NS;
    use xmpp_parsers::iq::IqType;

    use super::*;

    fn config_with_credentials() -> SessionConfig {
        init_test_logging();
        SessionConfig::new("example.com").with_credentials(Credentials::new("alice", "secret"))
    }

    #[tokio::test(flavor = "current_thread")]
    async fn creation_sends_a_registration_set() {
        let transport = MockTransport::new(SessionConfig::new("example.com"));
        let mut session = Session::initialize(transport)
            .await
            .expect("initialize should succeed");

        let created = create_account(&mut session, "alice", "secret")
            .await
            .expect("creation should succeed");
        assert!(created);

        let iqs = &session.transport().exchanged_iqs;
        assert_eq!(iqs.len(), 1);
        let IqType::Set(query) = &iqs[0].payload else {
            panic!("registration must be an IQ set");
        };
        assert_eq!(query.ns(), REGISTER_NS);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn creation_while_authenticated_never_contacts_the_server() {
        let transport = MockTransport::new(config_with_credentials());
        let mut session = Session::initialize(transport)
            .await
            .expect("initialize should succeed");

        let created = create_account(&mut session, "alice", "secret")
            .await
            .expect("gate should not error");
        assert!(!created);
        assert!(session.transport().exchanged_iqs.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn duplicate_account_is_a_conflict_not_a_server_fault() {
        let mut transport = MockTransport::new(SessionConfig::new("example.com"));
        transport.push_iq_error(DefinedCondition::Conflict, "already registered");
        let mut session = Session::initialize(transport)
            .await
            .expect("initialize should succeed");

        let result = create_account(&mut session, "alice", "secret").await;
        assert!(matches!(result, Err(SessionError::AccountConflict)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn other_conditions_map_to_server_fault_with_the_message() {
        let mut transport = MockTransport::new(SessionConfig::new("example.com"));
        transport.push_iq_error(DefinedCondition::NotAllowed, "registration disabled");
        let mut session = Session::initialize(transport)
            .await
            .expect("initialize should succeed");

        let result = create_account(&mut session, "alice", "secret").await;
        match result {
            Err(SessionError::ServerFault(message)) => {
                assert_eq!(message, "registration disabled");
            }
            other => panic!("expected a server fault, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn strict_policy_rejects_creation_while_authenticated() {
        let config = config_with_credentials().with_gate_policy(GatePolicy::Strict);
        let transport = MockTransport::new(config);
        let mut session = Session::initialize(transport)
            .await
            .expect("initialize should succeed");

        assert!(matches!(
            create_account(&mut session, "alice", "secret").await,
            Err(SessionError::AlreadyAuthenticated)
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn deletion_while_logged_out_is_a_no_op() {
        let transport = MockTransport::new(SessionConfig::new("example.com"));
        let mut session = Session::initialize(transport)
            .await
            .expect("initialize should succeed");

        let deleted = delete_account(&mut session)
            .await
            .expect("gate should not error");
        assert!(!deleted);
        assert!(session.transport().exchanged_iqs.is_empty());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn deletion_sends_the_remove_query() {
        let transport = MockTransport::new(config_with_credentials());
        let mut session = Session::initialize(transport)
            .await
            .expect("initialize should succeed");

        let deleted = delete_account(&mut session)
            .await
            .expect("deletion should succeed");
        assert!(deleted);

        let iqs = &session.transport().exchanged_iqs;
        assert_eq!(iqs.len(), 1);
        let IqType::Set(query) = &iqs[0].payload else {
            panic!("unregistration must be an IQ set");
        };
        assert!(query.children().any(|c| c.name() == "remove"));
    }
}
