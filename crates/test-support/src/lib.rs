//! Shared test fixtures: a scripted in-memory transport implementing the
//! session transport contract, plus opt-in test logging.
//!
//! The transport records every call and lets tests queue outcomes for
//! connects, logins, and IQ exchanges. By default everything succeeds and IQ
//! exchanges answer with an empty result carrying the request's id.

use std::collections::VecDeque;

use minidom::Element;
use xmpp_parsers::iq::{Iq, IqType};
use xmpp_parsers::stanza_error::{DefinedCondition, ErrorType, StanzaError};

use preen_core::config::SessionConfig;
use preen_core::error::{AuthError, TransportError};
use preen_xmpp::transport::SessionTransport;

/// Install a `RUST_LOG`-driven subscriber for a test run. Safe to call from
/// multiple tests; only the first call wins.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A scripted reply for one IQ exchange.
pub enum IqReply {
    /// An IQ result with an optional payload.
    Result(Option<Element>),
    /// An IQ error response carrying a stanza error.
    Error(StanzaError),
    /// A transport-level failure of the exchange itself.
    Fault(TransportError),
    /// Never answer; the exchange pends forever (for timeout tests).
    Hang,
}

/// Scripted in-memory transport.
///
/// Public counters and logs are plain fields so assertions stay direct.
pub struct MockTransport {
    config: SessionConfig,
    connected: bool,
    pub connect_calls: u32,
    pub disconnect_calls: u32,
    pub ambient_login_calls: u32,
    pub explicit_login_calls: u32,
    pub last_explicit_credentials: Option<(String, String)>,
    pub sent_stanzas: Vec<Element>,
    pub exchanged_iqs: Vec<Iq>,
    connect_outcomes: VecDeque<Result<(), TransportError>>,
    login_outcomes: VecDeque<Result<(), AuthError>>,
    send_outcomes: VecDeque<Result<(), TransportError>>,
    iq_replies: VecDeque<IqReply>,
}

impl MockTransport {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            connected: false,
            connect_calls: 0,
            disconnect_calls: 0,
            ambient_login_calls: 0,
            explicit_login_calls: 0,
            last_explicit_credentials: None,
            sent_stanzas: Vec::new(),
            exchanged_iqs: Vec::new(),
            connect_outcomes: VecDeque::new(),
            login_outcomes: VecDeque::new(),
            send_outcomes: VecDeque::new(),
            iq_replies: VecDeque::new(),
        }
    }

    pub fn fail_next_connect(&mut self, error: TransportError) {
        self.connect_outcomes.push_back(Err(error));
    }

    pub fn fail_next_login(&mut self, error: AuthError) {
        self.login_outcomes.push_back(Err(error));
    }

    pub fn fail_next_send(&mut self, error: TransportError) {
        self.send_outcomes.push_back(Err(error));
    }

    pub fn push_iq_result(&mut self, payload: Option<Element>) {
        self.iq_replies.push_back(IqReply::Result(payload));
    }

    pub fn push_iq_error(&mut self, condition: DefinedCondition, text: &str) {
        self.iq_replies.push_back(IqReply::Error(StanzaError::new(
            ErrorType::Cancel,
            condition,
            "en",
            text,
        )));
    }

    pub fn push_iq_fault(&mut self, error: TransportError) {
        self.iq_replies.push_back(IqReply::Fault(error));
    }

    pub fn push_iq_hang(&mut self) {
        self.iq_replies.push_back(IqReply::Hang);
    }

    /// Simulate a dropped connection without going through `disconnect`.
    pub fn drop_connection(&mut self) {
        self.connected = false;
    }

    /// Presence stanzas sent so far, as their `type` attributes
    /// (`None` meaning available).
    pub fn sent_presence_types(&self) -> Vec<Option<String>> {
        self.sent_stanzas
            .iter()
            .filter(|s| s.name() == "presence")
            .map(|s| s.attr("type").map(str::to_string))
            .collect()
    }
}

impl SessionTransport for MockTransport {
    fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.connect_calls += 1;
        match self.connect_outcomes.pop_front().unwrap_or(Ok(())) {
            Ok(()) => {
                self.connected = true;
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    async fn disconnect(&mut self) {
        self.disconnect_calls += 1;
        self.connected = false;
    }

    async fn login(&mut self) -> Result<(), AuthError> {
        self.ambient_login_calls += 1;
        if !self.connected {
            return Err(AuthError::Failure("not connected".to_string()));
        }
        self.login_outcomes.pop_front().unwrap_or(Ok(()))
    }

    async fn login_with(&mut self, username: &str, password: &str) -> Result<(), AuthError> {
        self.explicit_login_calls += 1;
        self.last_explicit_credentials = Some((username.to_string(), password.to_string()));
        if !self.connected {
            return Err(AuthError::Failure("not connected".to_string()));
        }
        self.login_outcomes.pop_front().unwrap_or(Ok(()))
    }

    async fn send_stanza(&mut self, stanza: Element) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if let Some(outcome) = self.send_outcomes.pop_front() {
            outcome?;
        }
        self.sent_stanzas.push(stanza);
        Ok(())
    }

    async fn exchange_iq(&mut self, iq: Iq) -> Result<Iq, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }

        let id = iq.id.clone();
        self.exchanged_iqs.push(iq);

        match self.iq_replies.pop_front() {
            None | Some(IqReply::Result(None)) => Ok(Iq {
                from: None,
                to: None,
                id,
                payload: IqType::Result(None),
            }),
            Some(IqReply::Result(payload)) => Ok(Iq {
                from: None,
                to: None,
                id,
                payload: IqType::Result(payload),
            }),
            Some(IqReply::Error(error)) => Ok(Iq {
                from: None,
                to: None,
                id,
                payload: IqType::Error(error),
            }),
            Some(IqReply::Fault(error)) => Err(error),
            Some(IqReply::Hang) => std::future::pending().await,
        }
    }
}
