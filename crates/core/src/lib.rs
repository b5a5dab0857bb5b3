pub mod config;
pub mod error;
pub mod event;

pub use config::{Credentials, GatePolicy, SecurityMode, SessionConfig};
pub use error::{AuthError, Result, SessionError, TransportError};
pub use event::{RosterChange, RosterEvent, RosterEvents};
