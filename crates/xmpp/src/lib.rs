pub mod session;
pub mod stanza;
pub mod transport;

pub use session::{Session, SessionState};
pub use stanza::{DiscoItem, IqFault};
pub use transport::SessionTransport;
