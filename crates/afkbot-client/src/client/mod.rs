pub use self::dispatcher::{AuthPrompt, EventDispatcher};
pub use self::keepalive::KeepaliveWorker;
pub use self::outbound::{OutboundQueue, run_outbound_worker, send_chat};
pub use self::reason::extract_reason;
pub use self::session::{Credential, KeepaliveMove, RunState, SessionHandle, SessionState};

mod dispatcher;
mod keepalive;
pub mod outbound;
mod reason;
mod session;
