//! Session cycle orchestration for afkbot
//!
//! [`SessionRunner`] connects, runs one session cycle until it stops, backs
//! off and reconnects, forever. [`ConsoleBridge`] feeds operator input into
//! whichever cycle is live.

mod backoff;
mod console;
pub mod logging;
mod orchestrator;

pub use backoff::{Backoff, calculate_delay, is_throttled};
pub use console::ConsoleBridge;
pub use orchestrator::{ActiveSession, SessionRunner};
