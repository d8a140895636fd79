//! Streaming reply relay.
//!
//! For each accepted inbound message: send a placeholder marked composing, stream the backend's
//! answer into it as in-place corrections, and finish with one terminal correction marked inactive.

mod accumulator;
mod dispatch;
mod emitter;
mod orchestrator;
#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::Accumulator;
pub use dispatch::run_dispatcher;
pub use emitter::ReplyEmitter;
pub use orchestrator::{Relay, ReplyOutcome, ReplyState};
