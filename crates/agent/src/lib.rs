//! The responder: the whitelisted-group reply loop of groupclaw.
//!
//! Every message that shows up on the session gets its own task:
//!
//! 1. **Wait** out the trigger delay
//! 2. **Admit** the message only if it belongs to the whitelisted group
//! 3. **Widen** that conversation's context window by one
//! 4. **Gather** the most recent messages and attribute them to their authors
//! 5. **Complete** persona + context + trigger through the provider
//! 6. **Reply** quoting the trigger
//!
//! A failed attempt is re-run from step 2 under a [`RetryPolicy`], which by
//! default never gives up on transient errors.

pub mod assembler;
pub mod error;
pub mod responder;
pub mod retry;
pub mod window;

#[cfg(test)]
mod test_helpers;

pub use assembler::{
    Admission, AssemblerSettings, ContextAssembler, ContextEntry, Reply, ReplyOutcome,
};
pub use error::{ReplyError, RetryError};
pub use responder::{PairingHandler, Responder, RunSummary};
pub use retry::{RetryDecision, RetryPolicy};
pub use window::{ChatWindows, ContextWindow, WindowStep};
