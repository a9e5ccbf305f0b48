//! Concurrency building blocks for Tandem.
//!
//! Every component here follows the same rule: mutable state has exactly one
//! owning task, and everything else talks to it through channels. No locks
//! guard shared data, because no data is shared.

pub mod actor;
pub mod poller;
pub mod pool;

pub use actor::{Applied, KeySet, KeySetClosed};
pub use poller::{PollOutcome, Poller, ProbeFailure};
pub use pool::{Job, dispatch, dispatch_with};
