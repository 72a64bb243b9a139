//! Subscriber notification pipeline for threatwire.
//!
//! Matching, scheduling, digest rendering, transport, and the append-only
//! notification ledger that guarantees at-most-once delivery per
//! (subscription, article) pair.

pub mod dispatcher;
pub mod email;
pub mod ledger;
pub mod matcher;
pub mod scheduler;

pub use dispatcher::{start_notify_loops, DispatchReport, Dispatcher};
pub use email::{
    render_already_subscribed, render_digest, render_management_link, render_verification,
    EmailTransport, HttpEmailTransport, MemoryTransport, OutboundEmail,
};
pub use ledger::{LedgerEntry, NotificationLedger, SendStatus};
pub use matcher::matches;
