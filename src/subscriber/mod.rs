//! Subscriber registry for threatwire.
//!
//! Durable store of subscription records with an explicit two-axis state
//! (verification x activity) and single-use token handling.

mod repository;
mod service;
mod types;

pub use repository::SubscriptionRepository;
pub use service::{validate_email, SubscribeOutcome, SubscribeRequest, SubscriberService};
pub use types::{
    ActivityState, Frequency, NewSubscription, Subscription, VerificationState,
    MANAGEMENT_TOKEN_TTL_HOURS, VERIFICATION_TOKEN_TTL_HOURS,
};
