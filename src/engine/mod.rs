//! Monoline engine: pure rules, no database access

pub mod commission;
pub mod membership;
pub mod placement;
pub mod plan;
pub mod risk;

pub use commission::{distribute, BonusKind, Distribution, Participant, PayoutContext, Payout};
pub use membership::MembershipType;
pub use plan::{CommissionEvent, MAX_LEVELS};
