// Prize layer: aggregation, eligibility per category, and the lucky draw.

pub mod aggregate;
pub mod draw;
pub mod eligibility;

pub use aggregate::{summarize, ParticipantSummary};
pub use draw::{DrawOutcome, DrawState};
pub use eligibility::{resolve_eligibility, EligibilitySet};
