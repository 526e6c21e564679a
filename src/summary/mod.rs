//! Everything between a raw item and a model answer we are willing to store.
//!
//! - intake: permanent-content screening before scheduling
//! - prompt: request rendering within a lane's token budget
//! - response: validation and default substitution of model output
//! - normalize: phrase blacklist and entity corrections

pub mod intake;
pub mod normalize;
pub mod prompt;
pub mod response;

pub use intake::{Intake, Screening, is_paywall_content};
pub use normalize::{BlacklistNormalizer, Passthrough, TextNormalizer};
pub use prompt::{BudgetHint, PROMPT_VERSION, SummaryRequest, estimate_tokens, truncate_for_context};
pub use response::SummaryResponse;
