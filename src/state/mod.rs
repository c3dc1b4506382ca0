mod controller;
mod history;
mod session;
pub mod usage;


pub use controller::{SessionController, SessionUpdate, TurnOutcome};
pub use history::{
    file_context_marker, ConversationStats, History, DEFAULT_MAX_HISTORY_MESSAGES,
    TRIM_THRESHOLD,
};
pub use session::{Completion, Phase, Session, Step};
pub use usage::{estimate_cost, is_off_peak, UsageCounters};
