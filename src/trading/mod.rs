//! Trading logic: trend analysis, position sizing, decision pipeline,
//! trade ledger, and the risk governor.

mod governor;
mod ledger;
mod pipeline;
mod sizer;
mod trend;

pub use governor::{RiskGovernor, MAX_CONSECUTIVE_LOSSES};
pub use ledger::{Settlement, TradeLedger, TRIAL_STARTING_BALANCE};
pub use pipeline::{DecisionPipeline, ADVISORY_TIMEOUT};
pub use sizer::safe_size;
pub use trend::{analyze_trend, TrendSignal};
