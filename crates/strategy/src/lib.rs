pub mod config;
pub mod indicators;
pub mod registry;
pub mod snapshot;

pub use config::{IndicatorConfig, RuleConfig, StrategyFileConfig};
pub use registry::RuleRegistry;
pub use snapshot::{compute_snapshot, decision_request};

use common::{Decision, DecisionRequest};

/// A single decision rule evaluated against an indicator snapshot.
pub trait Rule: Send + Sync {
    /// Human-readable name of this rule instance.
    fn name(&self) -> &str;

    /// The symbol this rule watches (e.g. "BTCUSDT"), or "*" for all.
    fn symbol(&self) -> &str;

    /// Evaluate the latest snapshot and optionally emit a decision.
    /// Returns `None` if the rule has nothing to say.
    fn evaluate(&self, request: &DecisionRequest) -> Option<Decision>;

    fn applies_to(&self, symbol: &str) -> bool {
        self.symbol() == "*" || self.symbol().eq_ignore_ascii_case(symbol)
    }
}
