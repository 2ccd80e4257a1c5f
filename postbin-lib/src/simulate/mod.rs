// Leaf components which turn request input into simulated behaviour.
//
// None of these touch the network: they parse, draw and decide.
// Suspending and writing responses is left to the dispatcher.

mod delay;
pub use delay::{DelaySpec, DelaySpecParseError};

mod frequency;
pub use frequency::{FailureFrequency, FrequencyOutcome};

mod freshness;
pub use freshness::{Freshness, FreshnessCheck};

mod outcome;
pub use outcome::{OutcomeTable, OutcomeTableParseError, Selection};
