//! Domain models for evaluation runs.
//!
//! - `EvalSession`: a golden conversation plus its `EvalCriteria`
//! - `EvalResult`: the scored outcome of replaying one fixture
//! - `Summary` / `EvalRun`: aggregates over a whole run

pub mod fixture;
pub mod result;
pub mod run;

pub use fixture::{EvalCriteria, EvalSession};
pub use result::EvalResult;
pub use run::{EvalRun, Summary};
