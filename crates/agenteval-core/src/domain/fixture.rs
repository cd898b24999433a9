//! Evaluation fixtures.

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use transcript_store::Session;

/// What a replayed conversation is checked against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalCriteria {
    /// Natural-language statements that must hold for the response.
    #[serde(default)]
    pub relevance: Vec<String>,

    /// Build context under `<evals>/working_dirs/`; empty means none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub working_dir: String,

    /// Expected response size class (`S`, `M`, `L`, `XL`), empty if unchecked.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub size: String,
}

/// A recorded conversation loaded from one fixture file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSession {
    #[serde(flatten)]
    pub session: Session,

    #[serde(default)]
    pub evals: EvalCriteria,

    /// File the fixture was loaded from.
    #[serde(skip)]
    pub source_path: PathBuf,
}

impl EvalSession {
    /// Wrap a session with empty criteria, ready to be saved as a fixture.
    pub fn from_session(session: Session) -> Self {
        Self {
            session,
            evals: EvalCriteria::default(),
            source_path: PathBuf::new(),
        }
    }
}

impl Deref for EvalSession {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl DerefMut for EvalSession {
    fn deref_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}
