//! Run artifacts and fixture files.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;
use transcript_store::{Session, SessionStore, SqliteSessionStore};

use crate::domain::{EvalRun, EvalSession};
use crate::Result;

fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<PathBuf> {
    let data = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    debug!(path = %path.display(), "saved json");
    Ok(path.to_path_buf())
}

/// Write the whole run to `<dir>/<name>.json`.
pub fn save_run_json(run: &EvalRun, dir: &Path) -> Result<PathBuf> {
    save_json(run, &dir.join(format!("{}.json", run.name)))
}

/// Write every reconstructed transcript to `<dir>/<name>-sessions.json`.
pub fn save_run_sessions_json(run: &EvalRun, dir: &Path) -> Result<PathBuf> {
    let sessions: Vec<&Session> = run
        .results
        .iter()
        .filter_map(|r| r.session.as_ref())
        .collect();
    save_json(&sessions, &dir.join(format!("{}-sessions.json", run.name)))
}

/// Store every reconstructed transcript in a SQLite database at
/// `<dir>/<name>.db`. Errored results have no transcript and are skipped.
pub async fn save_run_sessions(run: &EvalRun, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.db", run.name));
    let store = SqliteSessionStore::open(&path)?;

    for session in run.results.iter().filter_map(|r| r.session.as_ref()) {
        store.add_session(session).await?;
    }

    debug!(path = %path.display(), "saved run sessions");
    Ok(path)
}

/// Save `session` as a new fixture under `evals_dir`.
///
/// The file is named after `filename` (or the session id), with `_1`, `_2`,
/// ... appended until the name is free. The fixture gets an empty `evals`
/// block so it is ready to be filled in.
pub fn save_fixture(session: Session, evals_dir: &Path, filename: Option<&str>) -> Result<PathBuf> {
    let base = match filename.filter(|f| !f.is_empty()) {
        Some(name) => name.trim_end_matches(".json").to_string(),
        None => session.id.clone(),
    };

    let mut path = evals_dir.join(format!("{}.json", base));
    let mut number = 1;
    while path.exists() {
        path = evals_dir.join(format!("{}_{}.json", base, number));
        number += 1;
    }

    save_json(&EvalSession::from_session(session), &path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EvalResult, Summary};
    use chrono::Utc;
    use std::time::Duration;

    fn run_with_sessions() -> EvalRun {
        let mut with_session = EvalResult {
            title: "ok".to_string(),
            cost: 0.5,
            ..Default::default()
        };
        let mut transcript = Session::new("ok");
        transcript.add_message(transcript_store::Message::user("hi"));
        with_session.session = Some(transcript);

        let errored = EvalResult {
            title: "broken".to_string(),
            error: Some("no events received from container".to_string()),
            cost: 0.25,
            ..Default::default()
        };

        EvalRun {
            name: "calm-otter-007".to_string(),
            timestamp: Utc::now(),
            duration: Duration::from_secs(3),
            results: vec![with_session, errored],
            summary: Summary {
                total_evals: 2,
                failed_evals: 1,
                total_cost: 0.75,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_run_json_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_with_sessions();

        let path = save_run_json(&run, &dir.path().join("results")).unwrap();
        assert_eq!(path, dir.path().join("results/calm-otter-007.json"));

        let loaded: EvalRun = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded.name, run.name);
        assert_eq!(loaded.results.len(), 2);
        assert_eq!(loaded.summary.total_evals, 2);
        assert_eq!(loaded.summary.total_cost, 0.75);
        assert!(loaded.results[0].session.is_none());
    }

    #[test]
    fn test_sessions_json_skips_results_without_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_run_sessions_json(&run_with_sessions(), dir.path()).unwrap();
        assert!(path.ends_with("calm-otter-007-sessions.json"));

        let sessions: Vec<Session> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].title, "ok");
    }

    #[tokio::test]
    async fn test_sessions_database() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_with_sessions();
        let path = save_run_sessions(&run, dir.path()).await.unwrap();

        let store = SqliteSessionStore::open(&path).unwrap();
        let sessions = store.list_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].first_user_message(), "hi");
    }

    #[test]
    fn test_fixture_names_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new("saved");

        let first = save_fixture(session.clone(), dir.path(), Some("weather")).unwrap();
        let second = save_fixture(session.clone(), dir.path(), Some("weather.json")).unwrap();
        let third = save_fixture(session.clone(), dir.path(), Some("weather")).unwrap();
        assert_eq!(first, dir.path().join("weather.json"));
        assert_eq!(second, dir.path().join("weather_1.json"));
        assert_eq!(third, dir.path().join("weather_2.json"));

        let by_id = save_fixture(session.clone(), dir.path(), None).unwrap();
        assert_eq!(by_id, dir.path().join(format!("{}.json", session.id)));

        let fixture: EvalSession = serde_json::from_slice(&std::fs::read(&first).unwrap()).unwrap();
        assert_eq!(fixture.title, "saved");
        assert!(fixture.evals.relevance.is_empty());

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&first).unwrap()).unwrap();
        assert_eq!(raw["evals"]["relevance"], serde_json::json!([]));
    }
}
