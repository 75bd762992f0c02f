use std::{
    collections::HashSet,
    fs::{self, File},
    path::Path,
    time::{Duration, SystemTime},
};

use claude::ParserOptions;
use core_model::{RecordKind, WarningKind};
use history::{Config, History, Project};
use serde_json::{Value, json};

fn write_log(dir: &Path, name: &str, lines: &[Value], age_secs: u64) {
    let body: Vec<String> = lines.iter().map(Value::to_string).collect();
    let path = dir.join(name);
    fs::write(&path, body.join("\n") + "\n").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .unwrap();
}

fn user(id: &str, parent: Option<&str>, text: &str) -> Value {
    json!({
        "type": "user",
        "uuid": id,
        "parentUuid": parent,
        "sessionId": "s",
        "timestamp": "2025-05-01T12:00:00Z",
        "message": {"role": "user", "content": text}
    })
}

fn assistant(id: &str, parent: &str) -> Value {
    json!({
        "type": "assistant",
        "uuid": id,
        "parentUuid": parent,
        "timestamp": "2025-05-01T12:00:01Z",
        "message": {"role": "assistant", "model": "claude-sonnet-4", "content": [{"type": "text", "text": "ok"}]}
    })
}

/// Two sessions, one of them branched, continued in a second file and
/// summarized from a third; plus a stale duplicate copy.
fn fixture(dir: &Path) {
    write_log(
        dir,
        "alpha.jsonl",
        &[
            user("a1", None, "start alpha"),
            assistant("a2", "a1"),
            user("a3", Some("a2"), "first try"),
            user("a3b", Some("a2"), "second try"),
            assistant("a4", "a3b"),
            json!({"type": "mystery", "uuid": "m1", "parentUuid": "a4"}),
        ],
        30,
    );
    write_log(
        dir,
        "beta.jsonl",
        &[
            user("b1", None, "start beta"),
            assistant("b2", "b1"),
            json!({"type": "system", "uuid": "sys", "parentUuid": "b2", "content": "compacted"}),
            user("b3", Some("sys"), "after compaction"),
        ],
        20,
    );
    write_log(
        dir,
        "alpha-cont.jsonl",
        &[user("a5", Some("m1"), "continued"), assistant("a6", "a5")],
        10,
    );
    write_log(
        dir,
        "summaries.jsonl",
        &[
            json!({"type": "summary", "summary": "Alpha retry", "leafUuid": "a6"}),
            json!({"type": "summary", "summary": "Dangling", "leafUuid": "nowhere"}),
        ],
        5,
    );
    write_log(
        dir,
        "stale-copy.jsonl",
        &[user("b1", None, "start beta"), assistant("b2", "b1")],
        40,
    );
}

fn project(dir: &Path) -> Project {
    Project::new(dir, ParserOptions::default(), true)
}

#[test]
fn sessions_are_disjoint_and_complete() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let project = project(dir.path());
    let sessions = project.sessions().unwrap();

    let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["beta", "alpha"]);

    let mut seen = HashSet::new();
    for session in sessions {
        for record in &session.records {
            assert!(seen.insert(record.id.as_str()), "{} in two sessions", record.id);
        }
    }
    assert_eq!(seen.len(), 10);
}

#[test]
fn threads_partition_each_session() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let project = project(dir.path());

    for session in project.sessions().unwrap() {
        let threads = session.threads();
        assert_eq!(threads.len(), session.root_segment.leaf_count());

        let mut covered: Vec<&str> = threads
            .iter()
            .flat_map(|t| t.messages().map(|r| r.id.as_str()).collect::<Vec<_>>())
            .collect();
        covered.sort();
        covered.dedup();
        let mut all: Vec<&str> = session.records.iter().map(|r| r.id.as_str()).collect();
        all.sort();
        assert_eq!(covered, all);

        for thread in &threads {
            let first = thread.messages().next().unwrap();
            assert!(first.is_root());
            let leaf = thread.leaf().unwrap();
            assert_eq!(leaf.id, thread.id());
        }
    }
}

#[test]
fn alpha_branches_continue_across_files() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let project = project(dir.path());
    let alpha = project.session("alpha").unwrap().unwrap();

    let threads = alpha.threads();
    assert_eq!(threads.len(), 2);
    let leaves: Vec<&str> = threads.iter().map(|t| t.id()).collect();
    assert_eq!(leaves, vec!["a3", "a6"]);

    // The unknown line is excluded but still links the continuation.
    assert!(alpha.record("m1").is_none());
    assert_eq!(alpha.record("a5").unwrap().parent_id.as_deref(), Some("a4"));
    assert_eq!(threads[1].summary().unwrap().text, "Alpha retry");
    assert!(threads[0].summary().is_none());

    assert_eq!(
        alpha.files,
        vec!["summaries.jsonl", "alpha-cont.jsonl", "alpha.jsonl"]
    );
    let unknown: Vec<_> = alpha
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::UnknownRecordType)
        .collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].file.as_deref(), Some("alpha.jsonl"));
    assert_eq!(unknown[0].line, Some(6));

    let RecordKind::AssistantMessage(msg) = &alpha.record("a2").unwrap().kind else {
        panic!("a2 should be an assistant message");
    };
    assert_eq!(msg.model.as_deref(), Some("claude-sonnet-4"));
}

#[test]
fn beta_is_relinked_and_deduplicated() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let project = project(dir.path());
    let beta = project.session("beta").unwrap().unwrap();

    let ids: Vec<&str> = beta.records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["b1", "b2", "b3"]);
    assert_eq!(beta.record("b3").unwrap().parent_id.as_deref(), Some("b2"));
    assert_eq!(beta.records[0].origin.file, "beta.jsonl");
    assert!(beta.warnings.is_empty());
    assert!(project.session("stale-copy").unwrap().is_none());
}

#[test]
fn summaries_and_continuations_are_not_sessions() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());
    let project = project(dir.path());
    assert!(project.session("summaries").unwrap().is_none());
    assert!(project.session("alpha-cont").unwrap().is_none());
}

#[test]
fn reconstruction_is_repeatable() {
    let dir = tempfile::tempdir().unwrap();
    fixture(dir.path());

    let render = |project: &Project| -> String {
        serde_json::to_string(project.sessions().unwrap()).unwrap()
    };
    let first = render(&project(dir.path()));
    let second = render(&project(dir.path()));
    assert_eq!(first, second);
}

#[test]
fn history_resolves_and_reports_activity() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("-work-alpha");
    fs::create_dir(&dir).unwrap();
    fixture(&dir);

    let history = History::new(&Config {
        projects_path: root.path().to_path_buf(),
        ..Config::default()
    });
    let project = history.project("alpha").unwrap();
    assert_eq!(project.id, "-work-alpha");
    assert_eq!(project.resolve_session_id("be").unwrap(), "beta");

    let activity = history
        .sessions_updated_on(chrono::NaiveDate::from_ymd_opt(2025, 5, 1).unwrap())
        .unwrap();
    assert_eq!(activity.len(), 3);
    assert!(activity.iter().all(|a| a.project_id == "-work-alpha"));
}
