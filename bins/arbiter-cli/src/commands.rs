// CLI commands for operating Arbiter
use anyhow::{anyhow, bail, Context, Result};
use arbiter_common::fixtures::{self, FixturePair, FixtureStore, ImportSummary};
use arbiter_common::scoreboard::{self, ScoreboardRow};
use arbiter_common::store::RecordStore;
use arbiter_common::types::{Contest, Problem};
use serde::de::DeserializeOwned;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Create or replace a problem record from a JSON file.
///
/// A file without test cases keeps the ones already stored, so metadata can
/// be edited without re-importing fixtures.
pub async fn put_problem(store: &dyn RecordStore, file: &Path) -> Result<Problem> {
    let mut problem: Problem = load_json(file)?;

    if problem.id.trim().is_empty() {
        bail!("Problem id cannot be empty");
    }
    if problem.time_limit_ms == 0 {
        bail!("Problem '{}' needs a positive time_limit_ms", problem.id);
    }

    if problem.test_cases.is_empty() {
        if let Some(existing) = store.get_problem(&problem.id).await? {
            problem.test_cases = existing.test_cases;
        }
    }

    store
        .put_problem(&problem)
        .await
        .context("Failed to store problem")?;

    println!(
        "✅ Problem '{}' saved ({} test cases, {} ms, weight {})",
        problem.id,
        problem.test_cases.len(),
        problem.time_limit_ms,
        problem.score
    );
    Ok(problem)
}

/// Create or replace a contest record from a JSON file
pub async fn put_contest(store: &dyn RecordStore, file: &Path) -> Result<Contest> {
    let contest: Contest = load_json(file)?;

    if contest.id.trim().is_empty() {
        bail!("Contest id cannot be empty");
    }
    if contest.end <= contest.start {
        bail!("Contest '{}' must end after it starts", contest.id);
    }

    for problem_id in &contest.problem_ids {
        if store.get_problem(problem_id).await?.is_none() {
            println!("⚠️  Problem '{}' does not exist yet", problem_id);
        }
    }

    store
        .put_contest(&contest)
        .await
        .context("Failed to store contest")?;

    println!(
        "✅ Contest '{}' saved ({} problems, {} → {})",
        contest.id,
        contest.problem_ids.len(),
        contest.start,
        contest.end
    );
    Ok(contest)
}

pub fn format_preview(pairs: &[FixturePair]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<4} {:<24} {:>10}  {:<24} {:>10}", "#", "input", "bytes", "output", "bytes");
    for (i, pair) in pairs.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:<4} {:<24} {:>10}  {:<24} {:>10}",
            i + 1,
            pair.input_name(),
            pair.input_size,
            pair.output_name(),
            pair.output_size
        );
    }
    out
}

/// Scan a directory and print the pairs an import would create
pub fn preview_fixtures(dir: &Path) -> Result<Vec<FixturePair>> {
    println!("🔍 Scanning {}...", dir.display());
    let pairs = fixtures::preview(dir).with_context(|| format!("Failed to scan {}", dir.display()))?;
    if pairs.is_empty() {
        bail!("No input/output pairs found in {}", dir.display());
    }
    print!("{}", format_preview(&pairs));
    Ok(pairs)
}

/// Copy previewed pairs into the fixture store and append them to the problem
pub async fn import_fixtures(
    store: &dyn RecordStore,
    fixture_store: &FixtureStore,
    problem_id: &str,
    pairs: &[FixturePair],
) -> Result<ImportSummary> {
    let mut problem = store
        .get_problem(problem_id)
        .await?
        .ok_or_else(|| anyhow!("Problem '{}' not found", problem_id))?;

    println!("📦 Importing {} pairs into '{}'...", pairs.len(), problem_id);
    let summary = fixtures::import_pairs(fixture_store, &mut problem, pairs).await;

    if summary.imported > 0 {
        store
            .put_problem(&problem)
            .await
            .context("Failed to store problem")?;
    }

    if summary.failed > 0 {
        println!("⚠️  {} pairs failed, see log output", summary.failed);
    }
    println!(
        "✅ Imported {} pairs, problem now has {} test cases",
        summary.imported,
        problem.test_cases.len()
    );
    Ok(summary)
}

pub fn render_scoreboard(rows: &[ScoreboardRow]) -> String {
    let mut out = String::new();
    let Some(first) = rows.first() else {
        out.push_str("No contestants yet.\n");
        return out;
    };

    let _ = write!(out, "{:<5} {:<20} {:>6} {:>9}", "Rank", "Contestant", "Score", "Penalty");
    for cell in &first.cells {
        let _ = write!(out, " {:>9}", cell.problem_id);
    }
    out.push('\n');

    for row in rows {
        let _ = write!(
            out,
            "{:<5} {:<20} {:>6} {:>9}",
            row.rank, row.contestant, row.total_score, row.penalty_display
        );
        for cell in &row.cells {
            let _ = write!(out, " {:>9}", cell.display);
        }
        out.push('\n');
    }
    out
}

pub async fn show_scoreboard(store: &dyn RecordStore, contest_id: &str) -> Result<String> {
    let rows = scoreboard::compute_for(store, contest_id)
        .await?
        .ok_or_else(|| anyhow!("Contest '{}' not found", contest_id))?;
    Ok(render_scoreboard(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_common::store::MemoryStore;
    use arbiter_common::types::{Submission, TestCase};
    use chrono::{TimeZone, Utc};

    fn write(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    #[tokio::test]
    async fn test_put_problem_keeps_existing_test_cases() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        store
            .put_problem(&Problem {
                id: "a".to_string(),
                title: "Old".to_string(),
                time_limit_ms: 1000,
                memory_limit_kb: 65536,
                score: 100,
                test_cases: vec![TestCase {
                    ordinal: 1,
                    input_path: "aa/in".to_string(),
                    output_path: "bb/out".to_string(),
                    input_name: "1.in".to_string(),
                    output_name: "1.out".to_string(),
                    input_size: 2,
                    output_size: 3,
                }],
            })
            .await
            .unwrap();

        let file = write(dir.path(), "a.json", r#"{"id":"a","title":"New","time_limit_ms":1500}"#);
        let saved = put_problem(&store, &file).await.unwrap();

        assert_eq!(saved.title, "New");
        assert_eq!(saved.score, 100);
        assert_eq!(saved.test_cases.len(), 1);
        assert_eq!(store.get_problem("a").await.unwrap().unwrap().time_limit_ms, 1500);
    }

    #[tokio::test]
    async fn test_put_problem_rejects_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();

        let file = write(dir.path(), "bad.json", r#"{"id":"","title":"x"}"#);
        assert!(put_problem(&store, &file).await.is_err());

        let file = write(dir.path(), "zero.json", r#"{"id":"z","time_limit_ms":0}"#);
        assert!(put_problem(&store, &file).await.is_err());

        let file = write(dir.path(), "broken.json", "{not json");
        assert!(put_problem(&store, &file).await.is_err());
    }

    #[tokio::test]
    async fn test_put_contest_requires_end_after_start() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();

        let file = write(
            dir.path(),
            "c.json",
            r#"{"id":"c","title":"Spring","start":"2024-05-01T10:00:00Z","end":"2024-05-01T09:00:00Z","problem_ids":["a"]}"#,
        );
        assert!(put_contest(&store, &file).await.is_err());

        let file = write(
            dir.path(),
            "c.json",
            r#"{"id":"c","title":"Spring","start":"2024-05-01T10:00:00Z","end":"2024-05-01T15:00:00Z","problem_ids":["a"]}"#,
        );
        let contest = put_contest(&store, &file).await.unwrap();
        assert_eq!(contest.start, Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        assert!(store.get_contest("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_import_appends_pairs_in_stem_order() {
        let source = tempfile::tempdir().unwrap();
        for (stem, input, output) in [("10", "10\n", "20\n"), ("2", "2\n", "4\n"), ("1", "1\n", "2\n")] {
            write(source.path(), &format!("{}.in", stem), input);
            write(source.path(), &format!("{}.out", stem), output);
        }
        let fixture_root = tempfile::tempdir().unwrap();
        let fixture_store = FixtureStore::new(fixture_root.path());
        let store = MemoryStore::new();
        store
            .put_problem(&Problem {
                id: "double".to_string(),
                title: "Double".to_string(),
                time_limit_ms: 1000,
                memory_limit_kb: 65536,
                score: 100,
                test_cases: Vec::new(),
            })
            .await
            .unwrap();

        let pairs = preview_fixtures(source.path()).unwrap();
        assert_eq!(pairs.len(), 3);
        assert!(format_preview(&pairs).contains("10.in"));
        // Previewing writes nothing
        assert!(store.get_problem("double").await.unwrap().unwrap().test_cases.is_empty());

        let summary = import_fixtures(&store, &fixture_store, "double", &pairs).await.unwrap();
        assert_eq!(summary.imported, 3);
        assert_eq!(summary.failed, 0);

        let problem = store.get_problem("double").await.unwrap().unwrap();
        let names: Vec<&str> = problem.test_cases.iter().map(|t| t.input_name.as_str()).collect();
        assert_eq!(names, vec!["1.in", "2.in", "10.in"]);
        let stored = fixture_store.read(&problem.test_cases[2].output_path).await.unwrap();
        assert_eq!(stored, b"20\n");
    }

    #[tokio::test]
    async fn test_import_into_unknown_problem_fails() {
        let source = tempfile::tempdir().unwrap();
        write(source.path(), "1.in", "1");
        write(source.path(), "1.ans", "2");
        let fixture_root = tempfile::tempdir().unwrap();
        let pairs = preview_fixtures(source.path()).unwrap();

        let err = import_fixtures(&MemoryStore::new(), &FixtureStore::new(fixture_root.path()), "ghost", &pairs)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_empty_directory_has_nothing_to_import() {
        let source = tempfile::tempdir().unwrap();
        assert!(preview_fixtures(source.path()).is_err());
    }

    #[tokio::test]
    async fn test_show_scoreboard() {
        let store = MemoryStore::new();
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        store
            .put_problem(&Problem {
                id: "a".to_string(),
                title: "A".to_string(),
                time_limit_ms: 1000,
                memory_limit_kb: 65536,
                score: 100,
                test_cases: Vec::new(),
            })
            .await
            .unwrap();
        store
            .put_contest(&Contest {
                id: "spring".to_string(),
                title: "Spring".to_string(),
                start,
                end: start + chrono::Duration::hours(5),
                problem_ids: vec!["a".to_string()],
            })
            .await
            .unwrap();
        store.register("spring", "alice").await.unwrap();
        let submission = Submission::new("alice", "spring", "a", "cpp", "", start);
        store.create_submission(&submission).await.unwrap();

        let table = show_scoreboard(&store, "spring").await.unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Contestant"));
        assert!(lines[1].contains("alice"));
        assert!(lines[1].contains("00:00"));

        assert!(show_scoreboard(&store, "winter").await.is_err());
    }
}
