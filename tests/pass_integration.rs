//! End-to-end passes against an in-memory git double.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

use tempfile::TempDir;

use docwatch::config::Config;
use docwatch::analysis::PrimaryType;
use docwatch::db::{content_hash, Database};
use docwatch::watcher::{
    run_pass, CommitSummary, DocGenerator, FileOutcome, GeneratedDoc, GitRepo, OutlineGenerator,
    PassContext, PassReport, TokenUsage,
};
use docwatch::Error;

const REPO: &str = "test-repo";

#[derive(Default)]
struct FakeGit {
    head: RefCell<Option<String>>,
    commits: RefCell<Vec<String>>,
    changed: RefCell<Vec<String>>,
    files: RefCell<Vec<String>>,
    /// (path, rev) -> content
    history: RefCell<HashMap<(String, String), String>>,
}

impl FakeGit {
    fn commit(&self, rev: &str, changed: &[&str]) {
        *self.head.borrow_mut() = Some(rev.to_string());
        self.commits.borrow_mut().push(rev.to_string());
        *self.changed.borrow_mut() = changed.iter().map(|s| s.to_string()).collect();
    }

    fn remember(&self, path: &str, rev: &str, content: &str) {
        self.history
            .borrow_mut()
            .insert((path.to_string(), rev.to_string()), content.to_string());
    }
}

impl GitRepo for FakeGit {
    fn current_commit(&self) -> Result<Option<String>, Error> {
        Ok(self.head.borrow().clone())
    }

    fn has_commit(&self, rev: &str) -> Result<bool, Error> {
        Ok(self.commits.borrow().iter().any(|c| c == rev))
    }

    fn changed_files(&self, _from: &str, _to: &str) -> Result<Vec<String>, Error> {
        Ok(self.changed.borrow().clone())
    }

    fn list_files(&self) -> Result<Vec<String>, Error> {
        Ok(self.files.borrow().clone())
    }

    fn read_file_at(&self, path: &str, rev: &str) -> Result<Option<String>, Error> {
        Ok(self
            .history
            .borrow()
            .get(&(path.to_string(), rev.to_string()))
            .cloned())
    }

    fn commit_log(&self, _from: Option<&str>, to: &str) -> Result<Vec<CommitSummary>, Error> {
        Ok(vec![CommitSummary {
            hash: to.to_string(),
            subject: "change".to_string(),
        }])
    }
}

/// Outline generator that also reports token usage.
struct MeteredGenerator;

impl DocGenerator for MeteredGenerator {
    fn generate(&self, path: &str, source: &str) -> Result<GeneratedDoc, Error> {
        let mut doc = OutlineGenerator.generate(path, source)?;
        doc.usage = Some(TokenUsage {
            model: "test-model".to_string(),
            input_tokens: source.len() as i64,
            output_tokens: doc.markdown.len() as i64,
            cost: 0.01,
        });
        Ok(doc)
    }
}

/// Emits the source verbatim, so it works on files that do not parse.
struct VerbatimGenerator;

impl DocGenerator for VerbatimGenerator {
    fn generate(&self, _path: &str, source: &str) -> Result<GeneratedDoc, Error> {
        Ok(GeneratedDoc {
            markdown: format!("```php\n{}```\n", source),
            usage: None,
        })
    }
}

struct FailingGenerator;

impl DocGenerator for FailingGenerator {
    fn generate(&self, path: &str, _source: &str) -> Result<GeneratedDoc, Error> {
        Err(Error::Generation(format!("model unavailable for {}", path)))
    }
}

struct Fixture {
    dir: TempDir,
    git: FakeGit,
    db: Database,
    config: Config,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
            git: FakeGit::default(),
            db: Database::open_memory().unwrap(),
            config: Config::default(),
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
        let mut files = self.git.files.borrow_mut();
        if !files.iter().any(|f| f == rel) {
            files.push(rel.to_string());
        }
    }

    fn pass_with(&self, generator: &dyn DocGenerator, force: bool) -> Result<PassReport, Error> {
        let ctx = PassContext {
            repo_root: self.root(),
            repository: REPO,
            git: &self.git,
            generator,
            db: &self.db,
            config: &self.config,
            force,
        };
        run_pass(&ctx)
    }

    fn pass(&self) -> PassReport {
        self.pass_with(&OutlineGenerator, false).unwrap()
    }

    fn marker(&self) -> Option<String> {
        self.db.last_processed_commit(REPO).unwrap()
    }
}

const USER_V1: &str = "<?php\nnamespace App;\n\nclass User\n{\n    public function name() {}\n}\n";

/// Fixture after a first pass at commit `c1` documented `src/User.php`.
fn documented_fixture() -> Fixture {
    let fx = Fixture::new();
    fx.write("src/User.php", USER_V1);
    fx.git.remember("src/User.php", "c1", USER_V1);
    fx.git.commit("c1", &[]);
    let report = fx.pass();
    assert_eq!(report.processed(), 1);
    fx
}

#[test]
fn test_empty_repository_is_a_noop() {
    let fx = Fixture::new();
    let report = fx.pass();
    assert_eq!(report, PassReport::default());
    assert_eq!(fx.marker(), None);
}

#[test]
fn test_first_pass_documents_tracked_files() {
    let fx = Fixture::new();
    fx.write("src/User.php", USER_V1);
    fx.write("assets/app.js", "console.log(1)");
    fx.write("vendor/lib/Dep.php", "<?php class Dep {}");
    fx.git.commit("c1", &[]);

    let report = fx.pass();
    assert_eq!(report.outcomes.len(), 1);
    assert!(matches!(
        &report.outcomes[0],
        FileOutcome::Processed { path, score: None, .. } if path == "src/User.php"
    ));
    assert!(report.marker_advanced);
    assert_eq!(fx.marker().as_deref(), Some("c1"));

    let doc = std::fs::read_to_string(fx.root().join("docs/api/src/User.md")).unwrap();
    assert!(doc.contains("## class `User`"));

    let symbols = fx
        .db
        .documented_symbol_names(&fx.root().join("src/User.php"))
        .unwrap();
    assert!(symbols.contains("User::name"));
}

#[test]
fn test_unchanged_head_leaves_marker_untouched() {
    let fx = documented_fixture();
    let before = fx.db.commit_marker(REPO).unwrap().unwrap();

    let report = fx.pass();
    assert!(report.outcomes.is_empty());
    assert!(!report.marker_advanced);
    assert_eq!(fx.db.commit_marker(REPO).unwrap().unwrap(), before);
}

#[test]
fn test_reindent_is_skipped_and_ledger_kept() {
    let fx = documented_fixture();
    let path = fx.root().join("src/User.php");
    let hash_before = fx.db.file_entry(&path).unwrap().unwrap().last_hash;

    fx.write(
        "src/User.php",
        "<?php\nnamespace App;\n\nclass User\n{\n        public function name() {}\n}\n",
    );
    fx.git.commit("c2", &["src/User.php"]);

    let report = fx.pass();
    match &report.outcomes[..] {
        [FileOutcome::Skipped { reason, .. }] => assert!(reason.starts_with("score 1")),
        other => panic!("unexpected outcomes {:?}", other),
    }
    assert_eq!(fx.db.file_entry(&path).unwrap().unwrap().last_hash, hash_before);
    assert_eq!(fx.marker().as_deref(), Some("c2"));
    assert_eq!(fx.db.stats().unwrap().analyses_cached, 1);
}

#[test]
fn test_interface_change_regenerates() {
    let fx = documented_fixture();
    fx.write(
        "src/User.php",
        "<?php\nnamespace App;\n\nclass User implements Named\n{\n    public function name() {}\n}\n",
    );
    fx.git.commit("c2", &["src/User.php"]);

    let report = fx.pass();
    match &report.outcomes[..] {
        [FileOutcome::Processed {
            score: Some(score), ..
        }] => assert!(*score >= 70),
        other => panic!("unexpected outcomes {:?}", other),
    }
    let doc = std::fs::read_to_string(fx.root().join("docs/api/src/User.md")).unwrap();
    assert!(doc.contains("Implements: `Named`"));
}

#[test]
fn test_store_failure_aborts_without_advancing_marker() {
    let fx = documented_fixture();
    fx.write("src/User.php", "<?php\nclass User {}\n");
    fx.git.commit("c2", &["src/User.php"]);
    fx.db
        .conn()
        .execute_batch("DROP TABLE file_hashes")
        .unwrap();

    let err = fx.pass_with(&OutlineGenerator, false).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(fx.marker().as_deref(), Some("c1"));
}

#[test]
fn test_generation_failure_is_per_file() {
    let fx = Fixture::new();
    fx.write("src/A.php", "<?php class A {}");
    fx.write("src/B.php", "<?php class B {}");
    fx.git.commit("c1", &[]);

    let report = fx.pass_with(&FailingGenerator, false).unwrap();
    assert_eq!(report.errors(), 2);
    assert!(report.marker_advanced);
    assert_eq!(fx.marker().as_deref(), Some("c1"));
    // Nothing recorded, so a forced pass retries both.
    assert_eq!(fx.db.stats().unwrap().tracked_files, 0);
    let retry = fx.pass_with(&OutlineGenerator, true).unwrap();
    assert_eq!(retry.processed(), 2);
}

#[test]
fn test_deleted_file_is_skipped() {
    let fx = documented_fixture();
    std::fs::remove_file(fx.root().join("src/User.php")).unwrap();
    fx.git.commit("c2", &["src/User.php"]);

    let report = fx.pass();
    assert!(matches!(
        &report.outcomes[..],
        [FileOutcome::Skipped { reason, .. }] if reason == "deleted"
    ));
}

#[test]
fn test_cleanup_after_pass_keeps_usage_ledger() {
    let fx = Fixture::new();
    for name in ["A", "B", "C"] {
        fx.write(
            &format!("src/{}.php", name),
            &format!("<?php class {} {{}}", name),
        );
    }
    fx.git.commit("c1", &[]);
    let report = fx.pass_with(&MeteredGenerator, false).unwrap();
    assert_eq!(report.processed(), 3);
    assert_eq!(fx.db.cost_stats().unwrap().calls, 3);

    std::fs::remove_file(fx.root().join("src/B.php")).unwrap();
    assert_eq!(fx.db.cleanup().unwrap(), 1);

    assert_eq!(fx.db.stats().unwrap().tracked_files, 2);
    assert_eq!(fx.db.usage_entries().unwrap().len(), 3);
    assert_eq!(fx.marker().as_deref(), Some("c1"));
}

#[test]
fn test_forced_pass_regenerates_unchanged_files() {
    let fx = documented_fixture();
    let report = fx.pass_with(&OutlineGenerator, true).unwrap();
    assert_eq!(report.processed(), 1);
    assert!(report.marker_advanced);
}

#[test]
fn test_unparseable_revision_is_scored_from_text() {
    const OLD: &str =
        "<?php\nclass Calc\n{\n    public function total()\n    {\n        return 1;\n    }\n}\n";
    const NEW: &str =
        "<?php\nclass Calc\n{\n    public function total()\n    {\n        return (1;\n    }\n}\n";

    let fx = Fixture::new();
    fx.write("src/Calc.php", OLD);
    fx.git.remember("src/Calc.php", "c1", OLD);
    fx.git.commit("c1", &[]);
    assert_eq!(fx.pass_with(&VerbatimGenerator, false).unwrap().processed(), 1);

    fx.write("src/Calc.php", NEW);
    fx.git.commit("c2", &["src/Calc.php"]);
    let report = fx.pass_with(&VerbatimGenerator, false).unwrap();
    // 25 semantic + 5 minimal severity, no structural delta
    match &report.outcomes[..] {
        [FileOutcome::Processed {
            score: Some(score), ..
        }] => assert_eq!(*score, 30),
        other => panic!("unexpected outcomes {:?}", other),
    }

    let analysis = fx
        .db
        .cached_analysis(
            &fx.root().join("src/Calc.php"),
            &content_hash(OLD.as_bytes()),
            &content_hash(NEW.as_bytes()),
        )
        .unwrap()
        .unwrap();
    assert_eq!(analysis.classification.primary_type, PrimaryType::Semantic);
}

#[test]
fn test_repeated_pair_reuses_cached_analysis() {
    let mut fx = documented_fixture();
    fx.write(
        "src/User.php",
        "<?php\nnamespace App;\n\nclass User\n{\n        public function name() {}\n}\n",
    );
    fx.git.commit("c2", &["src/User.php"]);
    let first = fx.pass();
    assert!(matches!(
        &first.outcomes[..],
        [FileOutcome::Skipped { reason, .. }] if reason.starts_with("score 1")
    ));

    // Replay the same range under a policy that would score it differently.
    fx.db.set_last_processed_commit(REPO, "c1").unwrap();
    fx.config.scoring.whitespace_points = 3;
    let replay = fx.pass();
    match &replay.outcomes[..] {
        [FileOutcome::Skipped { reason, .. }] => assert!(reason.starts_with("score 1")),
        other => panic!("unexpected outcomes {:?}", other),
    }
    assert_eq!(fx.db.stats().unwrap().analyses_cached, 1);
}

#[test]
fn test_vanished_marker_commit_falls_back_to_all_files() {
    let fx = documented_fixture();
    // History rewritten: the recorded commit is gone.
    fx.db.set_last_processed_commit(REPO, "rewritten").unwrap();
    fx.write(
        "src/User.php",
        "<?php\nnamespace App;\n\nclass User\n{\n    public function email() {}\n}\n",
    );
    fx.git.commit("c2", &[]);

    let report = fx.pass();
    assert_eq!(report.previous.as_deref(), Some("rewritten"));
    assert!(matches!(
        &report.outcomes[..],
        [FileOutcome::Processed { path, score: None, .. }] if path == "src/User.php"
    ));
    assert!(report.marker_advanced);
    assert_eq!(fx.marker().as_deref(), Some("c2"));
}

#[test]
fn test_non_utf8_file_is_documented() {
    let fx = Fixture::new();
    let bytes: &[u8] = b"<?php\nclass Legacy\n{\n    public $name = '\xe9t\xe9';\n}\n";
    std::fs::create_dir_all(fx.root().join("src")).unwrap();
    std::fs::write(fx.root().join("src/Legacy.php"), bytes).unwrap();
    fx.git.files.borrow_mut().push("src/Legacy.php".to_string());
    fx.git.commit("c1", &[]);

    let report = fx.pass();
    assert_eq!(report.processed(), 1, "{}", report);
    let entry = fx
        .db
        .file_entry(&fx.root().join("src/Legacy.php"))
        .unwrap()
        .unwrap();
    assert_eq!(entry.last_hash, content_hash(bytes));
    let doc = std::fs::read_to_string(fx.root().join("docs/api/src/Legacy.md")).unwrap();
    assert!(doc.contains("## class `Legacy`"));
}
