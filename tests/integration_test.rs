use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use predicates::prelude::*;
use tempfile::TempDir;

const SECRET_LINE: &str = "GROQ_API_KEY=gsk_live_1234567890";

/// Helper to run git commands in a directory
fn git(dir: &Path, args: &[&str]) -> std::process::Output {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git command");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn git_stdout(dir: &Path, args: &[&str]) -> String {
    String::from_utf8_lossy(&git(dir, args).stdout)
        .trim()
        .to_string()
}

/// Raw bytes of a file at a revision, no trimming
fn show_raw(dir: &Path, spec: &str) -> Vec<u8> {
    git(dir, &["show", spec]).stdout
}

fn init_repo(dir: &Path) -> PathBuf {
    let repo = dir.join("repo");
    fs::create_dir(&repo).expect("failed to create repo dir");
    git(&repo, &["init"]);
    git(&repo, &["config", "user.name", "Test User"]);
    git(&repo, &["config", "user.email", "test@example.com"]);
    repo
}

/// Create a repository whose history carries the secret in backend/.gitignore
fn create_repo_with_secret(dir: &Path) -> PathBuf {
    let repo = init_repo(dir);

    fs::create_dir_all(repo.join("backend")).unwrap();
    fs::write(
        repo.join("backend/.gitignore"),
        format!("node_modules\n{}\n.env\n", SECRET_LINE),
    )
    .unwrap();
    fs::write(repo.join("README.md"), "# demo\n").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Initial commit"]);

    fs::write(repo.join("README.md"), "# demo\nmore docs\n").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Second commit"]);

    repo
}

fn scrub(repo: &Path) -> assert_cmd::assert::Assert {
    assert_cmd::Command::cargo_bin("git-scrub-key")
        .unwrap()
        .arg(repo)
        .assert()
}

#[test]
fn test_scrub_removes_secret_from_all_history() {
    let temp = TempDir::new().unwrap();
    let repo = create_repo_with_secret(temp.path());

    let commits_before = git_stdout(&repo, &["rev-list", "--count", "--all"]);
    let messages_before = git_stdout(&repo, &["log", "--format=%s"]);

    scrub(&repo)
        .success()
        .stderr(predicate::str::contains("rewrote"));

    assert_eq!(
        git_stdout(&repo, &["rev-list", "--count", "--all"]),
        commits_before
    );
    assert_eq!(git_stdout(&repo, &["log", "--format=%s"]), messages_before);

    // no rev anywhere still contains the key prefix
    for rev in git_stdout(&repo, &["rev-list", "--all"]).lines() {
        let grep = Command::new("git")
            .current_dir(&repo)
            .args(["grep", "GROQ_API_KEY", rev])
            .output()
            .unwrap();
        assert!(
            !grep.status.success(),
            "secret still present in {}: {}",
            rev,
            String::from_utf8_lossy(&grep.stdout)
        );
    }

    assert_eq!(
        show_raw(&repo, "HEAD:backend/.gitignore"),
        b"node_modules\n.env"
    );
    assert_eq!(show_raw(&repo, "HEAD:README.md"), b"# demo\nmore docs\n");
}

#[test]
fn test_repo_without_target_keeps_shas() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());

    fs::write(repo.join("file1.txt"), "content 1").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Initial commit"]);

    fs::write(repo.join("file2.txt"), "content 2").unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Second commit"]);

    let shas_before = git_stdout(&repo, &["rev-list", "--all"]);
    scrub(&repo).success();
    let shas_after = git_stdout(&repo, &["rev-list", "--all"]);

    assert_eq!(shas_before, shas_after, "SHAs changed in a clean repo");
}

#[test]
fn test_scrub_twice_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let repo = create_repo_with_secret(temp.path());

    scrub(&repo).success();
    let shas_first = git_stdout(&repo, &["rev-list", "--all"]);

    scrub(&repo).success();
    let shas_second = git_stdout(&repo, &["rev-list", "--all"]);

    assert_eq!(shas_first, shas_second, "second run changed history");
}

#[test]
fn test_only_target_path_is_filtered() {
    let temp = TempDir::new().unwrap();
    let repo = init_repo(temp.path());

    // notes.txt shares the exact blob with backend/.gitignore, and the
    // top-level .gitignore carries its own key line
    let shared = format!("node_modules\n{}\n.env\n", SECRET_LINE);
    fs::create_dir_all(repo.join("backend")).unwrap();
    fs::write(repo.join("backend/.gitignore"), &shared).unwrap();
    fs::write(repo.join("notes.txt"), &shared).unwrap();
    fs::write(repo.join(".gitignore"), format!("{}\n", SECRET_LINE)).unwrap();
    git(&repo, &["add", "."]);
    git(&repo, &["commit", "-m", "Initial commit"]);

    scrub(&repo).success();

    assert_eq!(
        show_raw(&repo, "HEAD:backend/.gitignore"),
        b"node_modules\n.env"
    );
    // the shared blob keeps its exact bytes at the other path
    assert_eq!(show_raw(&repo, "HEAD:notes.txt"), shared.as_bytes());
    // a different .gitignore is not the target
    assert_eq!(
        show_raw(&repo, "HEAD:.gitignore"),
        format!("{}\n", SECRET_LINE).as_bytes()
    );
}

#[test]
fn test_rejects_non_repository() {
    let temp = TempDir::new().unwrap();
    let not_a_repo = temp.path().join("empty");
    fs::create_dir(&not_a_repo).unwrap();

    scrub(&not_a_repo)
        .failure()
        .stderr(predicate::str::contains("not a git repository"));
}
