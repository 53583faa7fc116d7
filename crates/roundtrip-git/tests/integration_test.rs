use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

use roundtrip_git::{EntryMode, GitError, GitOid, GitRepo, GixRepo, RefEdit, RefName, TreeEntry};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8(out.stdout).unwrap()
}

fn setup_repo() -> (TempDir, GixRepo) {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q", "-b", "main"]);
    git(dir.path(), &["config", "user.email", "test@test.com"]);
    git(dir.path(), &["config", "user.name", "Test User"]);
    let repo = GixRepo::open(dir.path()).unwrap();
    (dir, repo)
}

fn blob_entry(name: &str, oid: GitOid) -> TreeEntry {
    TreeEntry {
        name: name.to_owned(),
        mode: EntryMode::Blob,
        oid,
    }
}

fn pristine() -> RefName {
    RefName::new("refs/heads/sdk-pristine").unwrap()
}

fn commit_single_file(repo: &GixRepo, name: &str, content: &[u8]) -> (GitOid, GitOid) {
    let blob = repo.write_blob(content).unwrap();
    let tree = repo.write_tree(&[blob_entry(name, blob)]).unwrap();
    let commit = repo.create_commit(tree, &[], "snapshot").unwrap();
    (commit, tree)
}

// ===========================================================================
// 1. Objects
// ===========================================================================

#[test]
fn blob_roundtrip_and_dedup() {
    let (_dir, repo) = setup_repo();
    let oid = repo.write_blob(b"some blob content").unwrap();
    assert_eq!(repo.read_blob(oid).unwrap(), b"some blob content");
    assert_eq!(repo.write_blob(b"some blob content").unwrap(), oid);
    assert!(repo.has_object(oid));
}

#[test]
fn blob_hash_matches_git_hash_object() {
    let (dir, repo) = setup_repo();
    std::fs::write(dir.path().join("f.txt"), b"hello\n").unwrap();
    let expected = git(dir.path(), &["hash-object", "f.txt"]);
    let oid = repo.write_blob(b"hello\n").unwrap();
    assert_eq!(oid.to_string(), expected.trim());
}

#[test]
fn read_missing_blob_is_not_found() {
    let (_dir, repo) = setup_repo();
    let missing: GitOid = "1234567890123456789012345678901234567890".parse().unwrap();
    let err = repo.read_blob(missing).unwrap_err();
    assert!(err.is_not_found(), "unexpected error: {err}");
    assert!(!repo.has_object(missing));
}

#[test]
fn reading_a_tree_as_blob_is_not_reported_missing() {
    let (_dir, repo) = setup_repo();
    let (_, tree) = commit_single_file(&repo, "a", b"1");
    assert!(repo.has_object(tree));
    let err = repo.read_blob(tree).unwrap_err();
    assert!(!err.is_not_found(), "unexpected error: {err}");
}

#[test]
fn write_tree_is_order_independent_and_matches_git() {
    let (dir, repo) = setup_repo();
    let blob = repo.write_blob(b"x\n").unwrap();
    let sub = repo.write_tree(&[blob_entry("inner.txt", blob)]).unwrap();
    let dir_entry = TreeEntry {
        name: "a".to_owned(),
        mode: EntryMode::Tree,
        oid: sub,
    };

    let forward = repo
        .write_tree(&[dir_entry.clone(), blob_entry("a.txt", blob), blob_entry("a-b", blob)])
        .unwrap();
    let backward = repo
        .write_tree(&[blob_entry("a-b", blob), blob_entry("a.txt", blob), dir_entry])
        .unwrap();
    assert_eq!(forward, backward);

    // git itself must consider the tree well-formed.
    git(dir.path(), &["fsck", "--strict", "--no-dangling"]);
    let listing = git(dir.path(), &["ls-tree", "--name-only", &forward.to_string()]);
    assert_eq!(listing.lines().collect::<Vec<_>>(), ["a-b", "a.txt", "a"]);
}

#[test]
fn write_tree_rejects_duplicates() {
    let (_dir, repo) = setup_repo();
    let blob = repo.write_blob(b"x").unwrap();
    let err = repo
        .write_tree(&[blob_entry("same", blob), blob_entry("same", blob)])
        .unwrap_err();
    assert!(matches!(err, GitError::BackendError { .. }));
}

#[test]
fn commit_roundtrip_and_tree_dereference() {
    let (_dir, repo) = setup_repo();
    let (commit, tree) = commit_single_file(&repo, "hello.txt", b"hello world\n");
    let info = repo.read_commit(commit).unwrap();
    assert_eq!(info.tree_oid, tree);
    assert!(info.parents.is_empty());
    assert_eq!(info.message, "snapshot");
    assert!(info.author.contains("Test User"));
}

#[test]
fn commit_without_identity_uses_bot_signature() {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]);
    let repo = GixRepo::open_at(dir.path()).unwrap();
    let (commit, _) = commit_single_file(&repo, "f", b"f");
    let info = repo.read_commit(commit).unwrap();
    assert!(info.committer.contains("Round-trip Bot"), "{}", info.committer);
}

#[test]
fn ref_writes_without_identity_log_as_bot() {
    let dir = TempDir::new().unwrap();
    git(dir.path(), &["init", "-q"]);
    let repo = GixRepo::open_at(dir.path()).unwrap();
    let (first, _) = commit_single_file(&repo, "f", b"1");
    let (second, _) = commit_single_file(&repo, "f", b"2");

    repo.update_ref(&pristine(), first, Some(GitOid::ZERO)).unwrap();
    repo.update_ref(&pristine(), second, Some(first)).unwrap();
    let generation = RefName::new("refs/speakeasy/gen/run-1").unwrap();
    repo.write_ref(&generation, second, "publish").unwrap();
    assert_eq!(repo.read_ref(&pristine()).unwrap(), Some(second));

    let reflog =
        std::fs::read_to_string(dir.path().join(".git/logs/refs/heads/sdk-pristine")).unwrap();
    assert_eq!(reflog.lines().count(), 2, "{reflog}");
    assert!(
        reflog
            .lines()
            .all(|l| l.contains("Round-trip Bot <bot@roundtrip.invalid>")),
        "{reflog}"
    );
}

// ===========================================================================
// 2. Refs
// ===========================================================================

#[test]
fn read_missing_ref_is_none() {
    let (_dir, repo) = setup_repo();
    assert_eq!(repo.read_ref(&pristine()).unwrap(), None);
}

#[test]
fn update_ref_compare_and_swap() {
    let (_dir, repo) = setup_repo();
    let (first, _) = commit_single_file(&repo, "a", b"1");
    let (second, _) = commit_single_file(&repo, "a", b"2");

    repo.update_ref(&pristine(), first, Some(GitOid::ZERO)).unwrap();
    assert_eq!(repo.read_ref(&pristine()).unwrap(), Some(first));

    repo.update_ref(&pristine(), second, Some(first)).unwrap();
    assert_eq!(repo.read_ref(&pristine()).unwrap(), Some(second));
}

#[test]
fn update_ref_with_stale_expectation_conflicts() {
    let (_dir, repo) = setup_repo();
    let (first, _) = commit_single_file(&repo, "a", b"1");
    let (second, _) = commit_single_file(&repo, "a", b"2");
    repo.write_ref(&pristine(), second, "setup").unwrap();

    let err = repo.update_ref(&pristine(), first, Some(first)).unwrap_err();
    assert!(err.is_ref_conflict(), "unexpected error: {err}");
    assert_eq!(repo.read_ref(&pristine()).unwrap(), Some(second));
}

#[test]
fn must_not_exist_conflicts_when_ref_exists() {
    let (_dir, repo) = setup_repo();
    let (first, _) = commit_single_file(&repo, "a", b"1");
    let (second, _) = commit_single_file(&repo, "a", b"2");
    repo.write_ref(&pristine(), first, "setup").unwrap();
    let err = repo
        .atomic_ref_update(&[RefEdit {
            name: pristine(),
            new_oid: second,
            expected_old_oid: GitOid::ZERO,
        }])
        .unwrap_err();
    assert!(err.is_ref_conflict(), "unexpected error: {err}");
    assert_eq!(repo.read_ref(&pristine()).unwrap(), Some(first));
}

#[test]
fn failed_transaction_leaves_every_ref_untouched() {
    let (_dir, repo) = setup_repo();
    let (first, _) = commit_single_file(&repo, "a", b"1");
    let (second, _) = commit_single_file(&repo, "a", b"2");
    let generation = RefName::new("refs/speakeasy/gen/run-1").unwrap();
    repo.write_ref(&pristine(), first, "setup").unwrap();

    let err = repo
        .atomic_ref_update(&[
            RefEdit {
                name: generation.clone(),
                new_oid: second,
                expected_old_oid: GitOid::ZERO,
            },
            RefEdit {
                name: pristine(),
                new_oid: second,
                expected_old_oid: second,
            },
        ])
        .unwrap_err();
    assert!(err.is_ref_conflict(), "unexpected error: {err}");
    assert_eq!(repo.read_ref(&generation).unwrap(), None);
    assert_eq!(repo.read_ref(&pristine()).unwrap(), Some(first));
}

#[test]
fn racing_creators_see_one_winner_and_ref_conflicts() {
    const THREADS: usize = 4;

    let (_dir, repo) = setup_repo();
    let commits: Vec<GitOid> = (0..THREADS)
        .map(|i| commit_single_file(&repo, "a", format!("{i}").as_bytes()).0)
        .collect();

    // One handle shared by every thread.
    let results: Vec<Result<(), GitError>> = std::thread::scope(|s| {
        let handles: Vec<_> = commits
            .iter()
            .map(|&commit| {
                let repo = &repo;
                s.spawn(move || repo.update_ref(&pristine(), commit, Some(GitOid::ZERO)))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "{results:?}");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(err.is_ref_conflict(), "unexpected error: {err}");
    }
    let tip = repo.read_ref(&pristine()).unwrap().unwrap();
    assert!(commits.contains(&tip));
}

#[test]
fn list_generation_refs_in_name_order() {
    let (dir, repo) = setup_repo();
    let (commit, _) = commit_single_file(&repo, "a", b"1");
    for id in ["gen-b", "gen-a"] {
        let name = RefName::new(&format!("refs/speakeasy/gen/{id}")).unwrap();
        repo.write_ref(&name, commit, "publish").unwrap();
    }
    let listed = repo.list_refs("refs/speakeasy/gen/").unwrap();
    let names: Vec<_> = listed.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["refs/speakeasy/gen/gen-a", "refs/speakeasy/gen/gen-b"]);

    git(dir.path(), &["update-ref", "-d", listed[0].0.as_str()]);
    assert_eq!(repo.list_refs("refs/speakeasy/gen/").unwrap().len(), 1);
}

// ===========================================================================
// 3. Index conflict stages
// ===========================================================================

#[test]
fn conflict_state_is_reported_both_modified() {
    let (dir, repo) = setup_repo();
    std::fs::write(dir.path().join("pet.go"), "<<<<<<< current\n").unwrap();
    let base = repo.write_blob(b"base\n").unwrap();
    let ours = repo.write_blob(b"ours\n").unwrap();
    let theirs = repo.write_blob(b"theirs\n").unwrap();

    repo.set_conflict_state("pet.go", Some(base), ours, theirs, false)
        .unwrap();

    let status = git(dir.path(), &["status", "--porcelain"]);
    assert!(status.contains("UU pet.go"), "status was: {status}");

    let stages: Vec<_> = repo
        .read_index()
        .unwrap()
        .into_iter()
        .map(|e| (e.path, e.stage, e.oid))
        .collect();
    assert_eq!(
        stages,
        [
            ("pet.go".to_owned(), 1, base),
            ("pet.go".to_owned(), 2, ours),
            ("pet.go".to_owned(), 3, theirs),
        ]
    );
    assert_eq!(repo.unmerged_paths().unwrap(), ["pet.go"]);
}

#[test]
fn conflict_state_without_base_is_both_added() {
    let (dir, repo) = setup_repo();
    std::fs::create_dir_all(dir.path().join("sdk")).unwrap();
    std::fs::write(dir.path().join("sdk/new.go"), "x").unwrap();
    let ours = repo.write_blob(b"ours\n").unwrap();
    let theirs = repo.write_blob(b"theirs\n").unwrap();

    repo.set_conflict_state("sdk/new.go", None, ours, theirs, true)
        .unwrap();

    let status = git(dir.path(), &["status", "--porcelain"]);
    assert!(status.contains("AA sdk/new.go"), "status was: {status}");
    let entries = repo.read_index().unwrap();
    assert!(entries.iter().all(|e| e.mode == EntryMode::BlobExecutable));
    assert_eq!(entries.len(), 2);
}

#[test]
fn conflict_state_replaces_resolved_entry() {
    let (dir, repo) = setup_repo();
    std::fs::write(dir.path().join("keep.txt"), "keep\n").unwrap();
    std::fs::write(dir.path().join("pet.go"), "resolved\n").unwrap();
    git(dir.path(), &["add", "keep.txt", "pet.go"]);

    let ours = repo.write_blob(b"ours\n").unwrap();
    let theirs = repo.write_blob(b"theirs\n").unwrap();
    repo.set_conflict_state("pet.go", None, ours, theirs, false)
        .unwrap();

    let entries = repo.read_index().unwrap();
    assert!(entries.iter().any(|e| e.path == "keep.txt" && e.stage == 0));
    assert!(!entries.iter().any(|e| e.path == "pet.go" && e.stage == 0));
    assert_eq!(repo.unmerged_paths().unwrap(), ["pet.go"]);
}

#[test]
fn conflict_state_rejects_escaping_path() {
    let (_dir, repo) = setup_repo();
    let oid = repo.write_blob(b"x").unwrap();
    assert!(repo.set_conflict_state("../x", None, oid, oid, false).is_err());
}

// ===========================================================================
// 4. Remote
// ===========================================================================

#[test]
fn push_and_fetch_generation_ref() {
    let (dir, repo) = setup_repo();
    let remote_dir = TempDir::new().unwrap();
    git(remote_dir.path(), &["init", "-q", "--bare"]);
    git(
        dir.path(),
        &["remote", "add", "origin", remote_dir.path().to_str().unwrap()],
    );

    let (commit, _) = commit_single_file(&repo, "a", b"1");
    let name = RefName::new("refs/speakeasy/gen/run-1").unwrap();
    repo.write_ref(&name, commit, "publish").unwrap();
    repo.push_ref("origin", "refs/speakeasy/gen/run-1:refs/speakeasy/gen/run-1")
        .unwrap();

    git(dir.path(), &["update-ref", "-d", name.as_str()]);
    repo.fetch_ref("origin", "+refs/speakeasy/gen/run-1:refs/speakeasy/gen/run-1")
        .unwrap();
    assert_eq!(repo.read_ref(&name).unwrap(), Some(commit));
}

#[test]
fn push_to_unknown_remote_fails() {
    let (_dir, repo) = setup_repo();
    let err = repo.push_ref("nowhere", "refs/heads/x:refs/heads/x").unwrap_err();
    assert!(matches!(err, GitError::RemoteFailed { operation: "push", .. }));
}
