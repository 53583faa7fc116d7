mod common;

use std::sync::Arc;

use common::{Fixture, config, go_file};
use roundtrip::diff::parse_blob_hash;
use roundtrip::merge::history::is_missing;
use roundtrip::merge::{GitHistoryProvider, HistoryProvider};
use roundtrip::{BatchOptions, Lockfile, ShadowManager, VirtualFile};
use roundtrip_git::{EntryMode, GitOid, GitRepo, GixRepo, TreeEntry};

fn shadow_for(fx: &Fixture, max_attempts: u32) -> ShadowManager {
    let repo: Arc<dyn GitRepo> = Arc::new(GixRepo::open(fx.root()).unwrap());
    let mut shadow_config = config().shadow;
    shadow_config.max_attempts = max_attempts;
    shadow_config.backoff_ms = 2;
    ShadowManager::new(repo, shadow_config).unwrap()
}

#[test]
fn concurrent_snapshots_never_lose_an_update() {
    const PER_THREAD: usize = 8;

    let fx = Fixture::new();
    std::thread::scope(|s| {
        for worker in 0..2 {
            // Separate handles so each thread races through its own repository view.
            let shadow = shadow_for(&fx, 20);
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let file = VirtualFile::new(format!("w{worker}/f{i}.txt"), format!("{worker}-{i}\n"));
                    shadow.commit_state(&[file]).unwrap();
                }
            });
        }
    });

    let shadow = shadow_for(&fx, 1);
    let files = shadow.pristine_files().unwrap();
    assert_eq!(files.len(), 2 * PER_THREAD, "{files:?}");

    let count = fx.git(&["rev-list", "--count", "refs/heads/sdk-pristine"]);
    assert_eq!(count.trim(), (2 * PER_THREAD).to_string());
}

#[test]
fn creating_an_existing_branch_is_a_ref_conflict() {
    let fx = Fixture::new();
    let shadow = shadow_for(&fx, 2);
    let first = shadow.commit_state(&[VirtualFile::new("a.txt", "a\n")]).unwrap();
    let repo = GixRepo::open(fx.root()).unwrap();
    assert_eq!(repo.read_ref(shadow.branch()).unwrap(), Some(first.commit));

    // An unrelated commit, so the update is not a no-op.
    let other = {
        let blob = repo.write_blob(b"b\n").unwrap();
        let tree = repo
            .write_tree(&[TreeEntry {
                name: "b.txt".to_owned(),
                mode: EntryMode::Blob,
                oid: blob,
            }])
            .unwrap();
        repo.create_commit(tree, &[], "elsewhere").unwrap()
    };
    assert_ne!(other, first.commit);

    let err = repo
        .update_ref(shadow.branch(), other, Some(GitOid::ZERO))
        .unwrap_err();
    assert!(err.is_ref_conflict(), "{err}");
    let err = repo
        .update_ref(shadow.branch(), other, Some(other))
        .unwrap_err();
    assert!(err.is_ref_conflict(), "{err}");
    assert_eq!(repo.read_ref(shadow.branch()).unwrap(), Some(first.commit));
}

#[test]
fn history_distinguishes_missing_blobs_from_wrong_objects() {
    let fx = Fixture::new();
    let shadow = shadow_for(&fx, 1);
    let snapshot = shadow.commit_state(&[VirtualFile::new("a.txt", "a\n")]).unwrap();
    let repo: Arc<dyn GitRepo> = Arc::new(GixRepo::open(fx.root()).unwrap());
    let history = GitHistoryProvider::new(repo);

    let blob = snapshot.blobs["a.txt"].to_string();
    assert_eq!(history.pristine(&blob).unwrap(), b"a\n");

    let err = history
        .pristine("1234567890123456789012345678901234567890")
        .unwrap_err();
    assert!(is_missing(&err), "{err}");

    let err = history.pristine(&snapshot.commit.to_string()).unwrap_err();
    assert!(!is_missing(&err), "{err}");
}

#[test]
fn pristine_history_survives_gc_and_fsck() {
    let fx = Fixture::new();
    let engine = fx.engine();
    let mut lock = Lockfile::default();

    let mut commits = Vec::new();
    for (i, id) in ["gen-1", "gen-2"].iter().enumerate() {
        let opts = BatchOptions {
            generation_id: Some((*id).to_owned()),
            prune: false,
        };
        let report = engine
            .process_batch(
                &[
                    go_file("a.go", "aaaaaaaaaaaa", &format!("v{i}\n")),
                    go_file("models/b.go", "bbbbbbbbbbbb", "b\n"),
                ],
                &mut lock,
                &opts,
            )
            .unwrap();
        commits.push(report.snapshot.commit);
    }

    fx.git(&["gc", "--aggressive", "--prune=now", "-q"]);
    fx.git(&["fsck", "--full", "--strict"]);

    let repo = GixRepo::open(fx.root()).unwrap();
    for commit in &commits {
        assert!(repo.has_object(*commit), "{commit} collected");
    }
    for tracked in lock.tracked_files.values() {
        let hash = tracked.pristine_blob_hash.as_deref().unwrap();
        let oid = parse_blob_hash(hash).unwrap();
        assert!(repo.read_blob(oid).is_ok(), "pristine blob {hash} collected");
    }
    let first = fx.git(&["rev-parse", "refs/speakeasy/gen/gen-1"]);
    assert_eq!(first.trim(), commits[0].to_string());
}
