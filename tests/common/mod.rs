//! Shared helpers for rte integration tests.
//!
//! Every test gets its own throwaway git repository; the generated output
//! lives in `<repo>/sdk/` so index paths carry a prefix.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use roundtrip::{Engine, RteConfig, VirtualFile};
use tempfile::TempDir;

pub const OUT: &str = "sdk";

/// A repository with one commit and an empty `sdk/` directory.
pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        git_ok(dir.path(), &["init", "-q", "-b", "main"]);
        git_ok(dir.path(), &["config", "user.email", "test@test.com"]);
        git_ok(dir.path(), &["config", "user.name", "Test User"]);
        git_ok(dir.path(), &["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.path().join("README.md"), "# test repo\n").unwrap();
        git_ok(dir.path(), &["add", "README.md"]);
        git_ok(dir.path(), &["commit", "-q", "-m", "initial"]);
        std::fs::create_dir_all(dir.path().join(OUT)).unwrap();
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn out(&self) -> PathBuf {
        self.dir.path().join(OUT)
    }

    pub fn engine(&self) -> Engine {
        Engine::open(&self.out(), &config()).expect("engine")
    }

    pub fn write(&self, rel: &str, content: &str) {
        let path = self.out().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.out().join(rel))
            .unwrap_or_else(|e| panic!("reading {rel}: {e}"))
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.out().join(rel).exists()
    }

    pub fn git(&self, args: &[&str]) -> String {
        git_ok(self.root(), args)
    }
}

/// Config with no remote, so nothing tries to reach the network.
pub fn config() -> RteConfig {
    let mut config = RteConfig::default();
    config.shadow.remote = None;
    config
}

/// Generated Go file with an identity header.
pub fn go_file(path: &str, id: &str, body: &str) -> VirtualFile {
    VirtualFile::new(path, format!("// @generated-id: {id}\npackage sdk\n\n{body}"))
}

pub fn git(dir: &Path, args: &[&str]) -> Output {
    Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git")
}

/// Run git and assert it succeeds. Returns stdout.
pub fn git_ok(dir: &Path, args: &[&str]) -> String {
    let out = git(dir, args);
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

pub fn rte_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rte"))
        .args(args)
        .current_dir(dir)
        .env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
        .env_remove("RTE_OUT_DIR")
        .output()
        .expect("failed to execute rte")
}
