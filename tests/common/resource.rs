//! Test database resources.
//!
//! SQLite databases are files under the cargo target tmp dir, one per queue, removed when the
//! test binary exits. PostgreSQL comes from `ROWQ_TEST_POSTGRES_DSN`; tests needing it are
//! skipped when the variable is unset.

use once_cell::sync::Lazy;
use std::path::PathBuf;
use std::sync::Mutex;

pub const POSTGRES_DSN_ENV: &str = "ROWQ_TEST_POSTGRES_DSN";

/// Files created by this test binary.
static CREATED_FILES: Lazy<Mutex<Vec<PathBuf>>> = Lazy::new(|| Mutex::new(Vec::new()));

fn temp_dir() -> PathBuf {
    std::env::var("CARGO_TARGET_TMPDIR")
        .map(PathBuf::from)
        .or_else(|_| std::env::current_dir().map(|cwd| cwd.join("target").join("tmp")))
        .unwrap_or_else(|_| std::env::temp_dir())
}

/// DSN of a fresh SQLite database file.
pub fn sqlite_dsn() -> String {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).expect("Failed to create test tmp dir");

    let path = dir.join(format!("rowq_{}.db", uuid::Uuid::new_v4().simple()));
    CREATED_FILES.lock().unwrap().push(path.clone());
    format!("sqlite://{}", path.display())
}

pub fn postgres_dsn() -> Option<String> {
    std::env::var(POSTGRES_DSN_ENV).ok()
}

/// Remove every database file (and its WAL side files) created by this binary.
pub fn cleanup() {
    let files = match CREATED_FILES.lock() {
        Ok(mut files) => std::mem::take(&mut *files),
        Err(_) => return,
    };
    for path in files {
        for suffix in ["", "-wal", "-shm"] {
            let mut p = path.clone().into_os_string();
            p.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(p));
        }
    }
}
