use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let mut cmd = Command::new(cargo_bin!("settlepay"));
    cmd.arg("import")
        .arg("tests/fixtures/customers.csv")
        .arg("--db-path")
        .arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."))
        .stdout(predicate::str::contains("INS-7"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("settlepay"));
    cmd.arg("import")
        .arg("tests/fixtures/customers.csv")
        .arg("--db-path")
        .arg(&db_path)
        .arg("--encryption-key")
        .arg("11".repeat(32));

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("WARNING").not());
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_requires_encryption_key() {
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::new(cargo_bin!("settlepay"));
    cmd.env_remove("SETTLEPAY_ENCRYPTION_KEY")
        .arg("customers")
        .arg("--db-path")
        .arg(dir.path().join("test_db"));

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("--encryption-key"));
}
