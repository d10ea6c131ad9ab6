use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

#[test]
fn test_cli_import_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!());
    cmd.arg("import").arg("tests/fixtures/customers.csv");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "نام مشتری,شماره موبایل,مبلغ قسط,موعد قسط,شناسه قسط",
        ))
        // +98 prefix folded to the domestic form
        .stdout(predicate::str::contains("09121234567,500000,2024/05/01,INS-7"))
        .stdout(predicate::str::contains("09127654321,1200000,2024/05/03,INS-8"));

    Ok(())
}

#[test]
fn test_cli_import_missing_columns() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "name,mobile,amount").unwrap();
    writeln!(csv, "Sara,09121234567,500000").unwrap();

    let mut cmd = Command::new(cargo_bin!("settlepay"));
    cmd.arg("import").arg(csv.path());

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("missing required columns"))
        .stderr(predicate::str::contains("شناسه قسط"));
}

#[test]
fn test_cli_history_rejects_bad_phone() {
    let mut cmd = Command::new(cargo_bin!("settlepay"));
    cmd.arg("history").arg("12345");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid mobile number"));
}

#[test]
fn test_cli_customers_empty_report() {
    let mut cmd = Command::new(cargo_bin!("settlepay"));
    cmd.arg("customers");

    cmd.assert().success().stdout(predicate::str::is_empty());
}
