//! Integration tests for the `tally` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SCHEMA_SQL: &str = r#"
CREATE TABLE "Categories" ("CategoryID" INTEGER PRIMARY KEY, "CategoryName" TEXT NOT NULL);
CREATE TABLE "Products" ("ProductID" INTEGER PRIMARY KEY, "ProductName" TEXT NOT NULL,
                         "CategoryID" INTEGER, "UnitPrice" REAL);
CREATE TABLE "Customers" ("CustomerID" TEXT PRIMARY KEY, "CompanyName" TEXT NOT NULL, "Country" TEXT);
CREATE TABLE "Orders" ("OrderID" INTEGER PRIMARY KEY, "CustomerID" TEXT, "OrderDate" TEXT);
CREATE TABLE "Order Details" ("OrderID" INTEGER, "ProductID" INTEGER, "UnitPrice" REAL,
                              "Quantity" INTEGER, "Discount" REAL);

INSERT INTO "Categories" VALUES (1, 'Beverages'), (2, 'Condiments');
INSERT INTO "Products" VALUES (1, 'Chai', 1, 18.0), (2, 'Aniseed Syrup', 2, 10.0);
INSERT INTO "Customers" VALUES ('ALFKI', 'Alfreds Futterkiste', 'Germany');
INSERT INTO "Orders" VALUES (10248, 'ALFKI', '1997-07-04 00:00:00'),
                            (10249, 'ALFKI', '1997-07-05 00:00:00');
INSERT INTO "Order Details" VALUES (10248, 1, 10.0, 2, 0.0),
                                   (10249, 2, 5.0, 1, 0.1);
"#;

/// Helper to lay out a database, a corpus and an empty home directory
fn init_workspace(temp_dir: &TempDir) {
    let root = temp_dir.path();
    fs::create_dir_all(root.join("data")).unwrap();
    Connection::open(root.join("data/northwind.sqlite")).unwrap().execute_batch(SCHEMA_SQL).unwrap();

    fs::create_dir_all(root.join("docs")).unwrap();
    fs::write(
        root.join("docs/product_policy.md"),
        "# Returns & Policy\n\n## Returns\n- Unopened Beverages: 14 days return window.\n",
    )
    .unwrap();

    fs::create_dir_all(root.join("home")).unwrap();
}

/// A `tally` command isolated from the caller's configuration
fn tally(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tally").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path().join("home"))
        .env("TALLY_MODEL", "scripted:fixture")
        .env("TALLY_AS_OF", "1998-01-15")
        .env_remove("TALLY_DB")
        .env_remove("TALLY_DOCS")
        .env_remove("TALLY_EXEMPLARS")
        .env_remove("TALLY_CONCURRENCY")
        .args(["--log-level", "error"]);
    cmd
}

fn write(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
}

#[test]
fn test_help_lists_subcommands() {
    let mut cmd = Command::cargo_bin("tally").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("optimize"))
        .stdout(predicate::str::contains("schema"));
}

#[test]
fn test_ask_prints_record_json() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);

    tally(&temp_dir)
        .args(["ask", "What was the average order value in summer 1997?", "--format-hint", "float"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"final_answer\": 12.25"))
        .stdout(predicate::str::contains("\"mode\": \"sql\""));
}

#[test]
fn test_ask_doc_question_cites_chunk() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);

    tally(&temp_dir)
        .args([
            "ask",
            "What is the return window for unopened beverages according to the returns policy?",
            "--format-hint",
            "int",
            "--id",
            "rag_returns",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"id\": \"rag_returns\""))
        .stdout(predicate::str::contains("product_policy::chunk"));
}

#[test]
fn test_run_writes_one_record_per_line() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);
    let batch = temp_dir.path().join("questions.jsonl");
    write(
        &batch,
        concat!(
            r#"{"id": "sql_aov", "question": "What was the average order value in summer 1997?", "format_hint": "float"}"#,
            "\n",
            "not json\n",
            r#"{"id": "rag_returns", "question": "What is the return window for unopened beverages according to the returns policy?", "format_hint": "int"}"#,
            "\n",
        ),
    );

    tally(&temp_dir)
        .args(["run", "--batch", "questions.jsonl", "--out", "out/answers.jsonl", "-j", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 questions"))
        .stdout(predicate::str::contains("answers.jsonl"));

    let output = fs::read_to_string(temp_dir.path().join("out/answers.jsonl")).unwrap();
    let lines: Vec<serde_json::Value> = output.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["id"], "sql_aov");
    assert_eq!(lines[1]["id"], "q_2");
    assert!(lines[1]["error"].as_str().unwrap().contains("malformed JSON"));
    assert_eq!(lines[2]["id"], "rag_returns");
    assert_eq!(lines[2]["final_answer"], 14);
}

#[test]
fn test_run_missing_batch_file() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);

    tally(&temp_dir)
        .args(["run", "--batch", "missing.jsonl", "--out", "answers.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read questions"));
}

#[test]
fn test_schema_describes_tables() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);

    tally(&temp_dir)
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("Table: \"Order Details\""))
        .stdout(predicate::str::contains("Quantity"));
}

#[test]
fn test_missing_database_fails_to_start() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);

    tally(&temp_dir)
        .args(["--db", "nowhere.sqlite", "schema"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to start pipeline"));
}

#[test]
fn test_invalid_concurrency_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);

    tally(&temp_dir)
        .args(["-j", "0", "schema"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_local_config_file_is_honoured() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);
    fs::rename(temp_dir.path().join("data/northwind.sqlite"), temp_dir.path().join("nw.sqlite")).unwrap();
    write(&temp_dir.path().join(".tallyrc"), "database_path = \"nw.sqlite\"\n");

    tally(&temp_dir).arg("schema").assert().success().stdout(predicate::str::contains("Table: \"Orders\""));
}

#[test]
fn test_optimize_writes_exemplar_set() {
    let temp_dir = TempDir::new().unwrap();
    init_workspace(&temp_dir);
    write(
        &temp_dir.path().join("train.jsonl"),
        concat!(
            r#"{"question": "How many orders were placed?", "sql": "SELECT COUNT(*) FROM \"Orders\""}"#,
            "\n",
            r#"{"question": "Units sold?", "sql": "SELECT SUM(Qty) FROM \"Order Details\""}"#,
            "\n",
        ),
    );
    write(
        &temp_dir.path().join("validation.jsonl"),
        concat!(r#"{"question": "Total revenue in 1997?"}"#, "\n"),
    );

    tally(&temp_dir)
        .args(["optimize", "--train", "train.jsonl", "--validation", "validation.jsonl", "--out", "exemplars.json", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"kept_exemplars\": 1"))
        .stdout(predicate::str::contains("\"rejected_exemplars\": 1"));

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(temp_dir.path().join("exemplars.json")).unwrap()).unwrap();
    assert!(written["version"].is_string());
}
