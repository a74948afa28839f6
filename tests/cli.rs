mod common;

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

use common::TestWorkspace;

fn sheet_crud(state: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sheet-crud").expect("binary exists");
    cmd.arg("--workspace").arg(state).env("RUST_LOG", "off");
    cmd
}

/// Registers, probes, and generates the students app; returns the workspace.
fn generated_students() -> TestWorkspace {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("students.csv", &common::students_csv());
    let state = workspace.state_dir();

    sheet_crud(&state)
        .args(["connect", "-n", "Students", "-i", csv.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("students"));
    sheet_crud(&state)
        .args(["probe", "-a", "students", "--save"])
        .assert()
        .success()
        .stdout(contains("PRIMARY").and(contains("FIXED")).and(contains("FREE_TEXT")));
    sheet_crud(&state)
        .args(["generate", "-a", "students"])
        .assert()
        .success()
        .stdout(contains("students v1 ACTIVE: imported 120 of 120 row(s)"));
    workspace
}

#[test]
fn generated_app_opens_on_the_overview() {
    let workspace = generated_students();
    sheet_crud(&workspace.state_dir())
        .args(["app", "-a", "students"])
        .assert()
        .success()
        .stdout(
            contains("Students (v1)")
                .and(contains("[overview]"))
                .and(contains("Total Students"))
                .and(contains("120"))
                .and(contains("[settings]").not()),
        );
}

#[test]
fn add_and_search_persist_across_invocations() {
    let workspace = generated_students();
    let state = workspace.state_dir();

    sheet_crud(&state)
        .args(["app", "-a", "students", "add", "--set", "Name=Zed Shaw", "--set", "Status=Active"])
        .assert()
        .success();
    sheet_crud(&state)
        .args(["app", "-a", "students", "search", "zed"])
        .assert()
        .success()
        .stdout(contains("1 record(s)").and(contains("Zed Shaw")));
    // The search and main page are remembered by the session file.
    sheet_crud(&state)
        .args(["app", "-a", "students", "view"])
        .assert()
        .success()
        .stdout(contains("Search Name: \"zed\"").and(contains("Zed Shaw")));

    sheet_crud(&state).args(["session", "clear"]).assert().success();
    sheet_crud(&state)
        .args(["app", "-a", "students"])
        .assert()
        .success()
        .stdout(contains("Total Students").and(contains("121")));
}

#[test]
fn invalid_fixed_option_is_rejected() {
    let workspace = generated_students();
    sheet_crud(&workspace.state_dir())
        .args(["app", "-a", "students", "add", "--set", "Name=Eve", "--set", "Status=Expelled"])
        .assert()
        .failure()
        .stderr(contains("error:").and(contains("Expelled")));
}

#[test]
fn delete_requires_confirmation() {
    let workspace = generated_students();
    let state = workspace.state_dir();
    sheet_crud(&state)
        .args(["app", "-a", "students", "add", "--set", "Name=Temp", "--set", "Status=Paused"])
        .assert()
        .success();
    sheet_crud(&state)
        .args(["app", "-a", "students", "search", "Temp"])
        .assert()
        .success();

    let list = sheet_crud(&state)
        .args(["app", "-a", "students", "view"])
        .output()
        .expect("run app view");
    let stdout = String::from_utf8_lossy(&list.stdout);
    let id = stdout
        .lines()
        .find(|line| line.contains("Temp") && !line.starts_with("Search"))
        .and_then(|line| line.split_whitespace().next())
        .expect("row for Temp")
        .to_string();

    sheet_crud(&state)
        .args(["app", "-a", "students", "delete", &id[..8]])
        .assert()
        .success()
        .stdout(contains("Re-run with --yes"));
    sheet_crud(&state)
        .args(["app", "-a", "students", "delete", &id, "--yes"])
        .assert()
        .success()
        .stdout(contains("0 record(s)"));
}

#[test]
fn managed_page_lists_distinct_values() {
    let workspace = generated_students();
    let state = workspace.state_dir();
    sheet_crud(&state)
        .args(["map", "-a", "students", "--set", "Status=managed"])
        .assert()
        .success()
        .stdout(contains("MANAGED"));
    sheet_crud(&state)
        .args(["generate", "-a", "students"])
        .assert()
        .success()
        .stdout(contains("students v2 ACTIVE"));
    sheet_crud(&state)
        .args(["app", "-a", "students", "managed", "Status"])
        .assert()
        .success()
        .stdout(contains("Status (3 value(s))").and(contains("Alumni")));
    sheet_crud(&state)
        .args(["app", "-a", "students", "managed", "Notes"])
        .assert()
        .failure()
        .stderr(contains("not a managed column"));
}

#[test]
fn draft_versions_can_be_listed_diffed_and_activated() {
    let workspace = generated_students();
    let state = workspace.state_dir();
    sheet_crud(&state)
        .args(["map", "-a", "students", "--set", "Notes=ignore"])
        .assert()
        .success();
    sheet_crud(&state)
        .args(["generate", "-a", "students", "--draft"])
        .assert()
        .success()
        .stdout(contains("students v2 DRAFT"));

    sheet_crud(&state)
        .args(["specs", "list", "-a", "students"])
        .assert()
        .success()
        .stdout(contains("ACTIVE").and(contains("DRAFT")));
    sheet_crud(&state)
        .args(["specs", "diff", "-a", "students"])
        .assert()
        .success()
        .stdout(contains("--- v1").and(contains("+++ v2")).and(contains("Notes")));
    sheet_crud(&state)
        .args(["specs", "activate", "-a", "students", "--version", "2"])
        .assert()
        .success()
        .stdout(contains("students v2 ACTIVE"));
    sheet_crud(&state)
        .args(["specs", "list", "-a", "students"])
        .assert()
        .success()
        .stdout(contains("ARCHIVED"));
}

#[test]
fn app_without_a_spec_explains_what_to_do() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("books.csv", "Title,Author\nDune,Herbert\n");
    let state = workspace.state_dir();
    sheet_crud(&state)
        .args(["connect", "-n", "Book Club", "-i", csv.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("book-club"));
    sheet_crud(&state)
        .args(["app", "-a", "book-club"])
        .assert()
        .success()
        .stdout(contains("has not been generated yet"));
    sheet_crud(&state)
        .args(["generate", "-a", "book-club"])
        .assert()
        .failure()
        .stderr(contains("no field model yet"));
}

#[test]
fn unknown_app_is_an_error() {
    let workspace = TestWorkspace::new();
    sheet_crud(&workspace.state_dir())
        .args(["preview", "-a", "ghost"])
        .assert()
        .failure()
        .stderr(contains("ghost"));
}

#[test]
fn preview_shows_the_first_rows() {
    let workspace = TestWorkspace::new();
    let csv = workspace.write("students.csv", &common::students_csv());
    let state = workspace.state_dir();
    sheet_crud(&state)
        .args(["connect", "-n", "Students", "-i", csv.to_str().unwrap()])
        .assert()
        .success();
    sheet_crud(&state)
        .args(["preview", "-a", "students", "--rows", "2"])
        .assert()
        .success()
        .stdout(
            contains("Name")
                .and(contains("Student 0"))
                .and(contains("Student 1"))
                .and(contains("Student 2").not()),
        );
}

#[test]
fn google_sheet_connect_prints_the_query_url() {
    let workspace = TestWorkspace::new();
    sheet_crud(&workspace.state_dir())
        .args([
            "connect",
            "-n",
            "Roster",
            "-i",
            "https://docs.google.com/spreadsheets/d/1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789/edit#gid=0",
        ])
        .assert()
        .success()
        .stdout(contains("gviz/tq?tqx=out%3Ajson").and(contains("roster")));
}

#[test]
fn page_option_reaches_records_past_the_first_page() {
    let workspace = TestWorkspace::new();
    let mut csv = String::from("Name,Status\n");
    for i in 0..150 {
        csv.push_str(&format!("Member {i:03},{}\n", ["Active", "Alumni"][i % 2]));
    }
    let csv = workspace.write("members.csv", &csv);
    let state = workspace.state_dir();
    sheet_crud(&state)
        .args(["connect", "-n", "Members", "-i", csv.to_str().unwrap()])
        .assert()
        .success();
    sheet_crud(&state)
        .args(["probe", "-a", "members", "--save"])
        .assert()
        .success();
    sheet_crud(&state)
        .args(["generate", "-a", "members"])
        .assert()
        .success()
        .stdout(contains("imported 150 of 150"));

    let list = sheet_crud(&state)
        .args(["app", "-a", "members", "--page", "2", "nav", "main"])
        .output()
        .expect("run app nav");
    let stdout = String::from_utf8_lossy(&list.stdout);
    assert!(stdout.contains("Page 2 of 2"));
    let id = stdout
        .lines()
        .find(|line| line.contains("Member 120"))
        .and_then(|line| line.split_whitespace().next())
        .expect("row for Member 120")
        .to_string();

    sheet_crud(&state)
        .args(["app", "-a", "members", "edit", &id, "--set", "Name=Member Renamed"])
        .assert()
        .success();
    sheet_crud(&state)
        .args(["app", "-a", "members", "search", "Renamed"])
        .assert()
        .success()
        .stdout(contains("1 record(s)").and(contains("Member Renamed")));
}
