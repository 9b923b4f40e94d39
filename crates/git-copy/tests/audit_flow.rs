//! Audit engine tests against real repositories.

mod common;

use common::{git_available, TestRepo};
use git_copy::audit::{audit_bare_repo, AuditOptions, FindingKind};

#[test]
fn clean_repository_passes() {
    if !git_available() {
        return;
    }
    let repo = TestRepo::init();
    repo.write("a.txt", "nothing secret here\n");
    repo.commit_all("add file");

    let opts = AuditOptions {
        forbidden_strings: vec!["obinnaokechukwu".into()],
        ..AuditOptions::default()
    };
    let report = audit_bare_repo(&repo.path, &opts).expect("audit");
    assert!(report.passed(), "findings: {:?}", report.findings);
}

#[test]
fn finds_forbidden_path_anywhere_in_history() {
    if !git_available() {
        return;
    }
    let repo = TestRepo::init();
    repo.write(".env", "SECRET=x\n");
    repo.commit_all("add env");
    repo.remove(".env");
    repo.commit_all("remove env");

    let report = audit_bare_repo(&repo.path, &AuditOptions::default()).expect("audit");
    assert!(!report.passed());
    assert!(report
        .findings
        .iter()
        .any(|f| f.kind == FindingKind::PathHistory && f.path == ".env"));
}

#[test]
fn finds_forbidden_string_in_reachable_blob() {
    if !git_available() {
        return;
    }
    let repo = TestRepo::init();
    repo.write("notes.md", "ping Obinnaokechukwu about this\n");
    repo.commit_all("add notes");

    let opts = AuditOptions {
        forbidden_strings: vec!["obinnaokechukwu".into()],
        ..AuditOptions::default()
    };
    let report = audit_bare_repo(&repo.path, &opts).expect("audit");
    let hit = report
        .findings
        .iter()
        .find(|f| f.kind == FindingKind::StringHit)
        .expect("expected a string hit");
    assert_eq!(hit.path, "notes.md");
}

#[test]
fn case_sensitive_scan_misses_differently_cased_hit() {
    if !git_available() {
        return;
    }
    let repo = TestRepo::init();
    repo.write("notes.md", "ping Obinnaokechukwu about this\n");
    repo.commit_all("add notes");

    let opts = AuditOptions {
        forbidden_strings: vec!["obinnaokechukwu".into()],
        case_insensitive: false,
        forbidden_paths: Vec::new(),
        ..AuditOptions::default()
    };
    let report = audit_bare_repo(&repo.path, &opts).expect("audit");
    assert!(
        !report
            .findings
            .iter()
            .any(|f| f.kind == FindingKind::StringHit),
        "case-sensitive scan should not match: {:?}",
        report.findings
    );
}

#[test]
fn detects_replace_history_mismatch() {
    if !git_available() {
        return;
    }
    let repo = TestRepo::init();
    repo.write("LICENSE", "Copyright 2020\n");
    repo.commit_all("add license");
    repo.write("LICENSE", "Copyright 2024\n");
    repo.commit_all("bump license");

    let opts = AuditOptions {
        forbidden_paths: Vec::new(),
        replace_history_files: vec!["LICENSE".into()],
        ..AuditOptions::default()
    };
    let report = audit_bare_repo(&repo.path, &opts).expect("audit");
    assert!(report
        .findings
        .iter()
        .any(|f| f.kind == FindingKind::ReplaceHistoryMismatch && f.path == "LICENSE"));
}

#[test]
fn constant_collapsed_file_passes_mismatch_check() {
    if !git_available() {
        return;
    }
    let repo = TestRepo::init();
    repo.write("LICENSE", "Copyright 2024\n");
    repo.commit_all("add license");
    repo.write("other.txt", "unrelated\n");
    repo.commit_all("add other");

    let opts = AuditOptions {
        forbidden_paths: Vec::new(),
        replace_history_files: vec!["LICENSE".into()],
        ..AuditOptions::default()
    };
    let report = audit_bare_repo(&repo.path, &opts).expect("audit");
    assert!(report.passed(), "findings: {:?}", report.findings);
}

#[test]
fn size_cap_skips_large_blobs() {
    if !git_available() {
        return;
    }
    let repo = TestRepo::init();
    let big = format!("{}obinnaokechukwu\n", "x".repeat(4096));
    repo.write("big.bin", &big);
    repo.commit_all("add big blob");

    let opts = AuditOptions {
        forbidden_strings: vec!["obinnaokechukwu".into()],
        forbidden_paths: Vec::new(),
        max_blob_bytes: 1024,
        ..AuditOptions::default()
    };
    let report = audit_bare_repo(&repo.path, &opts).expect("audit");
    assert!(report.passed(), "findings: {:?}", report.findings);
}

#[test]
fn hit_cap_bounds_findings_per_category() {
    if !git_available() {
        return;
    }
    let repo = TestRepo::init();
    for i in 0..5 {
        repo.write(
            &format!("file{i}.txt"),
            &format!("obinnaokechukwu was here in file {i}\n"),
        );
    }
    repo.commit_all("add files");

    let opts = AuditOptions {
        forbidden_strings: vec!["obinnaokechukwu".into()],
        forbidden_paths: Vec::new(),
        max_hits: 2,
        ..AuditOptions::default()
    };
    let report = audit_bare_repo(&repo.path, &opts).expect("audit");
    let hits = report
        .findings
        .iter()
        .filter(|f| f.kind == FindingKind::StringHit)
        .count();
    assert_eq!(hits, 2);
}
