mod common;

use std::fs;

use chrono::NaiveDate;

use common::{MockRemote, MockVcs, ids, settings_in, utf8};
use openneuro_mirror::domain::FetchOutcome;
use openneuro_mirror::fetch::FetchPipeline;
use openneuro_mirror::runlog::RunLogs;

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

#[test]
fn dataset_missing_on_remote_is_logged_as_failed_install() {
    let temp = tempfile::tempdir().unwrap();
    let settings = settings_in(&utf8(temp.path()));
    let vcs = MockVcs::default();
    let pipeline = FetchPipeline::new(
        MockRemote::missing(&["ds002"]),
        &vcs,
        settings.raw_root.clone(),
    );

    let report = pipeline.fetch_all(&ids(&["ds002"]));
    assert_eq!(report.records[0].outcome, FetchOutcome::RemoteMissing);
    assert!(report.surviving.is_empty());
    assert!(vcs.calls().is_empty());

    let logs = RunLogs::new(settings.logs_root(), run_date());
    let written = logs.write_failures(&report).unwrap();
    assert_eq!(written, vec![logs.failed_install_path()]);
    assert!(
        logs.failed_install_path()
            .as_str()
            .ends_with("logs/download_get/failed_install_2024-03-01")
    );
    let content = fs::read_to_string(logs.failed_install_path().as_std_path()).unwrap();
    assert_eq!(content, "ds002");
    assert!(!logs.failed_get_path().as_std_path().exists());
}

#[test]
fn failed_update_falls_back_to_fresh_install() {
    let temp = tempfile::tempdir().unwrap();
    let settings = settings_in(&utf8(temp.path()));
    let existing = settings.raw_root.join("ds003");
    fs::create_dir_all(existing.join("sub-01/anat").as_std_path()).unwrap();
    fs::write(existing.join("stale.txt").as_std_path(), "old").unwrap();

    let vcs = MockVcs {
        fail_update: ["ds003".to_string()].into_iter().collect(),
        ..MockVcs::default()
    };
    let pipeline = FetchPipeline::new(MockRemote::default(), &vcs, settings.raw_root.clone());

    let record = pipeline.install_or_update(&ids(&["ds003"])[0]);
    assert_eq!(record.outcome, FetchOutcome::FetchedFresh);
    assert_eq!(
        vcs.calls(),
        vec![
            "update ds003".to_string(),
            "install ds003".to_string(),
            "get ds003".to_string(),
        ]
    );
    assert!(!existing.join("stale.txt").as_std_path().exists());
}

#[test]
fn successful_update_keeps_the_mirror() {
    let temp = tempfile::tempdir().unwrap();
    let settings = settings_in(&utf8(temp.path()));
    let anat = settings.raw_root.join("ds004/sub-02/ses-1/anat");
    fs::create_dir_all(anat.as_std_path()).unwrap();
    fs::write(anat.join("sub-02_ses-1_T1w.nii.gz").as_std_path(), b"").unwrap();

    let vcs = MockVcs::default();
    let pipeline = FetchPipeline::new(MockRemote::default(), &vcs, settings.raw_root.clone());

    let record = pipeline.install_or_update(&ids(&["ds004"])[0]);
    assert_eq!(record.outcome, FetchOutcome::FetchedUpdate);
    assert_eq!(vcs.calls(), vec!["update ds004".to_string(), "get ds004".to_string()]);
}

#[test]
fn install_failure_skips_retrieval() {
    let temp = tempfile::tempdir().unwrap();
    let settings = settings_in(&utf8(temp.path()));
    let vcs = MockVcs {
        fail_install: ["ds005".to_string()].into_iter().collect(),
        ..MockVcs::default()
    };
    let pipeline = FetchPipeline::new(MockRemote::default(), &vcs, settings.raw_root.clone());

    let record = pipeline.install_or_update(&ids(&["ds005"])[0]);
    assert_eq!(record.outcome, FetchOutcome::InstallFailed);
    assert!(record.detail.unwrap().contains("clone failed"));
    assert_eq!(vcs.calls(), vec!["install ds005".to_string()]);
}

#[test]
fn retrieval_failure_keeps_the_installed_mirror() {
    let temp = tempfile::tempdir().unwrap();
    let settings = settings_in(&utf8(temp.path()));
    let vcs = MockVcs {
        fail_get: ["ds006".to_string()].into_iter().collect(),
        ..MockVcs::default()
    };
    let pipeline = FetchPipeline::new(MockRemote::default(), &vcs, settings.raw_root.clone());

    let report = pipeline.fetch_all(&ids(&["ds006"]));
    assert_eq!(report.records[0].outcome, FetchOutcome::RetrieveFailed);
    assert_eq!(report.failed_get(), ids(&["ds006"]));
    assert!(report.failed_install().is_empty());
    assert!(settings.raw_root.join("ds006").as_std_path().is_dir());
}

#[test]
fn unreachable_remote_counts_as_install_failure() {
    let temp = tempfile::tempdir().unwrap();
    let settings = settings_in(&utf8(temp.path()));
    let remote = MockRemote {
        unreachable: ["ds007".to_string()].into_iter().collect(),
        ..MockRemote::default()
    };
    let vcs = MockVcs::default();
    let pipeline = FetchPipeline::new(remote, &vcs, settings.raw_root.clone());

    let record = pipeline.install_or_update(&ids(&["ds007"])[0]);
    assert_eq!(record.outcome, FetchOutcome::InstallFailed);
    assert!(vcs.calls().is_empty());
}

#[test]
fn one_failure_does_not_stop_the_batch() {
    let temp = tempfile::tempdir().unwrap();
    let settings = settings_in(&utf8(temp.path()));
    let vcs = MockVcs {
        fail_install: ["ds011".to_string()].into_iter().collect(),
        fail_get: ["ds012".to_string()].into_iter().collect(),
        ..MockVcs::default()
    };
    let pipeline = FetchPipeline::new(
        MockRemote::missing(&["ds010"]),
        &vcs,
        settings.raw_root.clone(),
    );

    let report = pipeline.fetch_all(&ids(&["ds010", "ds011", "ds012", "ds013", "ds014"]));

    let outcomes: Vec<_> = report.records.iter().map(|record| record.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            FetchOutcome::RemoteMissing,
            FetchOutcome::InstallFailed,
            FetchOutcome::RetrieveFailed,
            FetchOutcome::FetchedFresh,
            FetchOutcome::FetchedFresh,
        ]
    );
    assert_eq!(report.surviving, ids(&["ds013", "ds014"]));
    assert_eq!(report.failed_install(), ids(&["ds010", "ds011"]));
    assert_eq!(report.failed_get(), ids(&["ds012"]));

    let logs = RunLogs::new(settings.logs_root(), run_date());
    logs.write_failures(&report).unwrap();
    assert_eq!(
        fs::read_to_string(logs.failed_install_path().as_std_path()).unwrap(),
        "ds010\nds011"
    );
    assert_eq!(
        fs::read_to_string(logs.failed_get_path().as_std_path()).unwrap(),
        "ds012"
    );
}
