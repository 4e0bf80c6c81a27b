//! Config loading, validation error messages, and YAML/JSON document handling.

use assert_fs::prelude::*;
use artisync_core::{config, types::JobKey, ConfigError};
use predicates::prelude::predicate;

const ONE_JOB: &str = r#"[
  {
    "owner": "acme",
    "repo": "site",
    "artifactName": "dist",
    "excludes": ["config\\.json", "uploads/.*"],
    "deployPath": "/srv/www/site"
  }
]"#;

const ACME_SECRET: &str = r#"[{"owner": "acme", "token": "ghp_example"}]"#;

fn root_with(jobs: &str, secrets: &str) -> assert_fs::TempDir {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("job.json").write_str(jobs).expect("write jobs");
    root.child("secret.json").write_str(secrets).expect("write secrets");
    root
}

// ---------------------------------------------------------------------------
// 1. Happy path
// ---------------------------------------------------------------------------

#[test]
fn loads_jobs_and_tokens() {
    let root = root_with(ONE_JOB, ACME_SECRET);
    let config = config::load_at(root.path()).expect("load");

    assert_eq!(config.jobs.len(), 1);
    let job = &config.jobs[0];
    assert_eq!(job.key(), JobKey::from("acme.site.dist"));
    assert_eq!(job.excludes, vec!["config\\.json", "uploads/.*"]);
    assert_eq!(
        config.secrets.token_for("acme").map(|t| t.expose()),
        Some("ghp_example")
    );
}

#[test]
fn yaml_documents_are_accepted() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("job.yaml")
        .write_str(
            "- owner: acme\n  repo: site\n  artifactName: dist\n  deployPath: /srv/www/site\n",
        )
        .expect("write jobs");
    root.child("secret.yml")
        .write_str("- owner: acme\n  token: ghp_example\n")
        .expect("write secrets");

    let config = config::load_at(root.path()).expect("load");
    assert_eq!(config.jobs[0].key(), JobKey::from("acme.site.dist"));
    assert!(config.jobs[0].excludes.is_empty());
}

#[test]
fn loading_does_not_write_anything() {
    let root = root_with(ONE_JOB, ACME_SECRET);
    config::load_at(root.path()).expect("load");
    root.child("ledger.json").assert(predicate::path::missing());
    root.child("artifacts").assert(predicate::path::missing());
}

// ---------------------------------------------------------------------------
// 2. Fatal configuration errors
// ---------------------------------------------------------------------------

#[test]
fn missing_secret_document_is_not_found() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("job.json").write_str("[]").expect("write");

    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("secret.json"));
}

#[test]
fn corrupt_json_reports_parse_error_with_path() {
    let root = root_with("[{ not json", ACME_SECRET);

    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Json { .. }), "got: {err}");
    assert!(err.to_string().contains("job.json"));
}

#[test]
fn corrupt_yaml_reports_parse_error_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("job.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");
    root.child("secret.json").write_str("[]").expect("write");

    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Yaml { .. }), "got: {err}");
    assert!(err.to_string().contains("job.yaml"));
}

#[test]
fn job_without_token_is_rejected() {
    let root = root_with(ONE_JOB, r#"[{"owner": "someone-else", "token": "x"}]"#);

    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }), "got: {err}");
    assert!(err.to_string().contains("no token for owner 'acme'"));
}

#[test]
fn empty_token_is_rejected() {
    let root = root_with(ONE_JOB, r#"[{"owner": "acme", "token": ""}]"#);
    let err = config::load_at(root.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }), "got: {err}");
}

#[test]
fn duplicate_jobs_are_rejected() {
    let jobs = r#"[
      {"owner":"acme","repo":"site","artifactName":"dist","deployPath":"/a"},
      {"owner":"acme","repo":"site","artifactName":"dist","deployPath":"/b"}
    ]"#;
    let root = root_with(jobs, ACME_SECRET);

    let err = config::load_at(root.path()).unwrap_err();
    assert!(err.to_string().contains("duplicate job acme.site.dist"), "got: {err}");
}

#[test]
fn blank_identity_fields_are_rejected() {
    let jobs = r#"[{"owner":"acme","repo":"  ","artifactName":"dist","deployPath":"/a"}]"#;
    let root = root_with(jobs, ACME_SECRET);

    let err = config::load_at(root.path()).unwrap_err();
    assert!(err.to_string().contains("`repo` must not be empty"), "got: {err}");
}

#[test]
fn empty_deploy_path_is_rejected() {
    let jobs = r#"[{"owner":"acme","repo":"site","artifactName":"dist","deployPath":""}]"#;
    let root = root_with(jobs, ACME_SECRET);

    let err = config::load_at(root.path()).unwrap_err();
    assert!(err.to_string().contains("deployPath"), "got: {err}");
}
