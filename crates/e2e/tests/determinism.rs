//! Identical inputs must give identical run ids and byte-identical
//! canonical artifacts, regardless of where or when the run happens.

use std::path::{Path, PathBuf};

use silentcheck_core::artifacts::ArtifactKind;
use silentcheck_core::integrity::IntegrityManifest;
use silentcheck_e2e::runner::analyze_scenario;
use silentcheck_e2e::ScenarioSpec;
use tempfile::TempDir;

fn load(name: &str) -> ScenarioSpec {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(format!("{}.yaml", name));
    ScenarioSpec::from_file(&path).unwrap()
}

fn read(dir: &Path, kind: ArtifactKind) -> Vec<u8> {
    std::fs::read(dir.join(kind.file_name())).unwrap()
}

#[test]
fn canonical_artifacts_are_byte_identical_across_runs() {
    let spec = load("mixed-results");
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    let first = analyze_scenario(&spec, a.path()).unwrap();
    let second = analyze_scenario(&spec, b.path()).unwrap();

    assert_eq!(first.run_id, second.run_id);
    for kind in ArtifactKind::ALL.iter().filter(|k| k.is_hashed()) {
        if !first.run_dir.join(kind.file_name()).exists() {
            continue;
        }
        assert_eq!(
            read(&first.run_dir, *kind),
            read(&second.run_dir, *kind),
            "{} differs",
            kind
        );
    }

    let left = IntegrityManifest::load(&first.run_dir).unwrap();
    let right = IntegrityManifest::load(&second.run_dir).unwrap();
    assert_eq!(left, right);
}

#[test]
fn diagnostics_are_outside_the_integrity_manifest() {
    let spec = load("observed-network");
    let tmp = TempDir::new().unwrap();
    let outcome = analyze_scenario(&spec, tmp.path()).unwrap();

    let manifest = IntegrityManifest::load(&outcome.run_dir).unwrap();
    assert!(outcome.run_dir.join("diagnostics.json").exists());
    assert!(!manifest.artifacts.contains_key("diagnostics.json"));
    assert!(!manifest.artifacts.contains_key("integrity.manifest.json"));
    assert!(manifest.artifacts.contains_key("findings.json"));
}

#[test]
fn observation_order_does_not_change_findings() {
    let spec = load("mixed-results");
    let mut reversed = spec.clone();
    reversed.observe.observations.reverse();
    reversed.learn.expectations.reverse();

    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();
    let first = analyze_scenario(&spec, a.path()).unwrap();
    let second = analyze_scenario(&reversed, b.path()).unwrap();

    assert_eq!(
        read(&first.run_dir, ArtifactKind::Findings),
        read(&second.run_dir, ArtifactKind::Findings)
    );
}

#[test]
fn rerun_into_same_output_replaces_the_run() {
    let spec = load("screenshots-only");
    let tmp = TempDir::new().unwrap();

    let first = analyze_scenario(&spec, tmp.path()).unwrap();
    let second = analyze_scenario(&spec, tmp.path()).unwrap();

    assert_eq!(first.run_dir, second.run_dir);
    let runs: Vec<_> = std::fs::read_dir(first.run_dir.parent().unwrap())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .collect();
    assert_eq!(runs.len(), 1);
}
