//! Behaviour-driven tests for install runs.
//!
//! These scenarios drive the production pipeline end to end with `file://`
//! archive URLs: a matching release, a tampered archive, an unsupported
//! platform and an idempotent reinstall.

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::cell::{Cell, RefCell};
use std::fs;
use tap_installer::artefact::download::CancelFlag;
use tap_installer::artefact::extraction::ArchiveFormat;
use tap_installer::artefact::retry::RetryPolicy;
use tap_installer::manifest::ReleaseManifest;
use tap_installer::manifest::parser::parse_manifest;
use tap_installer::pipeline::{
    InstallConfig, InstallReport, InstallRequest, RunState, Stage, run_install,
};
use tap_installer::platform::{Os, Platform};
use tap_installer::test_utils::{
    EntrySpec, build_archive, fake_tool_script, manifest_toml, sha256_hex,
};
use tempfile::TempDir;

const BANNER: &str = "poof 0.5.2";
const PREVIOUS: &[u8] = b"previous poof";

// ---------------------------------------------------------------------------
// Install world
// ---------------------------------------------------------------------------

struct InstallWorld {
    temp: TempDir,
    root: Utf8PathBuf,
    manifest: RefCell<Option<ReleaseManifest>>,
    platform: Cell<Option<Platform>>,
    report: RefCell<Option<InstallReport>>,
}

impl InstallWorld {
    fn target(&self) -> Utf8PathBuf {
        self.root.join("bin")
    }

    fn binary(&self) -> Utf8PathBuf {
        self.target().join("poof")
    }

    fn host(&self) -> Platform {
        Platform::current().expect("tests run on a supported host")
    }

    /// Write a release archive and return its `file://` URL and bytes.
    fn publish_archive(&self) -> (String, Vec<u8>) {
        let archive = build_archive(
            ArchiveFormat::TarGz,
            &[
                ("poof-0.5.2/poof", fake_tool_script(BANNER).as_bytes()),
                ("poof-0.5.2/README.md", b"poof"),
            ],
        )
        .expect("build archive");
        let path = self.root.join("poof-0.5.2.tar.gz");
        fs::write(&path, &archive).expect("write archive");
        (format!("file://{path}"), archive)
    }

    fn set_manifest(&self, entry: EntrySpec) {
        let toml = manifest_toml("poof", "0.5.2", &[entry]);
        let manifest = parse_manifest(&toml, "poof.toml").expect("valid manifest");
        self.manifest.replace(Some(manifest));
        self.platform.set(Some(self.host()));
    }

    fn install(&self) {
        let manifest = self.manifest.borrow();
        let manifest = manifest.as_ref().expect("manifest not set");
        let platform = self.platform.get().expect("platform not set");
        let mut config = InstallConfig::new(self.target());
        config.retry = RetryPolicy::immediate(1);
        let request = InstallRequest { manifest, platform };
        let report = run_install(&request, &config, &CancelFlag::new(), &mut Vec::new());
        self.report.replace(Some(report));
    }

    fn failed_stage(&self) -> Option<Stage> {
        let report = self.report.borrow();
        match report.as_ref().expect("report not set").final_state() {
            RunState::Failed { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[fixture]
fn install_world() -> InstallWorld {
    let temp = TempDir::new().expect("failed to create temp dir");
    let root = Utf8PathBuf::try_from(temp.path().to_owned()).expect("temp dir path not UTF-8");
    InstallWorld {
        temp,
        root,
        manifest: RefCell::new(None),
        platform: Cell::new(None),
        report: RefCell::new(None),
    }
}

#[given("a tap manifest for this host")]
fn given_manifest_for_host(install_world: &InstallWorld) {
    let (url, archive) = install_world.publish_archive();
    install_world.set_manifest(EntrySpec::for_archive(install_world.host(), url, &archive));
}

#[given("a tap manifest with a wrong checksum")]
fn given_manifest_with_wrong_checksum(install_world: &InstallWorld) {
    let (url, _) = install_world.publish_archive();
    install_world.set_manifest(EntrySpec {
        platform: install_world.host(),
        url,
        sha256: sha256_hex(b"some other archive"),
    });
}

#[given("a tap manifest for another platform only")]
fn given_manifest_for_other_platform(install_world: &InstallWorld) {
    let host = install_world.host();
    let os = if host.os == Os::Linux { Os::Macos } else { Os::Linux };
    let other = Platform::new(os, host.arch);
    install_world.set_manifest(EntrySpec {
        platform: other,
        url: format!("file://{}/missing.tar.gz", install_world.root),
        sha256: sha256_hex(b"never fetched"),
    });
}

#[given("an existing binary in the target directory")]
fn given_existing_binary(install_world: &InstallWorld) {
    fs::create_dir_all(install_world.target()).expect("create target dir");
    fs::write(install_world.binary(), PREVIOUS).expect("write existing binary");
}

#[when("the package is installed")]
fn when_installed(install_world: &InstallWorld) {
    install_world.install();
}

#[when("the package is installed twice")]
fn when_installed_twice(install_world: &InstallWorld) {
    install_world.install();
    install_world.install();
}

#[then("the run ends in the done state")]
fn then_done(install_world: &InstallWorld) {
    let report = install_world.report.borrow();
    let report = report.as_ref().expect("report not set");
    assert!(report.is_done(), "run ended in {}", report.final_state());
    assert_eq!(report.states.first(), Some(&RunState::Idle));
}

#[then("the installed binary answers its self-test")]
fn then_self_test_passed(install_world: &InstallWorld) {
    let report = install_world.report.replace(None).expect("report not set");
    assert!(report.states.contains(&RunState::Tested));
    let outcome = report.into_result().expect("install succeeded");
    assert_eq!(outcome.banner.as_deref(), Some(BANNER));
    assert_eq!(outcome.path, install_world.binary());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(install_world.binary())
            .expect("binary metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[then("the run fails in the verify stage")]
fn then_fails_verify(install_world: &InstallWorld) {
    assert_eq!(install_world.failed_stage(), Some(Stage::Verify));
}

#[then("the existing binary is unchanged")]
fn then_existing_unchanged(install_world: &InstallWorld) {
    let contents = fs::read(install_world.binary()).expect("read binary");
    assert_eq!(contents, PREVIOUS);
    assert!(install_world.temp.path().join("bin").is_dir());
}

#[then("the run fails in the resolve stage before fetching")]
fn then_fails_resolve(install_world: &InstallWorld) {
    assert_eq!(install_world.failed_stage(), Some(Stage::Resolve));
    let report = install_world.report.borrow();
    let report = report.as_ref().expect("report not set");
    assert_eq!(report.states.len(), 2, "only Idle and Failed: {:?}", report.states);
    assert!(!install_world.target().exists());
}

#[then("the target directory holds only the binary")]
fn then_only_binary(install_world: &InstallWorld) {
    let mut names: Vec<_> = fs::read_dir(install_world.target())
        .expect("read target dir")
        .map(|entry| entry.expect("dir entry").file_name())
        .collect();
    names.sort();
    assert_eq!(names, [".poof.lock", "poof"]);
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[scenario(path = "tests/features/install.feature", index = 0)]
fn scenario_install_matching_release(install_world: InstallWorld) {
    let _ = install_world;
}

#[scenario(path = "tests/features/install.feature", index = 1)]
fn scenario_reject_tampered_archive(install_world: InstallWorld) {
    let _ = install_world;
}

#[scenario(path = "tests/features/install.feature", index = 2)]
fn scenario_refuse_unsupported_platform(install_world: InstallWorld) {
    let _ = install_world;
}

#[cfg(unix)]
#[scenario(path = "tests/features/install.feature", index = 3)]
fn scenario_reinstall_same_release(install_world: InstallWorld) {
    let _ = install_world;
}
