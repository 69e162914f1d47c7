// tests/activate.rs

//! End-to-end activation against a scratch install root.

mod common;

use common::TestHost;
use pkgpanda::install::unit_names;
use pkgpanda::{Error, PackageId, PackageKind, Repository, ServiceManager, ValidationError};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const BOTH: [&str; 2] = ["mesos--0.22.0", "mesos-config--abcd1234"];

#[test]
fn test_activate_sets_exactly_the_requested_packages() {
    let host = TestHost::new();
    let install = host.install();

    install.activate(&host.repository, &host.load(&BOTH)).unwrap();

    let expected: BTreeSet<String> = BOTH.iter().map(|s| s.to_string()).collect();
    assert_eq!(install.active().unwrap(), expected);

    let root = host.root();
    assert_eq!(
        fs::read_link(root.join("active/mesos")).unwrap(),
        host.repository.path().join("mesos--0.22.0")
    );
    assert_eq!(
        fs::read_link(root.join("bin/mesos-master")).unwrap(),
        host.repository.path().join("mesos--0.22.0/bin/mesos-master")
    );
    assert!(root.join("etc/mesos-master").exists());
    assert!(!root.join("install_progress").exists());
    assert!(!root.join("active.new").exists());
}

#[test]
fn test_activate_twice_is_identical() {
    let host = TestHost::new();
    let install = host.install();

    install.activate(&host.repository, &host.load(&BOTH)).unwrap();
    let first = host.snapshot();
    install.activate(&host.repository, &host.load(&BOTH)).unwrap();
    let second = host.snapshot();

    assert_eq!(first, second);
    assert!(!second.marker_present);
}

#[test]
fn test_unmet_dependency_leaves_live_generation_untouched() {
    let host = TestHost::new();
    let install = host.install();
    install
        .activate(&host.repository, &host.load(&["mesos--0.22.0"]))
        .unwrap();
    let before = host.snapshot();

    host.add_package("marathon--0.8.1", r#"{"requires": ["java"]}"#, &[("bin/marathon", "")]);
    let err = install
        .activate(&host.repository, &host.load(&["mesos--0.22.0", "marathon--0.8.1"]))
        .unwrap_err();

    match err {
        Error::Validation(errors) => {
            assert_eq!(
                errors.errors(),
                [ValidationError::UnmetDependency {
                    package: "marathon--0.8.1".to_string(),
                    requirement: "java".to_string(),
                }]
            );
        }
        other => panic!("expected a validation error, got {other:?}"),
    }

    assert_eq!(host.snapshot(), before);
    assert!(!host.root().join("bin.new").exists());
}

#[test]
fn test_config_without_its_requirement_is_rejected() {
    let host = TestHost::new();
    let install = host.install();

    let err = install
        .activate(&host.repository, &host.load(&["mesos-config--abcd1234"]))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(err.to_string().contains("mesos--0.22.0"), "{err}");
    assert!(!host.root().join("active").exists());
}

#[test]
fn test_environment_files() {
    let host = TestHost::new();
    let install = host.install();
    install.activate(&host.repository, &host.load(&BOTH)).unwrap();

    let root = host.root().display().to_string();
    let environment = fs::read_to_string(host.root().join("environment")).unwrap();
    assert_eq!(
        environment,
        format!(
            "# Pandapkg provided environment variables\n\
             LD_LIBRARY_PATH={root}/lib\n\
             PATH={root}/bin:/usr/bin\n\n\
             # package: mesos--0.22.0\n\
             MESOS_HOME=/opt/mesosphere/active/mesos\n\n\
             # package: mesos-config--abcd1234\n\
             MESOS_CONFIG=/etc/mesos\n\n"
        )
    );

    let export = fs::read_to_string(host.root().join("environment.export")).unwrap();
    assert!(export.contains(&format!("export PATH=\"{root}/bin:$PATH\"\n")));
    assert!(export.contains("export MESOS_CONFIG=/etc/mesos\n"));

    let buildinfo: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(host.root().join("active.buildinfo.full.json")).unwrap())
            .unwrap();
    assert_eq!(
        buildinfo,
        serde_json::json!({"mesos": null, "mesos-config": null})
    );
}

#[test]
fn test_environment_conflict_is_rejected() {
    let host = TestHost::new();
    host.add_package("a--1", r#"{"environment": {"FOO": "1"}}"#, &[]);
    host.add_package("b--1", r#"{"environment": {"FOO": "2"}}"#, &[]);
    let install = host.install();

    install.activate(&host.repository, &host.load(&["a--1"])).unwrap();
    install.activate(&host.repository, &host.load(&["b--1"])).unwrap();

    let err = install
        .activate(&host.repository, &host.load(&["a--1", "b--1"]))
        .unwrap_err();
    match err {
        Error::Validation(errors) => assert!(matches!(
            errors.errors(),
            [ValidationError::EnvironmentConflict { key, .. }] if key == "FOO"
        )),
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn test_roles_select_role_directories() {
    let host = TestHost::new();
    host.set_roles(&["master"]);
    let install = host.install();
    install.activate(&host.repository, &host.load(&BOTH)).unwrap();

    let wants = install.systemd_dir();
    assert!(wants.join("mesos-master.service").exists());
    assert!(!wants.join("mesos-slave.service").exists());
    assert!(!host.root().join("etc/mesos-slave").exists());
}

#[test]
fn test_units_are_flattened_next_to_the_wants_directory() {
    let host = TestHost::new();
    host.set_roles(&["slave"]);
    let install = host.install();
    install.activate(&host.repository, &host.load(&BOTH)).unwrap();

    let flattened = host.root().join("mesos-slave.service");
    assert_eq!(
        fs::read_link(&flattened).unwrap(),
        host.repository
            .path()
            .join("mesos--0.22.0/dcos.target.wants_slave/mesos-slave.service")
    );

    // Dropping the package drops its flattened unit link
    install.activate(&host.repository, &[]).unwrap();
    assert!(fs::symlink_metadata(&flattened).is_err());
}

#[test]
fn test_switching_sets_archives_previous_generation() {
    let host = TestHost::new();
    let install = host.install();
    install
        .activate(&host.repository, &host.load(&["mesos--0.22.0"]))
        .unwrap();
    install.activate(&host.repository, &host.load(&BOTH)).unwrap();

    let root = host.root();
    assert!(root.join("active.old/mesos").exists());
    assert!(!root.join("active.old/mesos-config").exists());
    assert!(root.join("active/mesos-config").exists());
    assert_eq!(install.active().unwrap().len(), 2);
}

#[test]
fn test_packages_outside_the_repository_are_rejected() {
    let host = TestHost::new();
    let install = host.install();
    let other = pkgpanda::Repository::new(host.path().join("elsewhere"));

    let err = install
        .activate(&other, &host.load(&["mesos--0.22.0"]))
        .unwrap_err();
    assert!(matches!(err, Error::InstallError(_)));
    assert!(!host.root().join("active.new").exists());
}

#[test]
fn test_merge_conflict_between_packages() {
    let host = TestHost::new();
    host.add_package("tool--1", "{}", &[("bin/mesos-master", "other")]);
    let install = host.install();

    let err = install
        .activate(&host.repository, &host.load(&["mesos--0.22.0", "tool--1"]))
        .unwrap_err();
    assert!(matches!(err, Error::MergeConflict { .. }), "{err:?}");
    assert!(!host.root().join("active").exists());
}

/// Records what was live whenever units are stopped
#[derive(Clone)]
struct RecordingStop {
    root: PathBuf,
    stops: Rc<RefCell<Vec<(PathBuf, Vec<String>, bool)>>>,
}

impl ServiceManager for RecordingStop {
    fn stop_all(&self, unit_dir: &Path) -> pkgpanda::Result<()> {
        self.stops.borrow_mut().push((
            unit_dir.to_path_buf(),
            unit_names(unit_dir)?,
            self.root.join("active/mesos").exists(),
        ));
        Ok(())
    }

    fn enable(&self, _unit: &str) -> pkgpanda::Result<()> {
        Ok(())
    }

    fn start(&self, _unit: &str) -> pkgpanda::Result<()> {
        Ok(())
    }

    fn daemon_reload(&self) -> pkgpanda::Result<()> {
        Ok(())
    }
}

#[test]
fn test_live_units_are_stopped_before_archiving() {
    let host = TestHost::new();
    host.set_roles(&["master"]);
    let services = RecordingStop {
        root: host.root(),
        stops: Rc::default(),
    };
    let install = host.install().with_service_manager(Box::new(services.clone()));

    // Nothing is live yet, so nothing is stopped
    install
        .activate(&host.repository, &host.load(&["mesos--0.22.0"]))
        .unwrap();
    assert!(services.stops.borrow().is_empty());

    install.activate(&host.repository, &host.load(&BOTH)).unwrap();
    assert_eq!(
        *services.stops.borrow(),
        [(
            install.systemd_dir().to_path_buf(),
            vec!["mesos-master.service".to_string()],
            true
        )]
    );
}

#[test]
fn test_relative_repository_path() {
    let host = TestHost::new();
    let cwd = std::env::current_dir().unwrap();
    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    relative.push(host.repository.path().strip_prefix("/").unwrap());
    let repository = Repository::new(&relative);
    let packages = repository
        .load_packages(&[PackageId::parse("mesos--0.22.0").unwrap()])
        .unwrap();
    assert!(packages[0].path().is_relative());

    let install = host.install();
    install.activate(&repository, &packages).unwrap();

    let link = fs::read_link(host.root().join("active/mesos")).unwrap();
    assert!(link.is_absolute(), "{}", link.display());
    assert!(host.root().join("active/mesos/pkginfo.json").is_file());
    assert!(host.root().join("bin/mesos-master").is_file());
}

#[test]
fn test_package_kind_does_not_change_activation() {
    let host = TestHost::new();
    host.add_package("svc--1", r#"{"kind": "service"}"#, &[("bin/svc", "")]);
    host.add_package("tool--1", "{}", &[("bin/tool", "")]);
    let install = host.install();

    let packages = host.load(&["svc--1", "tool--1"]);
    assert_eq!(packages[0].kind(), PackageKind::Service);
    assert_eq!(packages[1].kind(), PackageKind::Generic);
    install.activate(&host.repository, &packages).unwrap();

    assert!(host.root().join("bin/svc").exists());
    assert!(host.root().join("bin/tool").exists());
    assert_eq!(install.active().unwrap().len(), 2);
}
