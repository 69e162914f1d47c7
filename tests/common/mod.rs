// tests/common/mod.rs

//! Shared fixtures for integration tests.

#![allow(dead_code)]

use pkgpanda::{Install, InstallConfig, Package, PackageId, Repository};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch host: repository, install root and machine config directory.
///
/// Keep the value alive for the duration of the test; dropping it removes
/// everything.
pub struct TestHost {
    pub temp: TempDir,
    pub repository: Repository,
}

impl TestHost {
    /// Repository holding `mesos--0.22.0` and `mesos-config--abcd1234`
    /// (which requires `mesos--0.22.0`).
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let repo_path = temp.path().join("packages");
        fs::create_dir_all(&repo_path).unwrap();

        write_package(
            &repo_path,
            "mesos--0.22.0",
            r#"{"environment": {"MESOS_HOME": "/opt/mesosphere/active/mesos"}}"#,
            &[
                ("bin/mesos-master", "#!/bin/sh\nexec mesos-master \"$@\"\n"),
                ("bin/mesos-slave", "#!/bin/sh\nexec mesos-slave \"$@\"\n"),
                ("lib/libmesos.so", "ELF"),
                ("dcos.target.wants_master/mesos-master.service", "[Service]\n"),
                ("dcos.target.wants_slave/mesos-slave.service", "[Service]\n"),
            ],
        );
        write_package(
            &repo_path,
            "mesos-config--abcd1234",
            r#"{"requires": ["mesos--0.22.0"], "environment": {"MESOS_CONFIG": "/etc/mesos"}}"#,
            &[
                ("etc/mesos-master", "MESOS_QUORUM=1\n"),
                ("etc_slave/mesos-slave", "MESOS_RESOURCES=cpus:4\n"),
            ],
        );

        let repository = Repository::new(repo_path);
        Self { temp, repository }
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn root(&self) -> PathBuf {
        self.temp.path().join("root")
    }

    pub fn config_dir(&self) -> PathBuf {
        self.temp.path().join("etc")
    }

    /// Add a package to the fixture repository
    pub fn add_package(&self, id: &str, pkginfo: &str, files: &[(&str, &str)]) {
        write_package(self.repository.path(), id, pkginfo, files);
        self.repository.rescan().unwrap();
    }

    /// Mark `roles` in the machine configuration
    pub fn set_roles(&self, roles: &[&str]) {
        let roles_dir = self.config_dir().join("roles");
        fs::create_dir_all(&roles_dir).unwrap();
        for role in roles {
            fs::write(roles_dir.join(role), "").unwrap();
        }
    }

    /// Install with rooted systemd and no service management
    pub fn install(&self) -> Install {
        Install::new(InstallConfig {
            root: self.root(),
            config_dir: Some(self.config_dir()),
            rooted_systemd: true,
            manage_systemd: false,
            block_systemd: false,
            env_root: None,
        })
        .unwrap()
    }

    pub fn load(&self, ids: &[&str]) -> Vec<Package> {
        let ids: Vec<PackageId> = ids.iter().map(|id| PackageId::parse(id).unwrap()).collect();
        self.repository.load_packages(&ids).unwrap()
    }

    /// Observable state of the live generation.
    ///
    /// Archived `.old` paths are not included.
    pub fn snapshot(&self) -> Snapshot {
        let root = self.root();
        let mut links = BTreeMap::new();
        for name in ["active", "bin", "etc", "lib", "dcos.target.wants"] {
            collect_links(&root.join(name), &root, &mut links);
        }
        Snapshot {
            links,
            environment: fs::read_to_string(root.join("environment")).unwrap(),
            environment_export: fs::read_to_string(root.join("environment.export")).unwrap(),
            buildinfo: fs::read_to_string(root.join("active.buildinfo.full.json")).unwrap(),
            marker_present: root.join("install_progress").exists(),
            staged_present: root.join("active.new").exists(),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Symlink path (relative to the root) to its target
    pub links: BTreeMap<String, PathBuf>,
    pub environment: String,
    pub environment_export: String,
    pub buildinfo: String,
    pub marker_present: bool,
    pub staged_present: bool,
}

fn collect_links(dir: &Path, root: &Path, links: &mut BTreeMap<String, PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        let meta = fs::symlink_metadata(&path).unwrap();
        if meta.file_type().is_symlink() {
            let relative = path.strip_prefix(root).unwrap().display().to_string();
            links.insert(relative, fs::read_link(&path).unwrap());
        } else if meta.is_dir() {
            collect_links(&path, root, links);
        }
    }
}

/// Write an unpacked package directory
pub fn write_package(repo: &Path, id: &str, pkginfo: &str, files: &[(&str, &str)]) {
    let dir = repo.join(id);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("pkginfo.json"), pkginfo).unwrap();
    for (path, contents) in files {
        let path = dir.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
}
