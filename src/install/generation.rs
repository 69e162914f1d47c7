// src/install/generation.rs

//! Staging a `.new` generation
//!
//! Nothing here touches the live generation. A failure leaves a partial
//! `.new` behind, which the next activation discards before starting over.

use super::{
    with_suffix, Install, ACTIVE_BUILDINFO_FILE, ACTIVE_DIR, ENVIRONMENT_EXPORT_FILE,
    ENVIRONMENT_FILE, NEW_SUFFIX, OLD_SUFFIX,
};
use crate::error::{Error, Result};
use crate::filesystem::{publish_durably, remove_path, symlink_tree};
use crate::package::Package;
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use tracing::{debug, info};

impl Install {
    /// Build every `.new` path for `packages`
    pub(super) fn stage_generation(&self, packages: &[Package]) -> Result<()> {
        for name in self.active_names() {
            remove_path(&with_suffix(&name, NEW_SUFFIX))?;
            remove_path(&with_suffix(&name, OLD_SUFFIX))?;
        }

        let well_known = self.well_known_dirs();
        for dir in well_known.iter().chain([self.root.join(ACTIVE_DIR)].iter()) {
            fs::create_dir_all(with_suffix(dir, NEW_SUFFIX))?;
        }

        let mut ordered: Vec<&Package> = packages.iter().collect();
        ordered.sort_by(|a, b| a.id().cmp(b.id()));

        let active_new = with_suffix(&self.root.join(ACTIVE_DIR), NEW_SUFFIX);
        let mut environment = environment_header(&self.env_root, false);
        let mut environment_export = environment_header(&self.env_root, true);
        let mut buildinfo = BTreeMap::new();

        for package in ordered {
            debug!("Staging {}", package.id());

            for dir in &well_known {
                // Packages always use the bare directory name, even for the
                // host systemd directory
                let dir_name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        Error::InvariantViolation(format!("{} has no file name", dir.display()))
                    })?;
                let target = with_suffix(dir, NEW_SUFFIX);

                merge_if_dir(&package.path().join(&dir_name), &target)?;
                for role in &self.roles {
                    merge_if_dir(&package.path().join(format!("{dir_name}_{role}")), &target)?;
                }
            }

            symlink(package.path(), active_new.join(package.name()))?;

            environment.push_str(&format!("# package: {}\n", package.id()));
            environment_export.push_str(&format!("# package: {}\n", package.id()));
            for (key, value) in package.environment() {
                environment.push_str(&format!("{key}={value}\n"));
                environment_export.push_str(&format!("export {key}={value}\n"));
            }
            environment.push('\n');
            environment_export.push('\n');

            buildinfo.insert(
                package.name().to_string(),
                package.buildinfo()?.unwrap_or(serde_json::Value::Null),
            );
        }

        self.publish_staged(ENVIRONMENT_FILE, environment.as_bytes())?;
        self.publish_staged(ENVIRONMENT_EXPORT_FILE, environment_export.as_bytes())?;
        self.publish_staged(
            ACTIVE_BUILDINFO_FILE,
            &serde_json::to_vec_pretty(&buildinfo)?,
        )?;

        info!("Staged new generation with {} packages", packages.len());
        Ok(())
    }

    fn publish_staged(&self, name: &str, contents: &[u8]) -> Result<()> {
        let staged = with_suffix(&self.root.join(name), NEW_SUFFIX);
        publish_durably(&with_suffix(&staged, ".tmp"), &staged, contents)
    }
}

fn merge_if_dir(src: &Path, dest: &Path) -> Result<()> {
    if src.is_dir() {
        symlink_tree(src, dest)?;
    }
    Ok(())
}

/// Implicit library and binary paths pointing into the install
fn environment_header(root: &Path, export: bool) -> String {
    let root = root.display();
    if export {
        format!(
            "# Pandapkg provided environment variables\n\
             export LD_LIBRARY_PATH={root}/lib\n\
             export PATH=\"{root}/bin:$PATH\"\n\n"
        )
    } else {
        format!(
            "# Pandapkg provided environment variables\n\
             LD_LIBRARY_PATH={root}/lib\n\
             PATH={root}/bin:/usr/bin\n\n"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_headers() {
        let plain = environment_header(Path::new("/opt/mesosphere"), false);
        assert_eq!(
            plain,
            "# Pandapkg provided environment variables\n\
             LD_LIBRARY_PATH=/opt/mesosphere/lib\n\
             PATH=/opt/mesosphere/bin:/usr/bin\n\n"
        );

        let export = environment_header(Path::new("/opt/mesosphere"), true);
        assert!(export.contains("export PATH=\"/opt/mesosphere/bin:$PATH\"\n"));
    }
}
