//! Pod metadata stored inside a pod directory.
//!
//! Preparation writes the pod manifest, the stage-1 image identifier and,
//! when requested, the overlay marker. The execution side writes back the
//! pid of the pod's init process. The lifecycle never interprets any of
//! this; it only moves the directory.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use podrun_common::constants::{
    OVERLAY_PREPARED_FILE, PID_FILE, POD_MANIFEST_FILE, POD_MANIFEST_KIND, PPID_FILE,
    STAGE1_ID_FILE,
};
use podrun_common::error::{PodrunError, Result};
use serde::{Deserialize, Serialize};

/// Description of the apps a pod runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodManifest {
    /// Always [`POD_MANIFEST_KIND`].
    pub ac_kind: String,
    /// Version of the tool that wrote the manifest.
    pub ac_version: String,
    /// Apps in the pod.
    pub apps: Vec<RuntimeApp>,
    /// Volume specifications, passed through untouched.
    #[serde(default)]
    pub volumes: Vec<String>,
}

/// One app within a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeApp {
    /// App name, unique within the pod.
    pub name: String,
    /// Opaque image reference resolved by the image store.
    pub image: String,
    /// Command line to execute.
    pub exec: Vec<String>,
    /// Environment for the app.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl PodManifest {
    /// Creates a manifest for the given apps.
    #[must_use]
    pub fn new(apps: Vec<RuntimeApp>) -> Self {
        Self {
            ac_kind: POD_MANIFEST_KIND.to_string(),
            ac_version: env!("CARGO_PKG_VERSION").to_string(),
            apps,
            volumes: Vec::new(),
        }
    }

    /// Checks that the manifest describes a runnable pod.
    ///
    /// # Errors
    ///
    /// Returns [`PodrunError::Config`] for a pod without apps, an app
    /// without a command, or two apps sharing a name.
    pub fn validate(&self) -> Result<()> {
        if self.apps.is_empty() {
            return Err(PodrunError::Config {
                message: "pod has no apps".into(),
            });
        }
        let mut names = HashSet::new();
        for app in &self.apps {
            if !names.insert(app.name.as_str()) {
                return Err(PodrunError::Config {
                    message: format!("multiple apps with name {}", app.name),
                });
            }
            if app.exec.is_empty() {
                return Err(PodrunError::Config {
                    message: format!("app {} has no exec command", app.name),
                });
            }
        }
        Ok(())
    }
}

/// Merges explicit `KEY=VALUE` settings, then optionally the host
/// environment, into an app environment.
///
/// Explicit settings override existing keys; inherited variables only fill
/// keys that are still unset.
///
/// # Errors
///
/// Returns [`PodrunError::Config`] if an explicit setting has no `=`.
pub fn merge_envs(
    env: &mut BTreeMap<String, String>,
    inherit: bool,
    explicit: &[String],
) -> Result<()> {
    for setting in explicit {
        let Some((key, value)) = setting.split_once('=') else {
            return Err(PodrunError::Config {
                message: format!("environment setting {setting:?} is not KEY=VALUE"),
            });
        };
        let _ = env.insert(key.to_string(), value.to_string());
    }
    if inherit {
        for (key, value) in std::env::vars() {
            let _ = env.entry(key).or_insert(value);
        }
    }
    Ok(())
}

/// Writes the preparation metadata into a pod directory.
///
/// # Errors
///
/// Returns an error if the manifest is invalid or a file cannot be written.
pub fn write_pod_metadata(
    dir: &Path,
    manifest: &PodManifest,
    stage1_id: &str,
    overlay: bool,
) -> Result<()> {
    manifest.validate()?;

    let doc = serde_json::to_vec_pretty(manifest)?;
    write_file(&dir.join(POD_MANIFEST_FILE), &doc)?;
    write_file(&dir.join(STAGE1_ID_FILE), stage1_id.as_bytes())?;
    if overlay {
        write_file(&dir.join(OVERLAY_PREPARED_FILE), b"")?;
    }
    tracing::debug!(dir = %dir.display(), apps = manifest.apps.len(), "pod metadata written");
    Ok(())
}

/// Reads the pod manifest.
///
/// # Errors
///
/// Returns an error if the file is missing or malformed.
pub fn read_manifest(dir: &Path) -> Result<PodManifest> {
    let path = dir.join(POD_MANIFEST_FILE);
    let doc = std::fs::read(&path).map_err(|e| PodrunError::io(&path, e))?;
    Ok(serde_json::from_slice(&doc)?)
}

/// Reads the stage-1 image identifier.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn read_stage1_id(dir: &Path) -> Result<String> {
    let path = dir.join(STAGE1_ID_FILE);
    let id = std::fs::read_to_string(&path).map_err(|e| PodrunError::io(&path, e))?;
    Ok(id.trim().to_string())
}

/// Whether the pod was prepared for overlay use.
///
/// # Errors
///
/// Returns an error if the marker cannot be checked.
pub fn prepared_with_overlay(dir: &Path) -> Result<bool> {
    let path = dir.join(OVERLAY_PREPARED_FILE);
    match std::fs::symlink_metadata(&path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PodrunError::io(path, e)),
    }
}

/// Reads the pid of the pod's init process, if one was recorded.
///
/// # Errors
///
/// Returns [`PodrunError::CorruptState`] if the pid file does not hold a
/// number, or an I/O error.
pub fn read_pid(dir: &Path) -> Result<Option<u32>> {
    for name in [PID_FILE, PPID_FILE] {
        let path = dir.join(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(PodrunError::io(path, e)),
        };
        let pid = content
            .trim()
            .parse()
            .map_err(|_| PodrunError::corrupt(&path, format!("invalid pid {content:?}")))?;
        return Ok(Some(pid));
    }
    Ok(None)
}

/// Records the pid of the pod's init process.
///
/// # Errors
///
/// Returns an error if the pid file cannot be written.
pub fn write_pid(dir: &Path, pid: u32) -> Result<()> {
    write_file(&dir.join(PID_FILE), pid.to_string().as_bytes())
}

/// Whether a process with the given pid exists.
#[must_use]
pub fn pid_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    // EPERM still means the process exists.
    !matches!(kill(Pid::from_raw(raw), None), Err(nix::errno::Errno::ESRCH))
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    std::fs::write(path, content).map_err(|e| PodrunError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(name: &str) -> RuntimeApp {
        RuntimeApp {
            name: name.into(),
            image: "example.com/app:1.0".into(),
            exec: vec!["/bin/app".into(), "--serve".into()],
            environment: BTreeMap::new(),
        }
    }

    #[test]
    fn metadata_written_and_read_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = PodManifest::new(vec![app("web")]);

        write_pod_metadata(dir.path(), &manifest, "sha512-abc", true).expect("write");

        assert_eq!(read_manifest(dir.path()).expect("manifest"), manifest);
        assert_eq!(read_stage1_id(dir.path()).expect("stage1"), "sha512-abc");
        assert!(prepared_with_overlay(dir.path()).expect("overlay"));
    }

    #[test]
    fn manifest_uses_camel_case_keys() {
        let json = serde_json::to_string(&PodManifest::new(vec![app("web")])).expect("json");
        assert!(json.contains("\"acKind\":\"PodManifest\""));
    }

    #[test]
    fn overlay_marker_absent_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = PodManifest::new(vec![app("web")]);
        write_pod_metadata(dir.path(), &manifest, "s1", false).expect("write");
        assert!(!prepared_with_overlay(dir.path()).expect("overlay"));
    }

    #[test]
    fn duplicate_app_names_rejected() {
        let manifest = PodManifest::new(vec![app("web"), app("web")]);
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("multiple apps with name web"));
    }

    #[test]
    fn empty_pod_rejected() {
        assert!(PodManifest::new(Vec::new()).validate().is_err());
    }

    #[test]
    fn explicit_env_overrides_and_inherit_fills_gaps() {
        let mut env = BTreeMap::new();
        let _ = env.insert("PATH".to_string(), "/app/bin".to_string());
        let _ = env.insert("MODE".to_string(), "dev".to_string());

        merge_envs(&mut env, true, &["MODE=prod".into(), "EMPTY=".into()]).expect("merge");

        assert_eq!(env["MODE"], "prod");
        assert_eq!(env["EMPTY"], "");
        assert_eq!(env["PATH"], "/app/bin");
        if let Ok(home) = std::env::var("HOME") {
            assert_eq!(env["HOME"], home);
        }
    }

    #[test]
    fn malformed_env_setting_rejected() {
        let mut env = BTreeMap::new();
        assert!(merge_envs(&mut env, false, &["NOEQUALS".into()]).is_err());
    }

    #[test]
    fn pid_file_variants() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_pid(dir.path()).expect("none"), None);

        std::fs::write(dir.path().join(PPID_FILE), "4242\n").expect("write");
        assert_eq!(read_pid(dir.path()).expect("ppid"), Some(4242));

        write_pid(dir.path(), 77).expect("write pid");
        assert_eq!(read_pid(dir.path()).expect("pid"), Some(77));

        std::fs::write(dir.path().join(PID_FILE), "nonsense").expect("write");
        assert!(matches!(
            read_pid(dir.path()),
            Err(PodrunError::CorruptState { .. })
        ));
    }

    #[test]
    fn own_process_is_alive() {
        assert!(pid_alive(std::process::id()));
    }
}
