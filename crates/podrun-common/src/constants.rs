//! System-wide constants and default paths.

use std::time::Duration;

/// Default base directory for podrun data.
pub const DEFAULT_DATA_DIR: &str = "/var/lib/podrun";

/// Name of the pods root below the data directory.
pub const PODS_DIR_NAME: &str = "pods";

/// Environment variable that names the inherited lock descriptor.
pub const ENV_LOCK_FD: &str = "PODRUN_LOCK_FD";

/// Environment variable that overrides the data directory.
pub const ENV_DATA_DIR: &str = "PODRUN_DIR";

/// How long an exited or failed pod stays queryable before it may be swept.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(30 * 60);

/// How long a prepared pod may sit unused before it is collected.
pub const DEFAULT_PREPARED_EXPIRATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Pod manifest file inside a pod directory.
pub const POD_MANIFEST_FILE: &str = "pod";

/// Stage-1 image identifier file inside a pod directory.
pub const STAGE1_ID_FILE: &str = "stage1ID";

/// Marker file present when the pod was prepared for overlay use.
pub const OVERLAY_PREPARED_FILE: &str = "overlay-prepared";

/// Pid file written by the execution collaborator.
pub const PID_FILE: &str = "pid";

/// Fallback pid file written by some execution collaborators.
pub const PPID_FILE: &str = "ppid";

/// Kind string recorded in pod manifests.
pub const POD_MANIFEST_KIND: &str = "PodManifest";
