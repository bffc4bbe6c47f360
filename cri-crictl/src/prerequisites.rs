use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use cri_api::RuntimeError;

use crate::config::CrictlConfig;

const CRICTL: &str = "crictl";

/// Verify that crictl is usable before probing any endpoint.
///
/// Resolves the binary (configured path or `PATH` lookup), checks that it is
/// executable, and for a configured `unix://` endpoint checks that the socket
/// path exists. Collects all failures into one `Unavailable` error.
pub fn check_prerequisites(config: &CrictlConfig) -> Result<PathBuf, RuntimeError> {
    let mut errors = Vec::new();

    let binary = resolve_binary(config.binary.as_deref(), &mut errors);
    if let Some(path) = &binary {
        check_executable(path, &mut errors);
    }
    if let Some(endpoint) = &config.runtime_endpoint {
        check_endpoint(endpoint, &mut errors);
    }

    match binary {
        Some(path) if errors.is_empty() => Ok(path),
        _ => Err(RuntimeError::Unavailable(errors.join("; "))),
    }
}

fn resolve_binary(configured: Option<&Path>, errors: &mut Vec<String>) -> Option<PathBuf> {
    match configured {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(path) => {
            errors.push(format!("crictl binary not found: {}", path.display()));
            None
        }
        None => match which::which(CRICTL) {
            Ok(path) => Some(path),
            Err(e) => {
                errors.push(format!("required command not found: {CRICTL} ({e})"));
                None
            }
        },
    }
}

fn check_executable(path: &Path, errors: &mut Vec<String>) {
    if let Ok(meta) = path.metadata()
        && meta.permissions().mode() & 0o111 == 0
    {
        errors.push(format!("crictl binary is not executable: {}", path.display()));
    }
}

fn check_endpoint(endpoint: &str, errors: &mut Vec<String>) {
    if endpoint.is_empty() {
        errors.push("runtime endpoint is empty".to_string());
        return;
    }
    if let Some(socket) = socket_path(endpoint)
        && !socket.exists()
    {
        errors.push(format!("runtime socket not found: {}", socket.display()));
    }
}

/// Filesystem path of a `unix://` endpoint, `None` for other schemes.
pub fn socket_path(endpoint: &str) -> Option<PathBuf> {
    endpoint.strip_prefix("unix://").map(PathBuf::from)
}
