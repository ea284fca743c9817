use crate::foundation::error::{TexforgeError, TexforgeResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Locates the external tools by name.
///
/// Search order per tool:
/// 1. an explicit override, returned unconditionally even if the path does
///    not exist, so the failure surfaces at the invocation site with a
///    clearer error;
/// 2. the configured search directory, trying the bare name and the platform
///    executable suffix;
/// 3. a PATH scan.
///
/// Successes are memoized per tool name. The resolver is instance-owned and
/// constructor-injected; changed configuration means constructing a new
/// resolver, so there is no invalidation hook.
#[derive(Debug, Default)]
pub struct BinaryResolver {
    overrides: HashMap<String, PathBuf>,
    search_dir: Option<PathBuf>,
    memo: Mutex<HashMap<String, PathBuf>>,
}

impl BinaryResolver {
    /// Create a resolver with an optional configured search directory.
    pub fn new(search_dir: Option<PathBuf>) -> Self {
        Self {
            overrides: HashMap::new(),
            search_dir,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Register an explicit per-tool override.
    pub fn with_override(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.overrides.insert(name.into(), path.into());
        self
    }

    /// Resolve `name` to an absolute-ish invocable path.
    pub fn resolve(&self, name: &str) -> TexforgeResult<PathBuf> {
        if let Some(hit) = self.memo.lock().expect("resolver memo poisoned").get(name) {
            return Ok(hit.clone());
        }

        let found = self.locate(name)?;
        self.memo
            .lock()
            .expect("resolver memo poisoned")
            .insert(name.to_string(), found.clone());
        Ok(found)
    }

    fn locate(&self, name: &str) -> TexforgeResult<PathBuf> {
        if let Some(explicit) = self.overrides.get(name) {
            return Ok(explicit.clone());
        }

        if let Some(dir) = &self.search_dir
            && let Some(hit) = probe_dir(dir, name)
        {
            return Ok(hit);
        }

        if let Ok(hit) = which::which(name) {
            return Ok(hit);
        }

        Err(TexforgeError::BinaryNotFound {
            name: name.to_string(),
            detail: format!(
                "searched {}PATH; configure an explicit binary path for '{name}'",
                self.search_dir
                    .as_deref()
                    .map(|d| format!("'{}' and ", d.display()))
                    .unwrap_or_default()
            ),
        })
    }
}

fn probe_dir(dir: &Path, name: &str) -> Option<PathBuf> {
    let bare = dir.join(name);
    if bare.is_file() {
        return Some(bare);
    }
    if !std::env::consts::EXE_SUFFIX.is_empty() {
        let suffixed = dir.join(format!("{name}{}", std::env::consts::EXE_SUFFIX));
        if suffixed.is_file() {
            return Some(suffixed);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_override_wins_even_when_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        // Put a real candidate in the search dir; the override must still win.
        std::fs::write(dir.path().join("tool"), "").unwrap();
        let resolver = BinaryResolver::new(Some(dir.path().to_path_buf()))
            .with_override("tool", "/nonexistent/override/tool");
        let path = resolver.resolve("tool").unwrap();
        assert_eq!(path, PathBuf::from("/nonexistent/override/tool"));
    }

    #[test]
    fn search_dir_is_probed_before_path() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("texforge-test-tool");
        std::fs::write(&candidate, "").unwrap();
        let resolver = BinaryResolver::new(Some(dir.path().to_path_buf()));
        assert_eq!(resolver.resolve("texforge-test-tool").unwrap(), candidate);
    }

    #[test]
    fn exhausted_search_names_the_tool_and_remediation() {
        let resolver = BinaryResolver::new(None);
        let err = resolver.resolve("texforge-definitely-missing").unwrap_err();
        match err {
            TexforgeError::BinaryNotFound { name, detail } => {
                assert_eq!(name, "texforge-definitely-missing");
                assert!(detail.contains("explicit"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolution_is_memoized() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("memo-tool");
        std::fs::write(&candidate, "").unwrap();
        let resolver = BinaryResolver::new(Some(dir.path().to_path_buf()));
        let first = resolver.resolve("memo-tool").unwrap();

        // Removing the file does not disturb the memoized result.
        std::fs::remove_file(&candidate).unwrap();
        assert_eq!(resolver.resolve("memo-tool").unwrap(), first);
    }
}
