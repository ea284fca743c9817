use crate::exec::{BinaryResolver, ProcessRunner};
use crate::foundation::cancel::CancelToken;
use crate::foundation::error::{TexforgeError, TexforgeResult};
use crate::pipeline::request::RenderRequest;
use crate::typeset::source::{parse_typeset_log, synthesize_source};
use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const SOURCE_FILE: &str = "expression.tex";
const LOG_FILE: &str = "expression.log";
const INTERMEDIATE_FILE: &str = "expression.dvi";
const VECTOR_FILE: &str = "expression.svg";

/// Configuration for [`TypesetStage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypesetConfig {
    /// Typesetting tool name (resolved via PATH when no override is set).
    pub tex_binary: String,
    /// Vector-conversion tool name.
    pub converter_binary: String,
    /// Explicit typesetting tool path; wins unconditionally when set.
    pub tex_override: Option<PathBuf>,
    /// Explicit converter path; wins unconditionally when set.
    pub converter_override: Option<PathBuf>,
    /// Directory probed for both tools before the PATH scan.
    pub search_dir: Option<PathBuf>,
    /// Wall-clock deadline per tool invocation.
    pub timeout: Duration,
    /// Subprocess exit/cancellation poll granularity.
    pub poll_interval: Duration,
    /// Keep the working-directory root on disk after the stage is dropped.
    pub retain_work_dirs: bool,
}

impl Default for TypesetConfig {
    fn default() -> Self {
        Self {
            tex_binary: "latex".into(),
            converter_binary: "dvisvgm".into(),
            tex_override: None,
            converter_override: None,
            search_dir: None,
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(50),
            retain_work_dirs: false,
        }
    }
}

#[derive(Debug)]
enum WorkRoot {
    Ephemeral(tempfile::TempDir),
    Retained(PathBuf),
}

impl WorkRoot {
    fn path(&self) -> &Path {
        match self {
            Self::Ephemeral(dir) => dir.path(),
            Self::Retained(path) => path,
        }
    }
}

/// Drives the two external tools for one request and returns the vector
/// document text.
///
/// Each attempt gets a fresh uniquely-named working directory under a
/// stage-owned temp root; diagnostic files written into it (tool logs,
/// timeout sidecars) are retained for the stage's lifetime so failures can
/// be inspected after the fact.
///
/// Overlapping calls are a caller bug (the queue stage is responsible for
/// preventing overlap) and surface as a validation error instead of
/// corrupting the in-flight attempt.
#[derive(Debug)]
pub struct TypesetStage {
    cfg: TypesetConfig,
    resolver: BinaryResolver,
    runner: ProcessRunner,
    root: WorkRoot,
    seq: AtomicU64,
    busy: Mutex<()>,
}

impl TypesetStage {
    /// Create the stage, its resolver, and its working-directory root.
    pub fn new(cfg: TypesetConfig) -> TexforgeResult<Self> {
        let mut resolver = BinaryResolver::new(cfg.search_dir.clone());
        if let Some(path) = &cfg.tex_override {
            resolver = resolver.with_override(cfg.tex_binary.clone(), path.clone());
        }
        if let Some(path) = &cfg.converter_override {
            resolver = resolver.with_override(cfg.converter_binary.clone(), path.clone());
        }

        let tmp = tempfile::TempDir::with_prefix("texforge-")
            .context("failed to create working-directory root")?;
        let root = if cfg.retain_work_dirs {
            WorkRoot::Retained(tmp.keep())
        } else {
            WorkRoot::Ephemeral(tmp)
        };

        let runner = ProcessRunner {
            timeout: cfg.timeout,
            poll_interval: cfg.poll_interval,
        };

        Ok(Self {
            cfg,
            resolver,
            runner,
            root,
            seq: AtomicU64::new(0),
            busy: Mutex::new(()),
        })
    }

    /// The working-directory root, for operator inspection.
    pub fn work_root(&self) -> &Path {
        self.root.path()
    }

    /// Typeset `request` and return the vector document text.
    #[tracing::instrument(skip(self, request, token), fields(source_len = request.source().len()))]
    pub fn render_to_vector(
        &self,
        request: &RenderRequest,
        token: &CancelToken,
    ) -> TexforgeResult<String> {
        let _busy = self.busy.try_lock().map_err(|_| {
            TexforgeError::validation(
                "overlapping render_to_vector call; serialize access through a queue stage",
            )
        })?;
        token.checkpoint()?;

        let attempt = self.seq.fetch_add(1, Ordering::Relaxed);
        let dir = self.root.path().join(format!("render-{attempt:04}"));
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create working directory '{}'", dir.display()))?;
        tracing::debug!(dir = %dir.display(), "typesetting request");

        std::fs::write(dir.join(SOURCE_FILE), synthesize_source(request))
            .context("failed to write synthesized source")?;

        self.run_typeset_tool(&dir, token)?;
        self.run_converter_tool(&dir, token)?;

        token.checkpoint()?;
        let vector = std::fs::read_to_string(dir.join(VECTOR_FILE))
            .context("vector output missing after conversion")?;
        Ok(vector)
    }

    fn run_typeset_tool(&self, dir: &Path, token: &CancelToken) -> TexforgeResult<()> {
        token.checkpoint()?;
        let tex = self.resolver.resolve(&self.cfg.tex_binary)?;
        let args: Vec<OsString> = vec![
            "-interaction=nonstopmode".into(),
            "-halt-on-error".into(),
            "-output-directory".into(),
            dir.as_os_str().to_os_string(),
            SOURCE_FILE.into(),
        ];
        let outcome = self.runner.run(dir, &tex, args, &tool_env(&tex), token)?;
        if outcome.success() {
            return Ok(());
        }

        // Prefer the tool's own log; its error lines are far more legible
        // than the stderr stream.
        let log = std::fs::read_to_string(dir.join(LOG_FILE)).unwrap_or_default();
        let diagnostic = parse_typeset_log(&log)
            .unwrap_or_else(|| format!("exit code {}: {}", outcome.exit_code, outcome.stderr.trim()));
        Err(TexforgeError::typeset(diagnostic))
    }

    fn run_converter_tool(&self, dir: &Path, token: &CancelToken) -> TexforgeResult<()> {
        token.checkpoint()?;
        let converter = self.resolver.resolve(&self.cfg.converter_binary)?;
        let args: Vec<OsString> = vec![
            "--no-fonts".into(),
            INTERMEDIATE_FILE.into(),
            "-o".into(),
            VECTOR_FILE.into(),
        ];
        let outcome = self
            .runner
            .run(dir, &converter, args, &tool_env(&converter), token)?;
        if outcome.success() {
            return Ok(());
        }
        Err(TexforgeError::vector_convert(format!(
            "exit code {}: {}",
            outcome.exit_code,
            outcome.stderr.trim()
        )))
    }
}

/// `PATH` overlay prepending the resolved tool's own directory, so companion
/// support files next to the binary are found.
fn tool_env(program: &Path) -> Vec<(OsString, OsString)> {
    let mut paths: Vec<PathBuf> = Vec::new();
    if let Some(parent) = program.parent()
        && !parent.as_os_str().is_empty()
    {
        paths.push(parent.to_path_buf());
    }
    if let Some(existing) = std::env::var_os("PATH") {
        paths.extend(std::env::split_paths(&existing));
    }
    match std::env::join_paths(paths) {
        Ok(joined) => vec![(OsString::from("PATH"), joined)],
        Err(_) => Vec::new(),
    }
}
