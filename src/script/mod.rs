//! The built-in line-oriented workload script.
//!
//! Each non-blank line that does not start with `#` is one step:
//!
//! ```text
//! # comment
//! sleep 100
//! log hello from the worker
//! ```
//!
//! Every step is registered as a test, numbered from 1 in file order.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::error::{AppResult, ConfigError, ValidationError};
use crate::process::{RunContext, TestRegistry, Workload, WorkloadFactory};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Sleep(Duration),
    Log(String),
}

impl ScriptStep {
    /// # Errors
    ///
    /// Returns an error for an unknown keyword or a bad sleep duration.
    pub fn parse(line: &str) -> Result<Self, ValidationError> {
        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(keyword, rest)| (keyword, rest.trim()));
        match keyword {
            "sleep" => rest
                .parse::<u64>()
                .map(|millis| ScriptStep::Sleep(Duration::from_millis(millis)))
                .map_err(|err| ValidationError::InvalidSleep {
                    value: rest.to_owned(),
                    source: err,
                }),
            "log" => Ok(ScriptStep::Log(rest.to_owned())),
            _ => Err(ValidationError::UnknownScriptStep {
                value: line.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct ScriptLine {
    test: u32,
    description: String,
    step: ScriptStep,
}

/// A parsed workload script.
#[derive(Debug, Clone)]
pub struct Script {
    path: PathBuf,
    lines: Vec<ScriptLine>,
}

impl Script {
    /// Reads and parses the script at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ScriptUnreadable`] if the file cannot be
    /// read, or a parse error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::ScriptUnreadable {
            path: path.to_path_buf(),
            source: err,
        })?;
        Self::parse(path, &text)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidScript`] naming the first bad line, or
    /// [`ConfigError::EmptyScript`] if there are no steps.
    pub fn parse(path: &Path, text: &str) -> Result<Self, ConfigError> {
        let mut lines = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let step = ScriptStep::parse(line).map_err(|err| ConfigError::InvalidScript {
                path: path.to_path_buf(),
                line: index.saturating_add(1),
                source: err,
            })?;
            let test = u32::try_from(lines.len().saturating_add(1)).unwrap_or(u32::MAX);
            lines.push(ScriptLine {
                test,
                description: line.to_owned(),
                step,
            });
        }
        if lines.is_empty() {
            return Err(ConfigError::EmptyScript {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            lines,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn steps(&self) -> impl Iterator<Item = &ScriptStep> {
        self.lines.iter().map(|line| &line.step)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Creates one [`ScriptWorkload`] per execution thread, all sharing a
/// script and a test registry.
#[derive(Debug, Clone)]
pub struct ScriptWorkloadFactory {
    script: Arc<Script>,
    registry: Arc<TestRegistry>,
}

impl ScriptWorkloadFactory {
    /// Registers every step of `script` as a test in `registry`.
    #[must_use]
    pub fn new(script: Script, registry: Arc<TestRegistry>) -> Self {
        for line in &script.lines {
            registry.register(line.test, &line.description);
        }
        Self {
            script: Arc::new(script),
            registry,
        }
    }
}

impl WorkloadFactory for ScriptWorkloadFactory {
    fn create(&self, _thread_id: usize) -> AppResult<Box<dyn Workload>> {
        Ok(Box::new(ScriptWorkload {
            script: Arc::clone(&self.script),
            registry: Arc::clone(&self.registry),
        }))
    }
}

/// Runs every script step in order, timing each as a test.
#[derive(Debug)]
pub struct ScriptWorkload {
    script: Arc<Script>,
    registry: Arc<TestRegistry>,
}

impl Workload for ScriptWorkload {
    fn run_iteration(&mut self, ctx: &RunContext<'_>) -> AppResult<()> {
        for line in &self.script.lines {
            let started = Instant::now();
            match &line.step {
                ScriptStep::Sleep(duration) => {
                    if ctx.shutdown.sleep(*duration) {
                        // Interrupted steps are not counted.
                        return Ok(());
                    }
                }
                ScriptStep::Log(text) => {
                    info!("thread {} run {}: {}", ctx.thread_id, ctx.run, text);
                }
            }
            self.registry.record(line.test, true, started.elapsed());
        }
        Ok(())
    }
}
