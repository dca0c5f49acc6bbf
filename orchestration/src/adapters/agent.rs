//! Agent-CLI adapter contract and registry.
//!
//! An adapter wraps one coding-assistant CLI: detection, spawning, output
//! injection and its plan-enforcement strategy. The registry detects all
//! adapters at startup and resolves model ids deterministically in
//! registered-insertion order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AdapterError, AdapterResult};
use crate::util::{pid_alive, run_with_timeout, CommandOutcome};

/// Detection probe outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterDetection {
    pub available: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// How an adapter keeps its agent on-plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnforcementType {
    Hooks,
    GitHooks,
    Wrapper,
    FileWatcher,
}

/// Declared enforcement strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementStrategy {
    #[serde(rename = "type")]
    pub kind: EnforcementType,
    pub details: String,
}

/// Options for spawning an agent.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub task_id: String,
    pub prompt: String,
    pub model: Option<String>,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
}

/// Result of a successful spawn.
#[derive(Debug, Clone)]
pub struct SpawnResult {
    pub pid: u32,
    pub session_id: String,
}

/// The agent-CLI contract. Implementations must be side-effect free until
/// `spawn` is called.
pub trait AgentAdapter: Send + Sync {
    /// Stable machine identifier.
    fn name(&self) -> &str;

    /// Human-readable name.
    fn display_name(&self) -> &str;

    /// Probe the host for this CLI.
    fn detect(&self) -> AdapterDetection;

    /// Model ids this adapter can drive.
    fn list_models(&self) -> Vec<String>;

    /// The shell command that would launch the agent.
    fn build_command(&self, opts: &SpawnOptions) -> String;

    /// Launch the agent process.
    fn spawn(&self, opts: &SpawnOptions) -> AdapterResult<SpawnResult>;

    /// Inject content into a running session. Returns false when the
    /// session cannot accept input.
    fn inject(&self, session_id: &str, content: &str) -> AdapterResult<bool>;

    /// Read the last `lines` of session output.
    fn read_output(&self, session_id: &str, lines: usize) -> AdapterResult<Vec<String>>;

    /// Liveness probe for a spawned session.
    fn is_alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }

    /// Stop a running session.
    fn stop(&self, pid: u32) -> AdapterResult<()>;

    /// How this adapter enforces plan adherence.
    fn enforcement_strategy(&self) -> EnforcementStrategy;
}

/// A generic adapter for any prompt-taking CLI, configured with a program
/// name and argument template.
pub struct CliAgentAdapter {
    name: String,
    display_name: String,
    program: String,
    /// Arguments; `{prompt}` and `{model}` are substituted.
    args_template: Vec<String>,
    models: Vec<String>,
    enforcement: EnforcementStrategy,
}

impl CliAgentAdapter {
    pub fn new(
        name: &str,
        display_name: &str,
        program: &str,
        args_template: Vec<String>,
        models: Vec<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            program: program.to_string(),
            args_template,
            models,
            enforcement: EnforcementStrategy {
                kind: EnforcementType::Hooks,
                details: "pre-tool hook invokes the drift guardrail".to_string(),
            },
        }
    }

    pub fn with_enforcement(mut self, enforcement: EnforcementStrategy) -> Self {
        self.enforcement = enforcement;
        self
    }

    fn render_args(&self, opts: &SpawnOptions) -> Vec<String> {
        self.args_template
            .iter()
            .map(|arg| {
                arg.replace("{prompt}", &opts.prompt)
                    .replace("{model}", opts.model.as_deref().unwrap_or_default())
            })
            .collect()
    }
}

impl AgentAdapter for CliAgentAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn detect(&self) -> AdapterDetection {
        let Some(path) = which(&self.program) else {
            return AdapterDetection {
                available: false,
                version: None,
                path: None,
            };
        };
        let version = match run_with_timeout(
            &self.program,
            &["--version"],
            Path::new("."),
            Duration::from_secs(5),
        ) {
            Ok(CommandOutcome::Completed {
                status_code: Some(0),
                stdout,
                ..
            }) => Some(stdout.trim().to_string()),
            _ => None,
        };
        AdapterDetection {
            available: true,
            version,
            path: Some(path),
        }
    }

    fn list_models(&self) -> Vec<String> {
        self.models.clone()
    }

    fn build_command(&self, opts: &SpawnOptions) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in self.render_args(opts) {
            parts.push(shell_quote(&arg));
        }
        parts.join(" ")
    }

    fn spawn(&self, opts: &SpawnOptions) -> AdapterResult<SpawnResult> {
        let mut command = std::process::Command::new(&self.program);
        command
            .args(self.render_args(opts))
            .current_dir(&opts.workdir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null());
        for (key, value) in &opts.env {
            command.env(key, value);
        }

        let child = command
            .spawn()
            .map_err(|e| AdapterError::Unavailable(format!("{}: {e}", self.program)))?;
        Ok(SpawnResult {
            pid: child.id(),
            session_id: format!("{}-{}", self.name, opts.task_id),
        })
    }

    fn inject(&self, _session_id: &str, _content: &str) -> AdapterResult<bool> {
        // A plain CLI process has no input channel once detached; injection
        // rides on the filesystem capsule instead.
        Ok(false)
    }

    fn read_output(&self, _session_id: &str, _lines: usize) -> AdapterResult<Vec<String>> {
        // Output lives in the supervisor's rotating log.
        Ok(Vec::new())
    }

    fn stop(&self, pid: u32) -> AdapterResult<()> {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
        Ok(())
    }

    fn enforcement_strategy(&self) -> EnforcementStrategy {
        self.enforcement.clone()
    }
}

/// Minimal PATH lookup.
fn which(program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let path = PathBuf::from(program);
        return path.exists().then_some(path);
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn shell_quote(arg: &str) -> String {
    if arg.chars().all(|c| c.is_alphanumeric() || "-_./=".contains(c)) {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Registry of adapters with deterministic model resolution.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn AgentAdapter>>,
    detections: HashMap<String, AdapterDetection>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter. Registration order is the tie-break for model
    /// id conflicts.
    pub fn register(&mut self, adapter: Box<dyn AgentAdapter>) {
        self.adapters.push(adapter);
    }

    /// Probe every adapter, caching the results.
    pub fn detect_all(&mut self) {
        for adapter in &self.adapters {
            let detection = adapter.detect();
            debug!(
                adapter = adapter.name(),
                available = detection.available,
                "adapter detection"
            );
            self.detections.insert(adapter.name().to_string(), detection);
        }
    }

    pub fn detection(&self, name: &str) -> Option<&AdapterDetection> {
        self.detections.get(name)
    }

    /// Adapters that detected as available.
    pub fn available(&self) -> Vec<&dyn AgentAdapter> {
        self.adapters
            .iter()
            .filter(|a| {
                self.detections
                    .get(a.name())
                    .map(|d| d.available)
                    .unwrap_or(false)
            })
            .map(|a| a.as_ref())
            .collect()
    }

    /// Resolve a model id. When two adapters claim the same id, the earliest
    /// registered wins.
    pub fn adapter_for_model(&self, model_id: &str) -> AdapterResult<&dyn AgentAdapter> {
        self.adapters
            .iter()
            .find(|a| a.list_models().iter().any(|m| m == model_id))
            .map(|a| a.as_ref())
            .ok_or_else(|| AdapterError::UnknownModel(model_id.to_string()))
    }

    pub fn by_name(&self, name: &str) -> Option<&dyn AgentAdapter> {
        self.adapters
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, models: &[&str]) -> CliAgentAdapter {
        CliAgentAdapter::new(
            name,
            name,
            "sh",
            vec!["-c".into(), "echo {prompt}".into()],
            models.iter().map(|m| m.to_string()).collect(),
        )
    }

    #[test]
    fn test_detect_finds_sh() {
        let detection = adapter("sh-agent", &[]).detect();
        assert!(detection.available);
        assert!(detection.path.is_some());
    }

    #[test]
    fn test_detect_missing_program() {
        let missing = CliAgentAdapter::new(
            "ghost",
            "Ghost",
            "definitely-not-a-real-binary-9321",
            vec![],
            vec![],
        );
        assert!(!missing.detect().available);
    }

    #[test]
    fn test_build_command_substitutes_prompt() {
        let a = adapter("x", &[]);
        let opts = SpawnOptions {
            task_id: "t1".into(),
            prompt: "fix the login".into(),
            model: None,
            workdir: PathBuf::from("."),
            env: vec![],
        };
        let command = a.build_command(&opts);
        assert!(command.starts_with("sh -c"));
        assert!(command.contains("fix the login"));
    }

    #[test]
    fn test_model_resolution_is_registration_order() {
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(adapter("first", &["shared-model", "only-first"])));
        registry.register(Box::new(adapter("second", &["shared-model"])));

        let resolved = registry.adapter_for_model("shared-model").unwrap();
        assert_eq!(resolved.name(), "first");

        let resolved = registry.adapter_for_model("only-first").unwrap();
        assert_eq!(resolved.name(), "first");

        assert!(matches!(
            registry.adapter_for_model("nobody-has-this"),
            Err(AdapterError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_available_filters_on_detection() {
        let mut registry = AdapterRegistry::new();
        registry.register(Box::new(adapter("real", &[])));
        registry.register(Box::new(CliAgentAdapter::new(
            "ghost",
            "Ghost",
            "definitely-not-a-real-binary-9321",
            vec![],
            vec![],
        )));
        registry.detect_all();

        let available = registry.available();
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name(), "real");
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain-arg"), "plain-arg");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
