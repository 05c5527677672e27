use serde::Deserialize;
use std::{env, fs, path::PathBuf};
use tracing::debug;

/// Filesystem contract with the external script plus the launcher to use.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Program that runs the script (receives the script path as its first argument).
    pub interpreter: String,
    /// Script location, relative to the working directory.
    pub script_path: PathBuf,
    /// Directory the script writes its artifacts into, relative to the working directory.
    pub output_dir: PathBuf,
    /// Durable artifact storage, relative to the working directory.
    pub data_dir: PathBuf,
    /// When set, passed to the script ahead of `output_dir` as an auxiliary output location.
    pub secondary_output_dir: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            interpreter: env::var("ANALYSIS_INTERPRETER")
                .unwrap_or_else(|_| "python3".to_string()),
            script_path: PathBuf::from("python").join("script.py"),
            output_dir: PathBuf::from("python"),
            data_dir: PathBuf::from("data"),
            secondary_output_dir: None,
        }
    }
}

impl RunnerConfig {
    /// Load the runner config from the first JSON file found, or fall back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        match resolve_runner_json_path() {
            Some(path) => {
                debug!("Loading runner config from {}", path.display());
                let raw = fs::read_to_string(&path)?;
                Self::from_json_str(&raw)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse a runner config document and expand `${VAR}` references in it.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let cfg: RunnerConfig = serde_json::from_str(raw)?;
        Ok(cfg.expanded())
    }

    fn expanded(mut self) -> Self {
        self.interpreter = expand_env_vars(&self.interpreter);
        self.script_path = expand_path(&self.script_path);
        self.output_dir = expand_path(&self.output_dir);
        self.data_dir = expand_path(&self.data_dir);
        self.secondary_output_dir = self.secondary_output_dir.as_deref().map(expand_path);
        self
    }
}

/// Locate a runner config file: `ANALYSIS_RUNNER_CONFIG`, then the XDG config dir, then `./runner.json`.
pub fn resolve_runner_json_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("ANALYSIS_RUNNER_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("analysis-runner").join("runner.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("runner.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

fn expand_path(path: &std::path::Path) -> PathBuf {
    PathBuf::from(expand_env_vars(&path.to_string_lossy()))
}

/// Replace `${NAME}` with the value of the environment variable `NAME`.
///
/// Unknown variables are left untouched.
fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            match env::var(&name) {
                Ok(val) => out.push_str(&val),
                Err(_) => {
                    out.push_str("${");
                    out.push_str(&name);
                    out.push('}');
                }
            }
        } else {
            out.push(ch);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let cfg = RunnerConfig::default();
        assert_eq!(cfg.script_path, PathBuf::from("python/script.py"));
        assert_eq!(cfg.output_dir, PathBuf::from("python"));
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
        assert!(cfg.secondary_output_dir.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = RunnerConfig::from_json_str(
            r#"{ "interpreter": "python3.12", "secondary_output_dir": "scanpy" }"#,
        )
        .unwrap();
        assert_eq!(cfg.interpreter, "python3.12");
        assert_eq!(cfg.secondary_output_dir, Some(PathBuf::from("scanpy")));
        assert_eq!(cfg.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn test_expand_known_and_unknown_vars() {
        // PATH is set in every test environment.
        let path = env::var("PATH").unwrap();
        assert_eq!(expand_env_vars("${PATH}/bin"), format!("{path}/bin"));
        assert_eq!(
            expand_env_vars("${ANALYSIS_RUNNER_SURELY_UNSET_VAR}/x"),
            "${ANALYSIS_RUNNER_SURELY_UNSET_VAR}/x"
        );
        assert_eq!(expand_env_vars("plain $HOME"), "plain $HOME");
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(RunnerConfig::from_json_str("{ not json").is_err());
    }
}
