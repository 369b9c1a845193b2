//! Manifest-driven ability loader — `~/.warden/abilities/<name>/ability.toml`.
//!
//! ```text
//! ~/.warden/abilities/
//!   weather_prefetch/
//!     ability.toml
//!     run.py
//!     preprocess.py   (optional)
//! ```
//!
//! ```toml
//! name        = "weather_prefetch"
//! description = "Looks up current weather for any city mentioned in the message"
//! input_type  = "text"     # "*" matches everything
//!
//! [run]
//! command = "python3"
//! script  = "run.py"
//! timeout = 20
//!
//! [pre_process]
//! command = "python3"
//! script  = "preprocess.py"
//!
//! [[input.params]]
//! name        = "city"
//! type        = "string"
//! description = "City name"
//! required    = true
//! ```
//!
//! Validation runs in three passes before an ability is registered: syntax
//! (does the TOML parse), structural (are the required fields present and
//! sane), and instance (does the declared entry-point script actually exist
//! on disk, is the declared interpreter resolvable on `PATH`). Any failure
//! skips the ability with a warning — a broken manifest never stops the
//! rest of the directory from loading.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::tools::ToolResult;

use super::Ability;

const VALID_PARAM_TYPES: &[&str] = &["string", "integer", "number", "boolean", "object", "array"];

#[derive(Debug, Deserialize)]
struct AbilityManifest {
    name: String,
    description: String,
    #[serde(default = "default_input_type")]
    input_type: String,
    run: RunConfig,
    #[serde(default)]
    pre_process: Option<RunConfig>,
    #[serde(default)]
    input: InputConfig,
}

fn default_input_type() -> String {
    "text".to_string()
}

#[derive(Debug, Deserialize, Clone)]
struct RunConfig {
    command: String,
    script: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
}

fn default_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Default)]
struct InputConfig {
    #[serde(default)]
    params: Vec<ParamDef>,
}

#[derive(Debug, Deserialize)]
struct ParamDef {
    name: String,
    #[serde(rename = "type")]
    type_: String,
    description: String,
    #[serde(default)]
    required: bool,
}

/// Structural + instance validation, run after the TOML has already parsed.
fn validate(manifest: &AbilityManifest, dir: &Path) -> Result<(), String> {
    if manifest.name.trim().is_empty() {
        return Err("missing name".to_string());
    }
    if manifest.description.trim().is_empty() {
        return Err("missing description".to_string());
    }
    check_run_config(&manifest.run, dir)?;
    if let Some(pp) = &manifest.pre_process {
        check_run_config(pp, dir)?;
    }
    for param in &manifest.input.params {
        if param.name.trim().is_empty() {
            return Err("a parameter is missing a name".to_string());
        }
        if !VALID_PARAM_TYPES.contains(&param.type_.as_str()) {
            return Err(format!("param '{}' has invalid type '{}'", param.name, param.type_));
        }
    }
    Ok(())
}

fn check_run_config(run: &RunConfig, dir: &Path) -> Result<(), String> {
    if run.command.trim().is_empty() {
        return Err("run.command is empty".to_string());
    }
    let script_path = dir.join(&run.script);
    if !script_path.exists() {
        return Err(format!("entry point '{}' does not exist", script_path.display()));
    }
    if !interpreter_resolvable(&run.command) {
        return Err(format!("interpreter '{}' not found on PATH", run.command));
    }
    Ok(())
}

/// Instance check: does the declared interpreter actually resolve on PATH?
fn interpreter_resolvable(command: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {command}"))
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

pub struct ManifestAbility {
    manifest: AbilityManifest,
    dir: PathBuf,
}

impl ManifestAbility {
    fn load(dir: &Path) -> Option<Self> {
        let manifest_path = dir.join("ability.toml");
        let content = std::fs::read_to_string(&manifest_path)
            .map_err(|e| warn!(path = %manifest_path.display(), error = %e, "cannot read ability.toml"))
            .ok()?;
        let manifest: AbilityManifest = toml::from_str(&content)
            .map_err(|e| warn!(path = %manifest_path.display(), error = %e, "invalid ability.toml (syntax)"))
            .ok()?;
        if let Err(e) = validate(&manifest, dir) {
            warn!(path = %manifest_path.display(), error = %e, "invalid ability.toml (structural/instance)");
            return None;
        }
        Some(Self { manifest, dir: dir.to_path_buf() })
    }

    fn build_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required: Vec<serde_json::Value> = Vec::new();
        for param in &self.manifest.input.params {
            properties.insert(
                param.name.clone(),
                serde_json::json!({ "type": param.type_, "description": param.description }),
            );
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }
        serde_json::json!({ "type": "object", "properties": properties, "required": required })
    }

    async fn run(&self, run: &RunConfig, input_env: &str) -> Result<String, String> {
        let script_path = self.dir.join(&run.script);
        let cmd = tokio::process::Command::new(&run.command)
            .arg(&script_path)
            .env("WARDEN_INPUT", input_env)
            .current_dir(&self.dir)
            .output();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(run.timeout), cmd).await;
        match outcome {
            Err(_) => Err(format!("timed out after {}s", run.timeout)),
            Ok(Err(e)) => Err(format!("failed to launch: {e}")),
            Ok(Ok(out)) => {
                let stdout = String::from_utf8_lossy(&out.stdout).trim().to_string();
                if out.status.success() {
                    Ok(stdout)
                } else {
                    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                    Err(format!("{stdout}\n[stderr]: {stderr}\n[exit: {}]", out.status.code().unwrap_or(-1)))
                }
            }
        }
    }
}

#[async_trait]
impl Ability for ManifestAbility {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn handles_input_type(&self, input_type: &str) -> bool {
        self.manifest.input_type == "*" || self.manifest.input_type == input_type
    }

    fn input_schema(&self) -> serde_json::Value {
        self.build_schema()
    }

    async fn pre_process(&self, content: &str) -> Option<String> {
        let run = self.manifest.pre_process.clone()?;
        match self.run(&run, content).await {
            Ok(rewritten) if !rewritten.is_empty() => Some(rewritten),
            Ok(_) => None,
            Err(e) => {
                warn!(ability = %self.manifest.name, error = %e, "ability pre_process failed");
                None
            }
        }
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        match self.run(&self.manifest.run.clone(), &input.to_string()).await {
            Ok(out) if out.is_empty() => ToolResult::success("(no output)".to_string()),
            Ok(out) => ToolResult::success(out),
            Err(e) => ToolResult::error(e),
        }
    }

    fn ensure_dependencies(&self) -> Result<(), String> {
        check_run_config(&self.manifest.run, &self.dir)?;
        if let Some(pp) = &self.manifest.pre_process {
            check_run_config(pp, &self.dir)?;
        }
        Ok(())
    }
}

/// Scan `abilities_dir` for subdirectories containing `ability.toml` and
/// load each as a `ManifestAbility`. Invalid manifests are skipped, not
/// fatal to the rest of the scan.
pub fn load_abilities(abilities_dir: &Path) -> Vec<Box<dyn Ability>> {
    let mut abilities: Vec<Box<dyn Ability>> = Vec::new();

    let entries = match std::fs::read_dir(abilities_dir) {
        Ok(e) => e,
        Err(_) => return abilities,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && path.join("ability.toml").exists() {
            match ManifestAbility::load(&path) {
                Some(ability) => {
                    info!(name = %ability.manifest.name, dir = %path.display(), "loaded ability");
                    abilities.push(Box::new(ability));
                }
                None => warn!(dir = %path.display(), "skipped ability: invalid manifest"),
            }
        }
    }

    abilities
}
