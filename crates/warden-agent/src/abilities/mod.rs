//! Ability Registry & Loader.
//!
//! Abilities are distinct from ordinary tools: a tool only runs when the
//! model decides to call it. An ability also gets a look at the inbound
//! message *before* the model sees it (`pre_process`), declares which kinds
//! of input it applies to (`handles_input_type`), and is tracked for
//! reliability — repeated failures disable it automatically rather than
//! letting a broken ability keep eating every turn's latency budget.
//!
//! Loaded the same way `~/.warden/tools/` script plugins are (one directory
//! per ability, a manifest plus an entry point) — see `tools::script_tool`
//! for the sibling convention this mirrors.

mod manifest;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::tools::ToolResult;

pub use manifest::load_abilities;

/// Failures after which a loaded (non-bundled) ability is automatically
/// disabled. Bundled abilities are only warned about — they ship with the
/// binary and disabling them silently would be more surprising than useful.
const FAILURE_THRESHOLD: u32 = 5;
/// Wall-clock cap on a single ability execution.
const EXECUTION_TIMEOUT_SECS: u64 = 120;

#[async_trait]
pub trait Ability: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Declares which inbound content this ability acts on (`"text"`,
    /// `"image"`, `"reminder"`, ...). `"*"` matches every input type.
    fn handles_input_type(&self, input_type: &str) -> bool;
    fn input_schema(&self) -> serde_json::Value;
    /// Runs before the model sees the message. `Some(text)` replaces the
    /// content that reaches the model; `None` leaves it untouched.
    async fn pre_process(&self, content: &str) -> Option<String>;
    async fn execute(&self, input: serde_json::Value) -> ToolResult;
    /// Checked before the ability is allowed to be enabled — missing
    /// binaries or environment fail this rather than failing at call time.
    fn ensure_dependencies(&self) -> Result<(), String>;
}

struct AbilityState {
    enabled: bool,
    consecutive_failures: u32,
}

/// Holds every known ability and its reliability state.
///
/// The ability list itself (`Vec<Box<dyn Ability>>`) is plain, immutable
/// data — only the enabled/failure-count state is behind a lock, and that
/// lock is never held across an `.await`.
pub struct AbilityRegistry {
    abilities: Vec<Box<dyn Ability>>,
    bundled: Vec<bool>,
    state: Mutex<HashMap<String, AbilityState>>,
}

impl AbilityRegistry {
    pub fn new() -> Self {
        Self {
            abilities: Vec::new(),
            bundled: Vec::new(),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Register an ability. `bundled` abilities are compiled into the
    /// binary and are never auto-disabled by the failure counter.
    pub fn register(&mut self, ability: Box<dyn Ability>, bundled: bool) {
        let enabled = ability.ensure_dependencies().is_ok();
        if !enabled {
            warn!(name = ability.name(), "ability dependencies unmet — registered disabled");
        }
        self.state.lock().unwrap().insert(
            ability.name().to_string(),
            AbilityState { enabled, consecutive_failures: 0 },
        );
        self.abilities.push(ability);
        self.bundled.push(bundled);
    }

    fn find(&self, name: &str) -> Option<&dyn Ability> {
        self.abilities.iter().find(|a| a.name() == name).map(|a| a.as_ref())
    }

    fn is_bundled(&self, name: &str) -> bool {
        self.abilities
            .iter()
            .position(|a| a.name() == name)
            .map(|i| self.bundled[i])
            .unwrap_or(true)
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.state.lock().unwrap().get(name).map(|s| s.enabled).unwrap_or(false)
    }

    pub fn enable(&self, name: &str) -> Result<(), String> {
        let ability = self.find(name).ok_or_else(|| format!("no ability named '{name}'"))?;
        ability.ensure_dependencies()?;
        let mut state = self.state.lock().unwrap();
        if let Some(s) = state.get_mut(name) {
            s.enabled = true;
            s.consecutive_failures = 0;
        }
        Ok(())
    }

    pub fn disable(&self, name: &str) {
        if let Some(s) = self.state.lock().unwrap().get_mut(name) {
            s.enabled = false;
        }
    }

    /// Run every enabled ability that handles `input_type` over `content`,
    /// threading each ability's rewrite into the next. The engine's
    /// ability-first pre-processing step.
    pub async fn pre_process_all(&self, input_type: &str, content: &str) -> String {
        let mut current = content.to_string();
        for ability in &self.abilities {
            if !self.is_enabled(ability.name()) || !ability.handles_input_type(input_type) {
                continue;
            }
            if let Some(rewritten) = ability.pre_process(&current).await {
                current = rewritten;
            }
        }
        current
    }

    /// Run an ability's `execute` under the execution timeout, updating its
    /// failure counter (and auto-disabling loaded abilities past the
    /// threshold).
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> ToolResult {
        let ability = match self.find(name) {
            Some(a) => a,
            None => return ToolResult::error(format!("ability '{name}' not found")),
        };
        if !self.is_enabled(name) {
            return ToolResult::error(format!("ability '{name}' is disabled"));
        }

        let outcome = tokio::time::timeout(
            Duration::from_secs(EXECUTION_TIMEOUT_SECS),
            ability.execute(input),
        )
        .await;

        match outcome {
            Err(_) => {
                self.record_failure(name);
                ToolResult::error(format!("ability '{name}' timed out after {EXECUTION_TIMEOUT_SECS}s"))
            }
            Ok(result) => {
                if result.is_error {
                    self.record_failure(name);
                } else {
                    self.record_success(name);
                }
                result
            }
        }
    }

    fn record_failure(&self, name: &str) {
        let bundled = self.is_bundled(name);
        let mut state = self.state.lock().unwrap();
        if let Some(s) = state.get_mut(name) {
            s.consecutive_failures += 1;
            if s.consecutive_failures >= FAILURE_THRESHOLD {
                if bundled {
                    warn!(name, failures = s.consecutive_failures, "bundled ability failing repeatedly");
                } else {
                    s.enabled = false;
                    warn!(name, "ability auto-disabled after {FAILURE_THRESHOLD} consecutive failures");
                }
            }
        }
    }

    fn record_success(&self, name: &str) {
        if let Some(s) = self.state.lock().unwrap().get_mut(name) {
            s.consecutive_failures = 0;
        }
    }

    /// Tool-shaped definitions for every enabled ability, for inclusion
    /// alongside ordinary tools in the model's tool list.
    pub fn definitions(&self) -> Vec<(String, String, serde_json::Value)> {
        self.abilities
            .iter()
            .filter(|a| self.is_enabled(a.name()))
            .map(|a| (a.name().to_string(), a.description().to_string(), a.input_schema()))
            .collect()
    }
}

impl Default for AbilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlakyAbility;

    #[async_trait]
    impl Ability for FlakyAbility {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn handles_input_type(&self, input_type: &str) -> bool {
            input_type == "text"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn pre_process(&self, _content: &str) -> Option<String> {
            None
        }
        async fn execute(&self, _input: serde_json::Value) -> ToolResult {
            ToolResult::error("boom")
        }
        fn ensure_dependencies(&self) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn loaded_ability_auto_disables_after_threshold() {
        let mut reg = AbilityRegistry::new();
        reg.register(Box::new(FlakyAbility), false);

        for _ in 0..FAILURE_THRESHOLD {
            assert!(reg.is_enabled("flaky"));
            reg.execute("flaky", serde_json::json!({})).await;
        }
        assert!(!reg.is_enabled("flaky"));
    }

    #[tokio::test]
    async fn bundled_ability_is_not_auto_disabled() {
        let mut reg = AbilityRegistry::new();
        reg.register(Box::new(FlakyAbility), true);

        for _ in 0..(FAILURE_THRESHOLD + 2) {
            reg.execute("flaky", serde_json::json!({})).await;
        }
        assert!(reg.is_enabled("flaky"));
    }

    #[test]
    fn handles_input_type_filters_pre_process_candidates() {
        let a = FlakyAbility;
        assert!(a.handles_input_type("text"));
        assert!(!a.handles_input_type("image"));
    }
}
