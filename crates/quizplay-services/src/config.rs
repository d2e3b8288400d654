//! Configuration loading and collaborator factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizplay_core::traits::HostNotifier;

use crate::memory::InMemoryPersistence;
use crate::notifier::{LogNotifier, StdoutNotifier};

/// Where committed responses go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PersistenceConfig {
    Memory {
        /// Question indices whose saves are always rejected.
        #[serde(default)]
        fail_indices: Vec<usize>,
        #[serde(default)]
        fail_all: bool,
    },
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        PersistenceConfig::Memory {
            fail_indices: Vec::new(),
            fail_all: false,
        }
    }
}

/// Where host notifications go.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NotifierConfig {
    #[default]
    Stdout,
    Log,
}

impl std::str::FromStr for NotifierConfig {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "stdout" => Ok(NotifierConfig::Stdout),
            "log" => Ok(NotifierConfig::Log),
            other => anyhow::bail!("unknown notifier: {other} (expected stdout or log)"),
        }
    }
}

/// Top-level quizplay configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizplayConfig {
    /// Learner whose grade snapshots the completion check reads.
    #[serde(default = "default_learner")]
    pub learner_id: String,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

fn default_learner() -> String {
    "learner".to_string()
}

impl Default for QuizplayConfig {
    fn default() -> Self {
        Self {
            learner_id: default_learner(),
            persistence: PersistenceConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

/// Replace `${VAR_NAME}` references with environment values (empty if unset).
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut from = 0;
    while let Some(offset) = result[from..].find("${") {
        let start = from + offset;
        let Some(len) = result[start..].find('}') else {
            break;
        };
        let value = std::env::var(&result[start + 2..start + len]).unwrap_or_default();
        result.replace_range(start..start + len + 1, &value);
        from = start + value.len();
    }
    result
}

/// Load config from an explicit path, or search the default locations.
///
/// Search order without a path:
/// 1. `quizplay.toml` in the current directory
/// 2. `~/.config/quizplay/config.toml`
///
/// Environment overrides: `QUIZPLAY_FAIL_SAVES=1` rejects every save,
/// `QUIZPLAY_NOTIFIER=stdout|log` picks the notification sink.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizplayConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("quizplay.toml");
            if local.exists() {
                Some(local)
            } else {
                config_dir()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            toml::from_str::<QuizplayConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuizplayConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.learner_id = resolve_env_vars(&config.learner_id);
    Ok(config)
}

fn apply_env_overrides(config: &mut QuizplayConfig) -> Result<()> {
    if std::env::var("QUIZPLAY_FAIL_SAVES").is_ok_and(|v| v == "1" || v == "true") {
        let PersistenceConfig::Memory { fail_all, .. } = &mut config.persistence;
        *fail_all = true;
    }
    if let Ok(name) = std::env::var("QUIZPLAY_NOTIFIER") {
        config.notifier = name
            .parse()
            .context("invalid QUIZPLAY_NOTIFIER value")?;
    }
    Ok(())
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizplay"))
}

/// Build the persistence collaborator. The concrete store is returned so
/// callers can still flip failure injection at runtime.
pub fn create_persistence(config: &PersistenceConfig) -> Arc<InMemoryPersistence> {
    match config {
        PersistenceConfig::Memory {
            fail_indices,
            fail_all,
        } => {
            let store = InMemoryPersistence::with_failures(fail_indices.iter().copied());
            store.set_fail_all(*fail_all);
            Arc::new(store)
        }
    }
}

pub fn create_notifier(config: &NotifierConfig) -> Arc<dyn HostNotifier> {
    match config {
        NotifierConfig::Stdout => Arc::new(StdoutNotifier),
        NotifierConfig::Log => Arc::new(LogNotifier),
    }
}
