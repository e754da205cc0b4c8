use crate::distribution::ReferencePolicy;
use crate::ingest::SheetLayout;
use crate::jitter::JitterParams;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Backdrop curve parameters, one policy per view that draws a density.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReferencePolicies {
    pub student: ReferencePolicy,
    pub class_stats: ReferencePolicy,
    pub subject_ranking: ReferencePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub credentials_path: PathBuf,
    pub database_path: PathBuf,
    pub layout: SheetLayout,
    /// Subject column holding the final score. Excluded from radar charts,
    /// used for the ranking when present.
    pub final_score_column: Option<String>,
    pub jitter: JitterParams,
    pub reference: ReferencePolicies,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials_path: PathBuf::from("credentials.json"),
            database_path: PathBuf::from("grades.sqlite3"),
            layout: SheetLayout::default(),
            final_score_column: Some("Final score".to_string()),
            jitter: JitterParams::default(),
            reference: ReferencePolicies::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
        let mut cfg: Config = serde_json::from_str(&text)
            .with_context(|| format!("invalid config {}", path.to_string_lossy()))?;

        // Relative paths in the file are relative to the file itself.
        if let Some(dir) = path.parent() {
            cfg.credentials_path = rebase(dir, &cfg.credentials_path);
            cfg.database_path = rebase(dir, &cfg.database_path);
        }
        Ok(cfg)
    }
}

fn rebase(dir: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        dir.join(p)
    }
}
