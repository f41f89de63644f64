//! Caller-side configuration: the `vercel.json` cron list and the preview
//! target settings.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading the cron list.
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON format. Please check your vercel.json")]
    InvalidJson(#[source] serde_json::Error),

    #[error("No cron jobs found in vercel.json")]
    NoCronJobs,
}

/// Where and how to call the jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelConfig {
    /// Base URL of the preview deployment, e.g. `https://myapp-git-x.vercel.app`.
    pub preview_url: String,

    /// Deployment-protection bypass secret.
    #[serde(default)]
    pub deploy_protection_token: Option<String>,

    /// Extra headers, one `Name: value` per line.
    #[serde(default)]
    pub custom_headers: Option<String>,
}

/// A cron entry as written in `vercel.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct CronEntry {
    path: String,
    schedule: String,
}

#[derive(Debug, Deserialize)]
struct VercelConfig {
    #[serde(default)]
    crons: Option<Vec<CronEntry>>,
}

/// A runnable job. `id` names its job slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CronJob {
    pub id: String,
    pub path: String,
    pub schedule: String,
}

/// Parse the `crons` list out of a `vercel.json` document. Other keys are
/// ignored.
pub fn parse_vercel_json(text: &str) -> Result<Vec<CronJob>, PanelError> {
    let config: VercelConfig = serde_json::from_str(text).map_err(PanelError::InvalidJson)?;

    let crons = config.crons.unwrap_or_default();
    if crons.is_empty() {
        return Err(PanelError::NoCronJobs);
    }

    Ok(crons
        .into_iter()
        .enumerate()
        .map(|(index, cron)| CronJob {
            id: format!("{}-{}", cron.path, index),
            path: cron.path,
            schedule: cron.schedule,
        })
        .collect())
}

pub fn load_vercel_json(path: &Path) -> Result<Vec<CronJob>, PanelError> {
    let text = fs::read_to_string(path).map_err(|source| PanelError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_vercel_json(&text)
}
