use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::division::{DivisionRule, DivisionRuleSpec, ParityRule};
use crate::error::CrawlError;

/// One crawl task as supplied by the tasks file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub task_id: i64,
    #[serde(default)]
    pub label: String,
    pub primary_url: String,
    #[serde(default)]
    pub secondary_url: Option<String>,
    /// Kept as text so an unknown value fails its own task instead of the whole file.
    pub competition_format: String,
    #[serde(default)]
    pub division_rule: Option<DivisionRuleSpec>,
}

impl SourceConfig {
    pub fn format(&self) -> Result<CompetitionFormat, CrawlError> {
        self.competition_format.parse()
    }

    pub fn secondary_url(&self) -> Result<&str, CrawlError> {
        self.secondary_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(CrawlError::MissingSecondaryUrl {
                task_id: self.task_id,
            })
    }

    /// Configured rule, or the parity rule.
    pub fn division_rule(&self) -> Box<dyn DivisionRule> {
        match &self.division_rule {
            Some(spec) => spec.build(),
            None => Box::new(ParityRule),
        }
    }

    pub fn display(&self) -> String {
        if self.label.trim().is_empty() {
            format!("[{}]", self.task_id)
        } else {
            format!("[{}] {}", self.task_id, self.label.trim())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionFormat {
    Single,
    TwoStage,
    DivisionSplit,
}

impl FromStr for CompetitionFormat {
    type Err = CrawlError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" | "regular" => Ok(Self::Single),
            "two_stage" | "twostage" | "merge" => Ok(Self::TwoStage),
            "division_split" | "divisionsplit" | "east_west" => Ok(Self::DivisionSplit),
            _ => Err(CrawlError::UnknownFormat(raw.to_string())),
        }
    }
}

pub fn load_tasks(path: &Path) -> Result<Vec<SourceConfig>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading tasks file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid tasks file {}", path.display()))
}
