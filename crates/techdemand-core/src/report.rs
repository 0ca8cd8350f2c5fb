use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TechnologyConfig;
use crate::task::FailureKind;

/// Key under which the grand total is stored in the summary.
pub const TOTAL_KEY: &str = "total";

/// Vacancy counts for one city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityStats {
    pub name: String,
    pub code: u32,
    /// Technology name → count.
    pub vacancies: BTreeMap<String, u64>,
    pub total: u64,
}

/// Per-technology totals across all cities plus the grand total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(flatten)]
    pub technologies: BTreeMap<String, u64>,
    pub total: u64,
}

impl Summary {
    pub fn get(&self, technology: &str) -> Option<u64> {
        self.technologies.get(technology).copied()
    }
}

/// A task that ended in a fetch failure; listed only in partial reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTask {
    pub technology: String,
    pub city_code: u32,
    pub kind: FailureKind,
    pub message: String,
}

/// The city × technology matrix of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "date")]
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "technologiesConfig")]
    pub technologies: Vec<TechnologyConfig>,
    pub cities: Vec<CityStats>,
    pub summary: Summary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<FailedTask>,
}

impl Report {
    /// `YYYY-MM-DD` stamp used in output file names.
    pub fn date_stamp(&self) -> String {
        self.generated_at.format("%Y-%m-%d").to_string()
    }

    pub fn city(&self, name: &str) -> Option<&CityStats> {
        self.cities.iter().find(|c| c.name == name)
    }

    /// Count for a technology in a city, by city code.
    pub fn count(&self, technology: &str, city_code: u32) -> Option<u64> {
        self.cities
            .iter()
            .find(|c| c.code == city_code)
            .and_then(|c| c.vacancies.get(technology).copied())
    }

    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}
