use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::config::{CityConfig, TechnologyConfig};
use crate::error::AppError;
use crate::report::{CityStats, FailedTask, Report, Summary};
use crate::task::{FailureKind, Task};

/// Join completed tasks back into the city × technology report.
///
/// Cities and technologies are walked in configured order. Every pair must
/// have a task; a missing one means the task set was built from a different
/// configuration and is reported as [`AppError::MissingTask`].
pub fn build_report(
    tasks: &[Task],
    cities: &[CityConfig],
    technologies: &[TechnologyConfig],
    generated_at: DateTime<Utc>,
) -> Result<Report, AppError> {
    let index: HashMap<(&str, u32), &Task> = tasks
        .iter()
        .map(|t| ((t.technology_name.as_str(), t.city_code), t))
        .collect();

    let mut summary = Summary::default();
    let mut city_stats = Vec::with_capacity(cities.len());

    for city in cities {
        let mut vacancies = BTreeMap::new();
        let mut total = 0u64;

        for tech in technologies {
            let task = index
                .get(&(tech.name.as_str(), city.code))
                .ok_or_else(|| AppError::MissingTask {
                    technology: tech.name.clone(),
                    city_code: city.code,
                })?;

            vacancies.insert(tech.name.clone(), task.count);
            total += task.count;
            *summary.technologies.entry(tech.name.clone()).or_default() += task.count;
        }

        summary.total += total;
        city_stats.push(CityStats {
            name: city.name.clone(),
            code: city.code,
            vacancies,
            total,
        });
    }

    let failures = tasks
        .iter()
        .filter(|t| t.is_failed())
        .map(|t| FailedTask {
            technology: t.technology_name.clone(),
            city_code: t.city_code,
            kind: t
                .failure
                .as_ref()
                .map(|f| f.kind)
                .unwrap_or(FailureKind::Request),
            message: t
                .failure
                .as_ref()
                .map(|f| f.message.clone())
                .unwrap_or_default(),
        })
        .collect();

    tracing::debug!(
        cities = city_stats.len(),
        technologies = technologies.len(),
        total = summary.total,
        "Report aggregated"
    );

    Ok(Report {
        generated_at,
        technologies: technologies.to_vec(),
        cities: city_stats,
        summary,
        failures,
    })
}
