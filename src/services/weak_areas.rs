//! Ranked view of a learner's underperforming skills.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::content::{Skill, Subject};
use crate::db::MasteryRecord;
use crate::error::EngineResult;
use crate::services::mastery::{accuracy, MasteryLevel, MASTERED_ACCURACY, PROFICIENT_ACCURACY, LEARNING_ACCURACY};

pub const DEFAULT_WEAK_AREA_LIMIT: usize = 10;

/// Declaration order is ranking order: critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
}

impl Priority {
    /// `None` for skills that are not started or already mastered.
    pub fn for_accuracy(total: u32, accuracy: f64) -> Option<Self> {
        if total == 0 || accuracy >= MASTERED_ACCURACY {
            None
        } else if accuracy < LEARNING_ACCURACY {
            Some(Self::Critical)
        } else if accuracy < PROFICIENT_ACCURACY {
            Some(Self::High)
        } else {
            Some(Self::Medium)
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Critical => "Needs Focus",
            Self::High => "Practice More",
            Self::Medium => "Almost There",
        }
    }

    /// Share of a study block given to one skill of this tier, in percent.
    pub fn time_share_percent(&self) -> u32 {
        match self {
            Self::Critical => 50,
            Self::High => 30,
            Self::Medium => 20,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakArea {
    pub skill_id: String,
    pub skill_name: String,
    pub subject: Subject,
    pub cluster: String,
    pub accuracy: f64,
    pub total_attempts: u32,
    pub mastery_level: MasteryLevel,
    pub priority: Priority,
    pub priority_label: &'static str,
}

/// Ranks the records that have a tier. Records whose skill is not in
/// `skills` are left out.
pub fn prioritize(
    records: &[MasteryRecord],
    skills: &[Skill],
    min_attempts: u32,
    limit: usize,
) -> EngineResult<Vec<WeakArea>> {
    let by_id: HashMap<&str, &Skill> = skills.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut areas = Vec::new();
    for record in records {
        let accuracy = accuracy(record.correct, record.total)?;
        let Some(priority) = Priority::for_accuracy(record.total, accuracy) else {
            continue;
        };
        let Some(skill) = by_id.get(record.skill_id.as_str()) else {
            tracing::debug!(skill = %record.skill_id, "weak area skipped, skill not in content");
            continue;
        };
        areas.push(WeakArea {
            skill_id: skill.id.clone(),
            skill_name: skill.name.clone(),
            subject: skill.subject,
            cluster: skill.cluster.clone(),
            accuracy,
            total_attempts: record.total,
            mastery_level: MasteryLevel::classify(record.correct, record.total, min_attempts)?,
            priority,
            priority_label: priority.label(),
        });
    }

    areas.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.accuracy.total_cmp(&b.accuracy))
            .then_with(|| a.skill_id.cmp(&b.skill_id))
    });
    areas.truncate(limit);
    Ok(areas)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeakAreaStats {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub total: u32,
}

/// Tier counts over every record, with or without content.
pub fn weak_area_stats(records: &[MasteryRecord]) -> EngineResult<WeakAreaStats> {
    let mut stats = WeakAreaStats::default();
    for record in records {
        match Priority::for_accuracy(record.total, accuracy(record.correct, record.total)?) {
            Some(Priority::Critical) => stats.critical += 1,
            Some(Priority::High) => stats.high += 1,
            Some(Priority::Medium) => stats.medium += 1,
            None => continue,
        }
        stats.total += 1;
    }
    Ok(stats)
}

/// Fixed allocation per tier, rounded half up.
pub fn recommended_minutes(priority: Priority, total_minutes: u32) -> u32 {
    let scaled = u64::from(total_minutes) * u64::from(priority.time_share_percent());
    ((scaled + 50) / 100) as u32
}
