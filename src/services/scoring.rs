//! Session scoring and pacing diagnostics. Everything here is a pure
//! function over a batch of attempts.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::content::{Skill, Subject};
use crate::db::{Attempt, MAX_TIME_SPENT_MS};
use crate::error::{EngineError, EngineResult};
use crate::services::mastery::accuracy;

pub const MIN_SCALED_SCORE: u8 = 1;
pub const MAX_SCALED_SCORE: u8 = 36;
pub const STANDARD_TIME_MULTIPLIER: u32 = 100;
pub const CARELESS_TIME_MS: u64 = 20_000;
pub const CARELESS_ACCURACY: f64 = 70.0;
pub const UNCATEGORIZED_CLUSTER: &str = "Uncategorized";

/// ACT sections line up one-to-one with content subjects.
pub type Section = Subject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionTiming {
    pub minutes: u32,
    pub questions: u32,
}

impl SectionTiming {
    pub fn seconds(&self) -> u64 {
        u64::from(self.minutes) * 60
    }
}

pub fn section_timing(section: Section) -> SectionTiming {
    let (minutes, questions) = match section {
        Subject::English => (45, 75),
        Subject::Math => (60, 60),
        Subject::Reading => (35, 40),
        Subject::Science => (35, 40),
    };
    SectionTiming { minutes, questions }
}

/// Maps percent correct onto the 1-36 scale.
pub fn scaled_score(percent_correct: f64) -> EngineResult<u8> {
    if !(0.0..=100.0).contains(&percent_correct) {
        return Err(EngineError::invariant(format!(
            "percent correct {percent_correct} outside 0-100"
        )));
    }
    let scaled = (1.0 + 35.0 * percent_correct / 100.0).round();
    Ok((scaled as u8).clamp(MIN_SCALED_SCORE, MAX_SCALED_SCORE))
}

/// Accommodated time limit, rounded half up. 100 is standard time.
pub fn apply_time_accommodation(base_seconds: u64, multiplier_percent: u32) -> EngineResult<u64> {
    if multiplier_percent == 0 {
        return Err(EngineError::invalid("time multiplier must be positive"));
    }
    let scaled = u128::from(base_seconds) * u128::from(multiplier_percent) + 50;
    u64::try_from(scaled / 100).map_err(|_| EngineError::invalid("accommodated time overflows"))
}

/// One graded unit of work (a drill, or one skill within a session).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub median_time_ms: Option<u64>,
    /// Percent correct; `None` when the task has no graded answers.
    pub accuracy: Option<f64>,
}

/// Percent of tasks finished fast with low accuracy. Tasks without a time or
/// an accuracy are counted in the denominator only.
pub fn careless_rate(tasks: &[TaskSummary]) -> EngineResult<f64> {
    if tasks.is_empty() {
        return Ok(0.0);
    }
    let mut careless = 0usize;
    for task in tasks {
        if let Some(acc) = task.accuracy {
            if !(0.0..=100.0).contains(&acc) {
                return Err(EngineError::invariant(format!("task accuracy {acc} out of range")));
            }
        }
        let fast = task.median_time_ms.is_some_and(|t| t < CARELESS_TIME_MS);
        let sloppy = task.accuracy.is_some_and(|a| a < CARELESS_ACCURACY);
        if fast && sloppy {
            careless += 1;
        }
    }
    Ok(careless as f64 * 100.0 / tasks.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAccuracy {
    pub cluster: String,
    pub correct: u32,
    pub count: u32,
    pub accuracy: f64,
}

/// Per-cluster accuracy plus the count-weighted accuracy across clusters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterBreakdown {
    pub clusters: Vec<ClusterAccuracy>,
    pub overall: f64,
}

/// Groups `(cluster, correct)` outcomes. The overall figure weights each
/// cluster by its attempt count, so it equals total correct over total attempts.
pub fn cluster_accuracy<'a, I>(outcomes: I) -> EngineResult<ClusterBreakdown>
where
    I: IntoIterator<Item = (&'a str, bool)>,
{
    let mut groups: BTreeMap<&str, (u32, u32)> = BTreeMap::new();
    for (cluster, correct) in outcomes {
        let entry = groups.entry(cluster).or_default();
        entry.0 += u32::from(correct);
        entry.1 += 1;
    }

    let mut clusters = Vec::with_capacity(groups.len());
    let (mut correct_sum, mut count_sum) = (0u32, 0u32);
    for (cluster, (correct, count)) in groups {
        correct_sum += correct;
        count_sum += count;
        clusters.push(ClusterAccuracy {
            cluster: cluster.to_string(),
            correct,
            count,
            accuracy: accuracy(correct, count)?,
        });
    }

    Ok(ClusterBreakdown {
        clusters,
        overall: accuracy(correct_sum, count_sum)?,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillStats {
    pub skill_id: String,
    pub correct: u32,
    pub total: u32,
    pub accuracy: f64,
    pub avg_time_ms: u64,
    pub median_time_ms: u64,
}

impl SkillStats {
    pub fn task_summary(&self) -> TaskSummary {
        TaskSummary {
            median_time_ms: Some(self.median_time_ms),
            accuracy: Some(self.accuracy),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    WithinLimit,
    OverLimit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScore {
    pub section: Section,
    pub total_questions: u32,
    pub answered: u32,
    pub unanswered: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub scaled_score: u8,
    pub elapsed_ms: u64,
    pub avg_time_ms: u64,
    pub median_time_ms: u64,
    pub time_limit_seconds: u64,
    /// Accommodated limit divided over the section's standard question count.
    pub target_ms_per_question: u64,
    pub pacing: Pacing,
    pub per_skill: Vec<SkillStats>,
    pub clusters: ClusterBreakdown,
    pub careless_rate: f64,
}

/// Upper median, matching how the dashboards pick the middle of a sorted list.
fn median(mut values: Vec<u64>) -> u64 {
    if values.is_empty() {
        return 0;
    }
    values.sort_unstable();
    values[values.len() / 2]
}

fn rounded_mean(sum: u64, count: u32) -> u64 {
    if count == 0 {
        return 0;
    }
    let n = u128::from(count);
    // the mean never exceeds the sum, so it fits back into u64
    ((2 * u128::from(sum) + n) / (2 * n)) as u64
}

fn total_time_ms<'a>(attempts: impl IntoIterator<Item = &'a Attempt>) -> EngineResult<u64> {
    attempts.into_iter().try_fold(0u64, |sum, a| {
        sum.checked_add(a.time_spent_ms)
            .ok_or_else(|| EngineError::invariant("session time overflows"))
    })
}

fn check_times(attempts: &[Attempt]) -> EngineResult<()> {
    match attempts.iter().find(|a| a.time_spent_ms > MAX_TIME_SPENT_MS) {
        Some(a) => Err(EngineError::invariant(format!(
            "attempt {} reports {} ms, above {MAX_TIME_SPENT_MS}",
            a.id, a.time_spent_ms
        ))),
        None => Ok(()),
    }
}

fn count(n: usize) -> EngineResult<u32> {
    u32::try_from(n).map_err(|_| EngineError::invalid("too many attempts in one session"))
}

/// Aggregates a batch of attempts. Unanswered attempts count as incorrect.
pub fn session_score(
    attempts: &[Attempt],
    skills: &[Skill],
    multiplier_percent: u32,
    section: Section,
) -> EngineResult<SessionScore> {
    check_times(attempts)?;
    let timing = section_timing(section);
    let time_limit_seconds = apply_time_accommodation(timing.seconds(), multiplier_percent)?;

    let total_questions = count(attempts.len())?;
    let answered = count(attempts.iter().filter(|a| a.is_answered()).count())?;
    let correct = count(attempts.iter().filter(|a| a.is_correct()).count())?;
    let percent = accuracy(correct, total_questions)?;
    let elapsed_ms = total_time_ms(attempts)?;

    let mut by_skill: BTreeMap<&str, Vec<&Attempt>> = BTreeMap::new();
    for attempt in attempts {
        by_skill.entry(attempt.skill_id.as_str()).or_default().push(attempt);
    }
    let mut per_skill = Vec::with_capacity(by_skill.len());
    for (skill_id, group) in &by_skill {
        let total = count(group.len())?;
        let skill_correct = count(group.iter().filter(|a| a.is_correct()).count())?;
        let time_sum = total_time_ms(group.iter().copied())?;
        per_skill.push(SkillStats {
            skill_id: skill_id.to_string(),
            correct: skill_correct,
            total,
            accuracy: accuracy(skill_correct, total)?,
            avg_time_ms: rounded_mean(time_sum, total),
            median_time_ms: median(group.iter().map(|a| a.time_spent_ms).collect()),
        });
    }

    let clusters_by_skill: HashMap<&str, &str> = skills
        .iter()
        .map(|s| (s.id.as_str(), s.cluster.as_str()))
        .collect();
    let clusters = cluster_accuracy(attempts.iter().map(|a| {
        let cluster = clusters_by_skill
            .get(a.skill_id.as_str())
            .copied()
            .unwrap_or(UNCATEGORIZED_CLUSTER);
        (cluster, a.is_correct())
    }))?;

    let tasks: Vec<TaskSummary> = per_skill.iter().map(SkillStats::task_summary).collect();
    let pacing = if elapsed_ms <= time_limit_seconds.saturating_mul(1000) {
        Pacing::WithinLimit
    } else {
        Pacing::OverLimit
    };

    Ok(SessionScore {
        section,
        total_questions,
        answered,
        unanswered: total_questions - answered,
        correct,
        accuracy: percent,
        scaled_score: scaled_score(percent)?,
        elapsed_ms,
        avg_time_ms: rounded_mean(elapsed_ms, total_questions),
        median_time_ms: median(attempts.iter().map(|a| a.time_spent_ms).collect()),
        time_limit_seconds,
        target_ms_per_question: time_limit_seconds * 1000 / u64::from(timing.questions),
        pacing,
        per_skill,
        clusters,
        careless_rate: careless_rate(&tasks)?,
    })
}

/// Rounded mean of section scores; 1 when there are none.
pub fn composite_score(section_scores: &[u8]) -> EngineResult<u8> {
    if section_scores.is_empty() {
        return Ok(MIN_SCALED_SCORE);
    }
    if let Some(bad) = section_scores
        .iter()
        .find(|s| !(MIN_SCALED_SCORE..=MAX_SCALED_SCORE).contains(s))
    {
        return Err(EngineError::invariant(format!("section score {bad} outside 1-36")));
    }
    let sum: u32 = section_scores.iter().map(|s| u32::from(*s)).sum();
    Ok(rounded_mean(u64::from(sum), section_scores.len() as u32) as u8)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn attempt(skill: &str, correct: bool, answered: bool, time_ms: u64) -> Attempt {
        Attempt {
            id: Uuid::new_v4(),
            learner_id: "u1".to_string(),
            question_id: Uuid::new_v4().to_string(),
            skill_id: skill.to_string(),
            session_id: Some("s1".to_string()),
            choice_order: vec![1, 0, 2, 3],
            correct_idx: 0,
            // display 1 shows canonical 0
            selected_idx: answered.then_some(if correct { 1 } else { 0 }),
            time_spent_ms: time_ms,
            answered_at: Utc::now(),
        }
    }

    fn skill(id: &str, cluster: &str) -> Skill {
        Skill {
            id: id.to_string(),
            name: id.to_string(),
            subject: Subject::Math,
            cluster: cluster.to_string(),
        }
    }

    #[test]
    fn scaled_score_boundaries() {
        assert_eq!(scaled_score(0.0).unwrap(), 1);
        assert_eq!(scaled_score(100.0).unwrap(), 36);
        assert_eq!(scaled_score(75.0).unwrap(), 27);
        assert!(matches!(scaled_score(-5.0), Err(EngineError::InvariantViolation(_))));
        assert!(matches!(scaled_score(140.0), Err(EngineError::InvariantViolation(_))));
        assert!(scaled_score(f64::NAN).is_err());

        let mut previous = 0;
        for tenth in 0..=1000 {
            let score = scaled_score(f64::from(tenth) / 10.0).unwrap();
            assert!(score >= previous);
            previous = score;
        }
    }

    #[test]
    fn accommodation() {
        assert_eq!(apply_time_accommodation(2700, 150).unwrap(), 4050);
        assert_eq!(apply_time_accommodation(2700, 100).unwrap(), 2700);
        assert_eq!(apply_time_accommodation(2100, 200).unwrap(), 4200);
        // 33 * 1.5 = 49.5
        assert_eq!(apply_time_accommodation(33, 150).unwrap(), 50);
        assert!(apply_time_accommodation(2700, 0).is_err());
    }

    #[test]
    fn careless_tasks() {
        let task = |t: Option<u64>, a: Option<f64>| TaskSummary {
            median_time_ms: t,
            accuracy: a,
        };
        let tasks = vec![
            task(Some(10_000), Some(50.0)),
            task(Some(10_000), Some(80.0)),
            task(Some(30_000), Some(40.0)),
            task(None, Some(10.0)),
        ];
        assert_eq!(careless_rate(&tasks).unwrap(), 25.0);
        assert_eq!(careless_rate(&[]).unwrap(), 0.0);
        assert!(careless_rate(&[task(Some(1), Some(120.0))]).is_err());
    }

    #[test]
    fn clusters_weighted_by_count() {
        let outcomes = vec![
            ("Algebra", true),
            ("Algebra", true),
            ("Algebra", true),
            ("Algebra", false),
            ("Geometry", false),
        ];
        let breakdown = cluster_accuracy(outcomes).unwrap();
        assert_eq!(breakdown.clusters.len(), 2);
        assert_eq!(breakdown.clusters[0].accuracy, 75.0);
        assert_eq!(breakdown.clusters[1].accuracy, 0.0);
        // 3 of 5, not the 37.5 an unweighted mean would give
        assert_eq!(breakdown.overall, 60.0);
    }

    #[test]
    fn session_summary() {
        let attempts = vec![
            attempt("alg", true, true, 30_000),
            attempt("alg", false, true, 10_000),
            attempt("alg", false, true, 12_000),
            attempt("geo", true, true, 50_000),
            attempt("geo", false, false, 0),
        ];
        let skills = vec![skill("alg", "Algebra"), skill("geo", "Geometry")];
        let score = session_score(&attempts, &skills, 150, Section::Math).unwrap();

        assert_eq!(score.total_questions, 5);
        assert_eq!(score.answered, 4);
        assert_eq!(score.unanswered, 1);
        assert_eq!(score.correct, 2);
        assert_eq!(score.accuracy, 40.0);
        assert_eq!(score.scaled_score, 15);
        assert_eq!(score.elapsed_ms, 102_000);
        assert_eq!(score.avg_time_ms, 20_400);
        assert_eq!(score.median_time_ms, 12_000);
        assert_eq!(score.time_limit_seconds, 5400);
        assert_eq!(score.target_ms_per_question, 90_000);
        assert_eq!(score.pacing, Pacing::WithinLimit);

        let alg = &score.per_skill[0];
        assert_eq!((alg.correct, alg.total, alg.median_time_ms), (1, 3, 12_000));
        assert_eq!(alg.avg_time_ms, 17_333);

        // alg: 12s median at 33% is careless, geo: 50s median is not
        assert_eq!(score.careless_rate, 50.0);
        assert_eq!(score.clusters.overall, 40.0);
    }

    #[test]
    fn empty_session() {
        let score = session_score(&[], &[], 100, Section::Reading).unwrap();
        assert_eq!(score.scaled_score, 1);
        assert_eq!(score.total_questions, 0);
        assert_eq!(score.careless_rate, 0.0);
        assert!(score.clusters.clusters.is_empty());
    }

    #[test]
    fn absurd_times_fail_instead_of_overflowing() {
        let huge = attempt("alg", true, true, u64::MAX / 2 + 10);
        let err = session_score(&[huge.clone(), huge], &[], 100, Section::Math).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));

        let longest = attempt("alg", true, true, MAX_TIME_SPENT_MS);
        let score = session_score(&[longest.clone(), longest], &[], 100, Section::Math).unwrap();
        assert_eq!(score.elapsed_ms, 2 * MAX_TIME_SPENT_MS);
        assert_eq!(score.avg_time_ms, MAX_TIME_SPENT_MS);
        assert_eq!(score.pacing, Pacing::OverLimit);
    }

    #[test]
    fn over_time_sessions_are_flagged() {
        let attempts: Vec<Attempt> = (0..4)
            .map(|_| attempt("sci", true, true, 10 * 60 * 1000))
            .collect();
        let score = session_score(&attempts, &[], 100, Section::Science).unwrap();
        assert_eq!(score.pacing, Pacing::OverLimit);
        assert_eq!(score.clusters.clusters[0].cluster, UNCATEGORIZED_CLUSTER);
    }

    #[test]
    fn composite() {
        assert_eq!(composite_score(&[]).unwrap(), 1);
        assert_eq!(composite_score(&[30, 31, 28, 29]).unwrap(), 30);
        // 29.5 rounds up
        assert_eq!(composite_score(&[30, 29]).unwrap(), 30);
        assert!(composite_score(&[0, 20]).is_err());
    }

    #[test]
    fn section_table() {
        assert_eq!(section_timing(Section::English), SectionTiming { minutes: 45, questions: 75 });
        assert_eq!(section_timing(Section::Math).seconds(), 3600);
    }
}
