use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{LogRecord, ProgressSummary, Requirement, RotationProgress, VerificationStatus};

/// `round(numerator / denominator * 100)` rounding half up. Both inputs are
/// non-negative and the denominator is positive.
fn round_percent(numerator: i64, denominator: i64) -> i64 {
    (numerator * 100 + denominator / 2) / denominator
}

pub fn completion_percentage(verified: i64, required: i64) -> i64 {
    if required <= 0 {
        return 100;
    }
    round_percent(verified.max(0), required).min(100)
}

pub fn over_achieved(verified: i64, required: i64) -> i64 {
    (verified - required.max(0)).max(0)
}

pub fn over_achievement_percentage(verified: i64, required: i64) -> i64 {
    if required <= 0 {
        return 0;
    }
    round_percent(over_achieved(verified, required), required)
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    verified: i64,
    pending: i64,
}

impl Tally {
    fn add(&mut self, log: &LogRecord) {
        let count = i64::from(log.count.max(0));
        match log.status {
            VerificationStatus::Approved => self.verified += count,
            VerificationStatus::Pending => self.pending += count,
            VerificationStatus::Rejected => {}
        }
    }
}

/// Rolls one intern's log rows up against the active requirements.
///
/// Every rotation carrying at least one requirement appears exactly once,
/// ordered by name then id. Rows for rotations without a requirement are
/// ignored.
pub fn rotation_progress(requirements: &[Requirement], logs: &[LogRecord]) -> Vec<RotationProgress> {
    let mut required: HashMap<Uuid, (String, i64)> = HashMap::new();
    for requirement in requirements {
        let entry = required
            .entry(requirement.rotation_id)
            .or_insert_with(|| (requirement.rotation_name.clone(), 0));
        entry.1 += i64::from(requirement.min_count.max(0));
    }

    let mut tallies: HashMap<Uuid, Tally> = HashMap::new();
    for log in logs {
        if required.contains_key(&log.rotation_id) {
            tallies.entry(log.rotation_id).or_default().add(log);
        }
    }

    let mut rotations: Vec<RotationProgress> = required
        .into_iter()
        .map(|(rotation_id, (rotation_name, required))| {
            let tally = tallies.get(&rotation_id).copied().unwrap_or_default();
            RotationProgress {
                rotation_id,
                rotation_name,
                required,
                verified: tally.verified,
                pending: tally.pending,
                over_achieved: over_achieved(tally.verified, required),
                completion_percentage: completion_percentage(tally.verified, required),
                over_achievement_percentage: over_achievement_percentage(tally.verified, required),
            }
        })
        .collect();

    rotations.sort_by(|a, b| {
        a.rotation_name
            .cmp(&b.rotation_name)
            .then_with(|| a.rotation_id.cmp(&b.rotation_id))
    });
    rotations
}

pub fn summarize(rotations: &[RotationProgress]) -> ProgressSummary {
    let required: i64 = rotations.iter().map(|r| r.required).sum();
    let verified: i64 = rotations.iter().map(|r| r.verified).sum();
    let pending: i64 = rotations.iter().map(|r| r.pending).sum();

    ProgressSummary {
        required,
        verified,
        pending,
        over_achieved: over_achieved(verified, required),
        completion_percentage: completion_percentage(verified, required),
        over_achievement_percentage: over_achievement_percentage(verified, required),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    pub(crate) fn requirement(rotation_id: Uuid, rotation: &str, procedure_id: Uuid, min: i32) -> Requirement {
        Requirement {
            rotation_id,
            rotation_name: rotation.to_string(),
            procedure_id,
            procedure_name: "Central line".to_string(),
            min_count: min,
            training_level: None,
        }
    }

    pub(crate) fn log(
        intern_id: Uuid,
        rotation_id: Uuid,
        procedure_id: Uuid,
        status: VerificationStatus,
        count: i32,
    ) -> LogRecord {
        let performed_at = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        LogRecord {
            id: Uuid::new_v4(),
            intern_id,
            intern_name: "Noa Levi".to_string(),
            procedure_id,
            procedure_name: "Central line".to_string(),
            rotation_id,
            rotation_name: "ICU".to_string(),
            performed_at,
            count,
            notes: None,
            created_at: performed_at,
            status,
            verifier_name: None,
            verified_at: None,
            reason: None,
        }
    }

    #[test]
    fn completion_caps_at_one_hundred() {
        assert_eq!(completion_percentage(3, 5), 60);
        assert_eq!(completion_percentage(5, 5), 100);
        assert_eq!(completion_percentage(9, 5), 100);
        assert_eq!(completion_percentage(0, 5), 0);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(1, 8), 13);
    }

    #[test]
    fn missing_requirement_is_vacuously_complete() {
        assert_eq!(completion_percentage(0, 0), 100);
        assert_eq!(completion_percentage(4, 0), 100);
        assert_eq!(over_achievement_percentage(4, 0), 0);
    }

    #[test]
    fn over_achievement_never_negative() {
        assert_eq!(over_achieved(0, 5), 0);
        assert_eq!(over_achieved(5, 2), 3);
        assert_eq!(over_achievement_percentage(5, 2), 150);
        assert_eq!(over_achievement_percentage(1, 2), 0);
    }

    #[test]
    fn approved_and_pending_are_tallied_separately() {
        let intern = Uuid::new_v4();
        let icu = Uuid::new_v4();
        let line = Uuid::new_v4();
        let requirements = vec![requirement(icu, "ICU", line, 5)];
        let logs = vec![
            log(intern, icu, line, VerificationStatus::Approved, 2),
            log(intern, icu, line, VerificationStatus::Approved, 1),
            log(intern, icu, line, VerificationStatus::Pending, 2),
            log(intern, icu, line, VerificationStatus::Rejected, 4),
        ];

        let rotations = rotation_progress(&requirements, &logs);
        assert_eq!(rotations.len(), 1);
        let icu_progress = &rotations[0];
        assert_eq!(icu_progress.required, 5);
        assert_eq!(icu_progress.verified, 3);
        assert_eq!(icu_progress.pending, 2);
        assert_eq!(icu_progress.completion_percentage, 60);
        assert_eq!(icu_progress.over_achieved, 0);
    }

    #[test]
    fn over_achieving_rotation_reports_excess() {
        let intern = Uuid::new_v4();
        let icu = Uuid::new_v4();
        let line = Uuid::new_v4();
        let requirements = vec![requirement(icu, "ICU", line, 2)];
        let logs = vec![log(intern, icu, line, VerificationStatus::Approved, 5)];

        let progress = &rotation_progress(&requirements, &logs)[0];
        assert_eq!(progress.verified, 5);
        assert_eq!(progress.completion_percentage, 100);
        assert_eq!(progress.over_achieved, 3);
        assert_eq!(progress.over_achievement_percentage, 150);
    }

    #[test]
    fn each_required_rotation_appears_once_in_name_order() {
        let intern = Uuid::new_v4();
        let icu = Uuid::new_v4();
        let er = Uuid::new_v4();
        let elective = Uuid::new_v4();
        let requirements = vec![
            requirement(icu, "ICU", Uuid::new_v4(), 3),
            requirement(icu, "ICU", Uuid::new_v4(), 2),
            requirement(er, "Emergency", Uuid::new_v4(), 4),
        ];
        let logs = vec![log(intern, elective, Uuid::new_v4(), VerificationStatus::Approved, 7)];

        let rotations = rotation_progress(&requirements, &logs);
        let names: Vec<&str> = rotations.iter().map(|r| r.rotation_name.as_str()).collect();
        assert_eq!(names, vec!["Emergency", "ICU"]);
        assert_eq!(rotations[1].required, 5);
        assert!(rotations.iter().all(|r| r.verified == 0));
    }

    #[test]
    fn summary_applies_formulas_to_totals() {
        let intern = Uuid::new_v4();
        let icu = Uuid::new_v4();
        let er = Uuid::new_v4();
        let requirements = vec![
            requirement(icu, "ICU", Uuid::new_v4(), 5),
            requirement(er, "Emergency", Uuid::new_v4(), 5),
        ];
        let logs = vec![
            log(intern, icu, Uuid::new_v4(), VerificationStatus::Approved, 4),
            log(intern, er, Uuid::new_v4(), VerificationStatus::Pending, 3),
        ];

        let summary = summarize(&rotation_progress(&requirements, &logs));
        assert_eq!(summary.required, 10);
        assert_eq!(summary.verified, 4);
        assert_eq!(summary.pending, 3);
        assert_eq!(summary.completion_percentage, 40);
        assert_eq!(summary.over_achieved, 0);
    }

    #[test]
    fn empty_inputs_summarize_to_zero() {
        let summary = summarize(&rotation_progress(&[], &[]));
        assert_eq!(summary.required, 0);
        assert_eq!(summary.verified, 0);
        assert_eq!(summary.completion_percentage, 100);
        assert_eq!(summary.over_achievement_percentage, 0);
    }
}
