//! Per-student progress bookkeeping inside a course document.
//!
//! Everything here is pure: callers load the course, apply one of these
//! functions, and write the whole document back.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{AssessmentScore, Course, Grade, Module, ModuleProgress, ProgressUpdate, StudentProgress},
};

/// Enrollment lifecycle as observed from a course document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentState {
    NotEnrolled,
    InProgress,
    Completed,
    CertificateIssued,
}

pub fn enrollment_state(course: &Course, student_id: &str) -> EnrollmentState {
    match course.progress_of(student_id) {
        None => EnrollmentState::NotEnrolled,
        Some(p) if p.certificate_issued => EnrollmentState::CertificateIssued,
        Some(p) if p.completed => EnrollmentState::Completed,
        Some(_) => EnrollmentState::InProgress,
    }
}

/// `100 * completed modules / total modules`, clamped to [0, 100].
///
/// A module counts once no matter how many entries reference it, and entries
/// for modules the course no longer has are ignored.
pub fn overall_progress(modules: &[Module], progress: &StudentProgress) -> f64 {
    if modules.is_empty() {
        return 0.0;
    }
    let known: HashSet<Uuid> = modules.iter().map(|m| m.id).collect();
    let completed: HashSet<Uuid> = progress
        .module_progress
        .iter()
        .filter(|mp| mp.progress >= 100.0 && known.contains(&mp.module_id))
        .map(|mp| mp.module_id)
        .collect();
    (100.0 * completed.len() as f64 / modules.len() as f64).clamp(0.0, 100.0)
}

/// Refreshes `overallProgress` and flips completion on the first crossing of 100.
/// Completion is sticky. Returns true when this call completed the course.
pub fn recompute(modules: &[Module], progress: &mut StudentProgress, now: DateTime<Utc>) -> bool {
    progress.overall_progress = overall_progress(modules, progress);
    if progress.overall_progress >= 100.0 && !progress.completed {
        progress.completed = true;
        progress.completion_date = Some(now);
        return true;
    }
    false
}

fn validate_update(update: &ProgressUpdate) -> AppResult<()> {
    let in_pct = |v: f64| (0.0..=100.0).contains(&v);

    for mp in update.module_progress.iter().flatten() {
        if !in_pct(mp.progress) {
            return Err(AppError::Validation(format!(
                "progress for module {} must be between 0 and 100",
                mp.module_id
            )));
        }
        if mp.time_spent < 0.0 {
            return Err(AppError::Validation("timeSpent must not be negative".into()));
        }
    }
    if update.total_time_spent.is_some_and(|t| t < 0.0) {
        return Err(AppError::Validation("totalTimeSpent must not be negative".into()));
    }
    Ok(())
}

/// Shallow merge: each field present in `update` replaces the stored one.
/// Attempt records are left alone.
/// Returns true when the merge completed the course.
pub fn apply_update(
    modules: &[Module],
    progress: &mut StudentProgress,
    update: ProgressUpdate,
    now: DateTime<Utc>,
) -> AppResult<bool> {
    validate_update(&update)?;

    if let Some(module_progress) = update.module_progress {
        progress.module_progress = module_progress;
    }
    if let Some(total) = update.total_time_spent {
        progress.total_time_spent = total;
    }
    progress.last_access_date = now;

    Ok(recompute(modules, progress, now))
}

/// Records one graded attempt and returns the attempt count for that assessment.
pub fn record_attempt(
    progress: &mut StudentProgress,
    module_id: Uuid,
    assessment_id: Uuid,
    grade: &Grade,
    now: DateTime<Utc>,
) -> u32 {
    let attempts = match progress
        .assessment_scores
        .iter_mut()
        .find(|s| s.assessment_id == assessment_id)
    {
        Some(entry) => {
            entry.attempts = entry.attempts.saturating_add(1);
            entry.score = grade.score;
            entry.passed = grade.passed;
            entry.last_attempt_date = now;
            entry.attempts
        }
        None => {
            progress.assessment_scores.push(AssessmentScore {
                assessment_id,
                score: grade.score,
                attempts: 1,
                last_attempt_date: now,
                passed: grade.passed,
            });
            1
        }
    };

    if grade.passed {
        let idx = match progress
            .module_progress
            .iter()
            .position(|mp| mp.module_id == module_id)
        {
            Some(idx) => idx,
            None => {
                progress.module_progress.push(ModuleProgress::empty(module_id));
                progress.module_progress.len() - 1
            }
        };
        let entry = &mut progress.module_progress[idx];
        if !entry.completed_assessments.contains(&assessment_id) {
            entry.completed_assessments.push(assessment_id);
        }
    }
    progress.last_access_date = now;
    attempts
}

pub fn attempts_used(progress: &StudentProgress, assessment_id: Uuid) -> u32 {
    progress
        .assessment_scores
        .iter()
        .find(|s| s.assessment_id == assessment_id)
        .map_or(0, |s| s.attempts)
}

/// Marks the certificate issued. Returns false when it already was.
pub fn issue_certificate(progress: &mut StudentProgress, now: DateTime<Utc>) -> AppResult<bool> {
    if !progress.completed {
        return Err(AppError::Domain(
            "cannot generate certificate for incomplete course".into(),
        ));
    }
    if progress.certificate_issued {
        return Ok(false);
    }
    progress.certificate_issued = true;
    progress.certificate_issued_date = Some(now);
    Ok(true)
}

/// Makes `student_id` enrolled with exactly one progress record.
/// Returns true when the document changed.
pub fn enroll(course: &mut Course, student_id: &str, now: DateTime<Utc>) -> bool {
    let mut changed = false;
    if !course.is_enrolled(student_id) {
        course.enrolled_students.push(student_id.to_string());
        changed = true;
    }
    if course.progress_of(student_id).is_none() {
        course.student_progress.push(StudentProgress::new(student_id, now));
        changed = true;
    }
    changed
}

/// Drops the student id and its progress record together. Returns false when
/// the student had neither.
pub fn unenroll(course: &mut Course, student_id: &str) -> bool {
    let before = (course.enrolled_students.len(), course.student_progress.len());
    course.enrolled_students.retain(|s| s != student_id);
    course.student_progress.retain(|p| p.student_id != student_id);
    before != (course.enrolled_students.len(), course.student_progress.len())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::CourseStatus;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    pub(crate) fn module(order: i32) -> Module {
        Module {
            id: Uuid::new_v4(),
            title: format!("Module {order}"),
            description: String::new(),
            order,
            lectures: Vec::new(),
            assessments: Vec::new(),
            resources: Vec::new(),
            is_published: true,
            duration: None,
        }
    }

    pub(crate) fn course_with(modules: Vec<Module>) -> Course {
        let now = Utc::now();
        Course {
            id: Uuid::new_v4(),
            title: "Rust 101".into(),
            description: "Intro".into(),
            instructor: "teacher-1".into(),
            duration: 120.0,
            price: 0.0,
            category: Some("programming".into()),
            thumbnail: None,
            level: None,
            status: CourseStatus::Published,
            modules,
            enrolled_students: Vec::new(),
            student_progress: Vec::new(),
            reviews: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn at(module_id: Uuid, progress: f64) -> ModuleProgress {
        ModuleProgress { progress, ..ModuleProgress::empty(module_id) }
    }

    fn update(entries: Vec<ModuleProgress>) -> ProgressUpdate {
        ProgressUpdate { module_progress: Some(entries), ..Default::default() }
    }

    #[test]
    fn two_modules_half_then_complete() {
        let (a, b) = (module(1), module(2));
        let modules = vec![a.clone(), b.clone()];
        let t0 = Utc::now();
        let mut p = StudentProgress::new("s1", t0);

        let done = apply_update(&modules, &mut p, update(vec![at(a.id, 100.0), at(b.id, 50.0)]), t0).unwrap();
        assert!(!done);
        assert_eq!(p.overall_progress, 50.0);
        assert!(!p.completed);

        let t1 = t0 + Duration::minutes(5);
        let done = apply_update(&modules, &mut p, update(vec![at(a.id, 100.0), at(b.id, 100.0)]), t1).unwrap();
        assert!(done);
        assert_eq!(p.overall_progress, 100.0);
        assert_eq!(p.completion_date, Some(t1));

        let t2 = t1 + Duration::minutes(5);
        let done = apply_update(&modules, &mut p, update(vec![at(a.id, 100.0), at(b.id, 100.0)]), t2).unwrap();
        assert!(!done);
        assert_eq!(p.completion_date, Some(t1));
        assert_eq!(p.last_access_date, t2);
    }

    #[test]
    fn completion_is_sticky_when_progress_drops() {
        let a = module(1);
        let modules = vec![a.clone()];
        let t0 = Utc::now();
        let mut p = StudentProgress::new("s1", t0);
        apply_update(&modules, &mut p, update(vec![at(a.id, 100.0)]), t0).unwrap();

        let later = t0 + Duration::hours(1);
        apply_update(&modules, &mut p, update(vec![at(a.id, 10.0)]), later).unwrap();
        assert_eq!(p.overall_progress, 0.0);
        assert!(p.completed);
        assert_eq!(p.completion_date, Some(t0));
    }

    #[rstest]
    #[case::no_modules(0, &[], 0.0)]
    #[case::one_of_three(3, &[100.0, 99.0, 0.0], 100.0 / 3.0)]
    #[case::all(2, &[100.0, 100.0], 100.0)]
    fn ratio_of_completed_modules(#[case] count: usize, #[case] values: &[f64], #[case] expected: f64) {
        let modules: Vec<Module> = (0..count).map(|i| module(i as i32)).collect();
        let mut p = StudentProgress::new("s1", Utc::now());
        p.module_progress = modules.iter().zip(values).map(|(m, v)| at(m.id, *v)).collect();
        assert_eq!(overall_progress(&modules, &p), expected);
    }

    #[test]
    fn duplicate_and_unknown_module_entries_do_not_inflate() {
        let (a, b) = (module(1), module(2));
        let modules = vec![a.clone(), b];
        let mut p = StudentProgress::new("s1", Utc::now());
        p.module_progress = vec![at(a.id, 100.0), at(a.id, 100.0), at(Uuid::new_v4(), 100.0)];
        assert_eq!(overall_progress(&modules, &p), 50.0);
    }

    #[test]
    fn out_of_range_progress_is_rejected_without_mutation() {
        let a = module(1);
        let t0 = Utc::now();
        let mut p = StudentProgress::new("s1", t0);
        let err = apply_update(&[a.clone()], &mut p, update(vec![at(a.id, 140.0)]), t0 + Duration::seconds(1));
        assert!(matches!(err, Err(AppError::Validation(_))));
        assert!(p.module_progress.is_empty());
        assert_eq!(p.last_access_date, t0);
    }

    #[test]
    fn unspecified_fields_are_kept() {
        let a = module(1);
        let t0 = Utc::now();
        let mut p = StudentProgress::new("s1", t0);
        p.total_time_spent = 42.0;
        apply_update(&[a.clone()], &mut p, update(vec![at(a.id, 30.0)]), t0).unwrap();
        assert_eq!(p.total_time_spent, 42.0);
        assert_eq!(p.module_progress.len(), 1);
    }

    #[test]
    fn second_attempt_overwrites_entry() {
        let (module_id, assessment_id) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        let mut p = StudentProgress::new("s1", t0);
        let fail = Grade { score: 40.0, points_earned: 2.0, points_possible: 5.0, passed: false };
        let pass = Grade { score: 80.0, points_earned: 4.0, points_possible: 5.0, passed: true };

        assert_eq!(record_attempt(&mut p, module_id, assessment_id, &fail, t0), 1);
        assert!(p.module_progress.is_empty());

        let t1 = t0 + Duration::minutes(1);
        assert_eq!(record_attempt(&mut p, module_id, assessment_id, &pass, t1), 2);
        assert_eq!(
            p.assessment_scores,
            vec![AssessmentScore { assessment_id, score: 80.0, attempts: 2, last_attempt_date: t1, passed: true }]
        );
        assert_eq!(p.module_progress[0].completed_assessments, vec![assessment_id]);
    }

    #[test]
    fn attempt_counter_saturates() {
        let (module_id, assessment_id) = (Uuid::new_v4(), Uuid::new_v4());
        let t0 = Utc::now();
        let mut p = StudentProgress::new("s1", t0);
        p.assessment_scores.push(AssessmentScore {
            assessment_id,
            score: 0.0,
            attempts: u32::MAX,
            last_attempt_date: t0,
            passed: false,
        });
        let grade = Grade { score: 10.0, points_earned: 1.0, points_possible: 10.0, passed: false };
        assert_eq!(record_attempt(&mut p, module_id, assessment_id, &grade, t0), u32::MAX);
        assert_eq!(attempts_used(&p, assessment_id), u32::MAX);
    }

    #[test]
    fn update_keeps_attempt_records() {
        let a = module(1);
        let t0 = Utc::now();
        let mut p = StudentProgress::new("s1", t0);
        let grade = Grade { score: 80.0, points_earned: 4.0, points_possible: 5.0, passed: true };
        record_attempt(&mut p, a.id, Uuid::new_v4(), &grade, t0);
        let before = p.assessment_scores.clone();

        apply_update(&[a.clone()], &mut p, update(vec![at(a.id, 20.0)]), t0).unwrap();
        assert_eq!(p.assessment_scores, before);
    }

    #[test]
    fn certificate_requires_completion_and_is_idempotent() {
        let t0 = Utc::now();
        let mut p = StudentProgress::new("s1", t0);
        assert!(matches!(issue_certificate(&mut p, t0), Err(AppError::Domain(_))));
        assert!(!p.certificate_issued);

        p.completed = true;
        assert!(issue_certificate(&mut p, t0).unwrap());
        assert!(!issue_certificate(&mut p, t0 + Duration::days(1)).unwrap());
        assert_eq!(p.certificate_issued_date, Some(t0));
    }

    #[test]
    fn enroll_is_idempotent_and_repairs_lockstep() {
        let mut course = course_with(vec![module(1)]);
        let now = Utc::now();
        assert!(enroll(&mut course, "s1", now));
        assert!(!enroll(&mut course, "s1", now));
        assert_eq!(course.enrolled_students, vec!["s1".to_string()]);
        assert_eq!(course.student_progress.len(), 1);

        course.student_progress.clear();
        assert!(enroll(&mut course, "s1", now));
        assert_eq!(course.student_progress.len(), 1);
        assert_eq!(enrollment_state(&course, "s1"), EnrollmentState::InProgress);
    }

    #[test]
    fn unenroll_drops_id_and_record_together() {
        let mut course = course_with(vec![]);
        let now = Utc::now();
        enroll(&mut course, "s1", now);
        enroll(&mut course, "s2", now);
        course.student_progress[0].completed = true;
        course.student_progress[0].certificate_issued = true;
        assert_eq!(enrollment_state(&course, "s1"), EnrollmentState::CertificateIssued);

        assert!(unenroll(&mut course, "s1"));
        assert_eq!(course.enrolled_students, vec!["s2".to_string()]);
        assert_eq!(course.student_progress.len(), 1);
        assert_eq!(enrollment_state(&course, "s1"), EnrollmentState::NotEnrolled);
        assert!(!unenroll(&mut course, "s1"));
    }
}
