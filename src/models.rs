use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CourseStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl CourseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// One course document. Everything a course owns is nested here and the
/// document is always written back whole.
#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub instructor: String,
    pub duration: f64,
    #[serde(default)]
    pub price: f64,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub level: Option<CourseLevel>,
    #[serde(default)]
    pub status: CourseStatus,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub enrolled_students: Vec<String>,
    #[serde(default)]
    pub student_progress: Vec<StudentProgress>,
    #[serde(default)]
    pub reviews: Vec<Review>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn module(&self, module_id: Uuid) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == module_id)
    }

    pub fn module_mut(&mut self, module_id: Uuid) -> Option<&mut Module> {
        self.modules.iter_mut().find(|m| m.id == module_id)
    }

    pub fn progress_of(&self, student_id: &str) -> Option<&StudentProgress> {
        self.student_progress.iter().find(|p| p.student_id == student_id)
    }

    pub fn progress_of_mut(&mut self, student_id: &str) -> Option<&mut StudentProgress> {
        self.student_progress.iter_mut().find(|p| p.student_id == student_id)
    }

    pub fn is_enrolled(&self, student_id: &str) -> bool {
        self.enrolled_students.iter().any(|s| s == student_id)
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub order: i32,
    #[serde(default)]
    pub lectures: Vec<Lecture>,
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub is_published: bool,
    pub duration: Option<f64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LectureKind {
    Video,
    Text,
    Audio,
    Document,
    Interactive,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lecture {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: LectureKind,
    pub duration: Option<f64>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub is_published: bool,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Resource {
    pub title: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    ShortAnswer,
    Essay,
    Matching,
    FillBlank,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: Vec<String>,
    pub points: f64,
    pub explanation: Option<String>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    pub time_limit: Option<u32>,
    pub passing_score: f64,
    pub max_attempts: Option<u32>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudentProgress {
    pub student_id: String,
    pub overall_progress: f64,
    pub last_access_date: DateTime<Utc>,
    #[serde(default)]
    pub module_progress: Vec<ModuleProgress>,
    #[serde(default)]
    pub assessment_scores: Vec<AssessmentScore>,
    #[serde(default)]
    pub total_time_spent: f64,
    #[serde(default)]
    pub completed: bool,
    pub completion_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub certificate_issued: bool,
    pub certificate_issued_date: Option<DateTime<Utc>>,
}

impl StudentProgress {
    /// Zeroed record created on enrollment.
    pub fn new(student_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            student_id: student_id.into(),
            overall_progress: 0.0,
            last_access_date: now,
            module_progress: Vec::new(),
            assessment_scores: Vec::new(),
            total_time_spent: 0.0,
            completed: false,
            completion_date: None,
            certificate_issued: false,
            certificate_issued_date: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub module_id: Uuid,
    pub progress: f64,
    #[serde(default)]
    pub completed_lectures: Vec<Uuid>,
    #[serde(default)]
    pub completed_assessments: Vec<Uuid>,
    #[serde(default)]
    pub time_spent: f64,
}

impl ModuleProgress {
    pub fn empty(module_id: Uuid) -> Self {
        Self {
            module_id,
            progress: 0.0,
            completed_lectures: Vec::new(),
            completed_assessments: Vec::new(),
            time_spent: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentScore {
    pub assessment_id: Uuid,
    pub score: f64,
    pub attempts: u32,
    pub last_attempt_date: DateTime<Utc>,
    #[serde(default)]
    pub passed: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    pub student_id: String,
    pub rating: u8,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

// --- requests ---

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreateCourseReq {
    pub title: String,
    pub description: String,
    /// Only honoured for admins; instructors always own what they create.
    pub instructor: Option<String>,
    pub duration: f64,
    #[serde(default)]
    pub price: f64,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub level: Option<CourseLevel>,
    #[serde(default)]
    pub status: CourseStatus,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCourseReq {
    pub title: Option<String>,
    pub description: Option<String>,
    pub duration: Option<f64>,
    pub price: Option<f64>,
    pub category: Option<String>,
    pub thumbnail: Option<String>,
    pub level: Option<CourseLevel>,
    pub status: Option<CourseStatus>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct CourseFilter {
    pub category: Option<String>,
    pub instructor: Option<String>,
    pub status: Option<CourseStatus>,
    /// Restrict to courses this student is enrolled in.
    #[serde(skip)]
    pub student: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReq {
    pub title: String,
    pub description: String,
    pub order: i32,
    #[serde(default)]
    pub lectures: Vec<LectureReq>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub is_published: bool,
    pub duration: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LectureReq {
    pub title: String,
    pub description: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: LectureKind,
    pub duration: Option<f64>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub is_published: bool,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReq {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: Vec<String>,
    pub points: Option<f64>,
    pub explanation: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReq {
    pub title: String,
    pub description: String,
    pub questions: Vec<QuestionReq>,
    pub time_limit: Option<u32>,
    pub passing_score: Option<f64>,
    pub max_attempts: Option<u32>,
}

/// Partial progress sent by the client. Any field given replaces the stored value.
///
/// Attempt records are written only by assessment submission, so an
/// `assessmentScores` field in the body is ignored along with the derived
/// completion and certificate fields.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub module_progress: Option<Vec<ModuleProgress>>,
    pub total_time_spent: Option<f64>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AnswerReq {
    pub question_id: Uuid,
    #[serde(default)]
    pub response: Vec<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SubmissionReq {
    #[serde(default)]
    pub answers: Vec<AnswerReq>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ReviewReq {
    pub student_id: String,
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

// --- responses ---

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub score: f64,
    pub points_earned: f64,
    pub points_possible: f64,
    pub passed: bool,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionOutcome {
    pub assessment_id: Uuid,
    pub grade: Grade,
    pub attempts: u32,
    pub progress: StudentProgress,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSummary {
    pub course_id: Uuid,
    pub student_id: String,
    pub course_name: String,
    pub completion_date: Option<DateTime<Utc>>,
    pub certificate_issued_date: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSummary {
    pub course_id: Uuid,
    pub title: String,
    pub overall_progress: f64,
    pub completed: bool,
    pub certificate_issued: bool,
}
