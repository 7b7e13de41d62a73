use chrono::Utc;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::{
    auth::{Actor, Role},
    error::{AppError, AppResult},
    grading,
    models::*,
    progress::{self, EnrollmentState},
    store::{CourseStore, StoreResult},
};

/// Course operations over an injected store. Every mutation loads the course,
/// changes it in memory and writes the whole document back once.
///
/// The schema is migrated before first use. A failed attempt is retried on the
/// next request, so a service started without a database recovers once it
/// answers.
#[derive(Clone)]
pub struct CourseService {
    store: Arc<dyn CourseStore>,
    schema: Arc<OnceCell<()>>,
}

fn check_non_negative(field: &str, v: f64) -> AppResult<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{field} must be a non-negative number")))
    }
}

fn check_non_empty(field: &str, v: &str) -> AppResult<()> {
    if v.trim().is_empty() {
        Err(AppError::Validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

fn build_lecture(req: LectureReq) -> AppResult<Lecture> {
    check_non_empty("lecture title", &req.title)?;
    if let Some(d) = req.duration {
        check_non_negative("lecture duration", d)?;
    }
    Ok(Lecture {
        id: Uuid::new_v4(),
        title: req.title,
        description: req.description,
        content: req.content,
        kind: req.kind,
        duration: req.duration,
        resources: req.resources,
        is_published: req.is_published,
    })
}

fn progress_not_found(course_id: Uuid, student_id: &str) -> AppError {
    AppError::NotFound(format!(
        "Progress for student {student_id} not found in course {course_id}"
    ))
}

impl CourseService {
    pub fn new(store: Arc<dyn CourseStore>) -> Self {
        Self { store, schema: Arc::new(OnceCell::new()) }
    }

    pub async fn ensure_schema(&self) -> StoreResult<()> {
        self.schema
            .get_or_try_init(|| async {
                self.store.migrate().await?;
                tracing::info!("database schema ready");
                Ok::<_, sqlx::Error>(())
            })
            .await?;
        Ok(())
    }

    /// Healthy only when the database answers and the schema is in place.
    pub async fn ping(&self) -> StoreResult<()> {
        self.store.ping().await?;
        self.ensure_schema().await
    }

    async fn ready_store(&self) -> AppResult<&dyn CourseStore> {
        self.ensure_schema().await?;
        Ok(self.store.as_ref())
    }

    pub async fn shutdown(&self) {
        self.store.close().await;
    }

    async fn load(&self, id: Uuid) -> AppResult<Course> {
        self.ready_store()
            .await?
            .fetch(id)
            .await?
            .ok_or_else(|| AppError::not_found("Course", id))
    }

    async fn save(&self, course: &mut Course) -> AppResult<()> {
        course.updated_at = Utc::now();
        if self.ready_store().await?.replace(course).await? {
            Ok(())
        } else {
            Err(AppError::not_found("Course", course.id))
        }
    }

    // --- courses ---

    pub async fn create_course(&self, actor: &Actor, req: CreateCourseReq) -> AppResult<Course> {
        let instructor = match actor.role {
            Role::Instructor => actor.id.clone(),
            Role::Admin => req.instructor.clone().unwrap_or_else(|| actor.id.clone()),
            Role::Student => {
                return Err(AppError::Forbidden("only instructors can create courses".into()))
            }
        };
        check_non_empty("title", &req.title)?;
        check_non_negative("duration", req.duration)?;
        check_non_negative("price", req.price)?;

        let now = Utc::now();
        let course = Course {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            instructor,
            duration: req.duration,
            price: req.price,
            category: req.category,
            thumbnail: req.thumbnail,
            level: req.level,
            status: req.status,
            modules: Vec::new(),
            enrolled_students: Vec::new(),
            student_progress: Vec::new(),
            reviews: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.ready_store().await?.insert(&course).await?;
        tracing::info!(course_id = %course.id, instructor = %course.instructor, "course created");
        Ok(course)
    }

    pub async fn list_courses(&self, filter: &CourseFilter) -> AppResult<Vec<Course>> {
        Ok(self.ready_store().await?.list(filter).await?)
    }

    pub async fn get_course(&self, id: Uuid) -> AppResult<Course> {
        self.load(id).await
    }

    pub async fn update_course(&self, actor: &Actor, id: Uuid, patch: UpdateCourseReq) -> AppResult<Course> {
        let mut course = self.load(id).await?;
        actor.require_owner(&course)?;

        if let Some(title) = patch.title {
            check_non_empty("title", &title)?;
            course.title = title;
        }
        if let Some(description) = patch.description {
            course.description = description;
        }
        if let Some(duration) = patch.duration {
            check_non_negative("duration", duration)?;
            course.duration = duration;
        }
        if let Some(price) = patch.price {
            check_non_negative("price", price)?;
            course.price = price;
        }
        if patch.category.is_some() {
            course.category = patch.category;
        }
        if patch.thumbnail.is_some() {
            course.thumbnail = patch.thumbnail;
        }
        if patch.level.is_some() {
            course.level = patch.level;
        }
        if let Some(status) = patch.status {
            course.status = status;
        }

        self.save(&mut course).await?;
        Ok(course)
    }

    pub async fn delete_course(&self, actor: &Actor, id: Uuid) -> AppResult<()> {
        let course = self.load(id).await?;
        actor.require_owner(&course)?;
        if !self.ready_store().await?.delete(id).await? {
            return Err(AppError::not_found("Course", id));
        }
        tracing::info!(course_id = %id, "course deleted");
        Ok(())
    }

    // --- content ---

    pub async fn add_module(&self, actor: &Actor, course_id: Uuid, req: ModuleReq) -> AppResult<Course> {
        let mut course = self.load(course_id).await?;
        actor.require_owner(&course)?;
        check_non_empty("module title", &req.title)?;
        if let Some(d) = req.duration {
            check_non_negative("module duration", d)?;
        }

        let lectures = req
            .lectures
            .into_iter()
            .map(build_lecture)
            .collect::<AppResult<Vec<_>>>()?;
        let module = Module {
            id: Uuid::new_v4(),
            title: req.title,
            description: req.description,
            order: req.order,
            lectures,
            assessments: Vec::new(),
            resources: req.resources,
            is_published: req.is_published,
            duration: req.duration,
        };

        // keep modules ordered; equal orders stay in insertion order
        let at = course
            .modules
            .iter()
            .position(|m| m.order > module.order)
            .unwrap_or(course.modules.len());
        course.modules.insert(at, module);

        self.save(&mut course).await?;
        Ok(course)
    }

    pub async fn add_lecture(
        &self,
        actor: &Actor,
        course_id: Uuid,
        module_id: Uuid,
        req: LectureReq,
    ) -> AppResult<Course> {
        let mut course = self.load(course_id).await?;
        actor.require_owner(&course)?;
        let lecture = build_lecture(req)?;
        course
            .module_mut(module_id)
            .ok_or_else(|| AppError::not_found("Module", module_id))?
            .lectures
            .push(lecture);
        self.save(&mut course).await?;
        Ok(course)
    }

    pub async fn add_assessment(
        &self,
        actor: &Actor,
        course_id: Uuid,
        module_id: Uuid,
        req: AssessmentReq,
    ) -> AppResult<Course> {
        let mut course = self.load(course_id).await?;
        actor.require_owner(&course)?;
        let module = course
            .module_mut(module_id)
            .ok_or_else(|| AppError::not_found("Module", module_id))?;
        module.assessments.push(grading::build_assessment(req)?);
        self.save(&mut course).await?;
        Ok(course)
    }

    // --- enrollment ---

    pub async fn enroll(&self, actor: &Actor, course_id: Uuid, student_id: &str) -> AppResult<Course> {
        let mut course = self.load(course_id).await?;
        actor.require_student_access(&course, student_id)?;
        check_non_empty("studentId", student_id)?;

        let fresh = progress::enrollment_state(&course, student_id) == EnrollmentState::NotEnrolled
            && !course.is_enrolled(student_id);
        if fresh && course.status == CourseStatus::Archived {
            return Err(AppError::Domain("cannot enroll in an archived course".into()));
        }

        if progress::enroll(&mut course, student_id, Utc::now()) {
            self.save(&mut course).await?;
            tracing::info!(course_id = %course_id, student_id, repaired = !fresh, "student enrolled");
        }
        Ok(course)
    }

    pub async fn unenroll(&self, actor: &Actor, course_id: Uuid, student_id: &str) -> AppResult<Course> {
        let mut course = self.load(course_id).await?;
        actor.require_student_access(&course, student_id)?;

        let state = progress::enrollment_state(&course, student_id);
        if !progress::unenroll(&mut course, student_id) {
            return Err(AppError::NotFound(format!(
                "Student {student_id} is not enrolled in course {course_id}"
            )));
        }
        self.save(&mut course).await?;
        tracing::info!(course_id = %course_id, student_id, from = ?state, "student unenrolled");
        Ok(course)
    }

    // --- progress ---

    pub async fn get_progress(&self, course_id: Uuid, student_id: &str) -> AppResult<StudentProgress> {
        let course = self.load(course_id).await?;
        course
            .progress_of(student_id)
            .cloned()
            .ok_or_else(|| progress_not_found(course_id, student_id))
    }

    pub async fn update_progress(
        &self,
        actor: &Actor,
        course_id: Uuid,
        student_id: &str,
        update: ProgressUpdate,
    ) -> AppResult<StudentProgress> {
        let mut course = self.load(course_id).await?;
        actor.require_student_access(&course, student_id)?;

        let now = Utc::now();
        let Course { modules, student_progress, .. } = &mut course;
        let record = student_progress
            .iter_mut()
            .find(|p| p.student_id == student_id)
            .ok_or_else(|| progress_not_found(course_id, student_id))?;
        let completed = progress::apply_update(modules, record, update, now)?;
        let snapshot = record.clone();

        self.save(&mut course).await?;
        if completed {
            tracing::info!(course_id = %course_id, student_id, "course completed");
        }
        Ok(snapshot)
    }

    pub async fn submit_assessment(
        &self,
        actor: &Actor,
        course_id: Uuid,
        module_id: Uuid,
        assessment_id: Uuid,
        student_id: &str,
        submission: SubmissionReq,
    ) -> AppResult<SubmissionOutcome> {
        let mut course = self.load(course_id).await?;
        actor.require_student_access(&course, student_id)?;

        let assessment = course
            .module(module_id)
            .ok_or_else(|| AppError::not_found("Module", module_id))?
            .assessments
            .iter()
            .find(|a| a.id == assessment_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Assessment", assessment_id))?;

        let now = Utc::now();
        let Course { modules, student_progress, .. } = &mut course;
        let record = student_progress
            .iter_mut()
            .find(|p| p.student_id == student_id)
            .ok_or_else(|| progress_not_found(course_id, student_id))?;

        if let Some(max) = assessment.max_attempts {
            if progress::attempts_used(record, assessment_id) >= max {
                return Err(AppError::Domain(format!(
                    "maximum of {max} attempts reached for this assessment"
                )));
            }
        }

        let grade = grading::grade(&assessment, &submission);
        let attempts = progress::record_attempt(record, module_id, assessment_id, &grade, now);
        let completed = progress::recompute(modules, record, now);
        let snapshot = record.clone();

        self.save(&mut course).await?;
        tracing::info!(
            course_id = %course_id,
            %assessment_id,
            student_id,
            score = grade.score,
            attempts,
            "assessment submitted"
        );
        if completed {
            tracing::info!(course_id = %course_id, student_id, "course completed");
        }

        Ok(SubmissionOutcome {
            assessment_id,
            grade,
            attempts,
            progress: snapshot,
        })
    }

    pub async fn generate_certificate(
        &self,
        actor: &Actor,
        course_id: Uuid,
        student_id: &str,
    ) -> AppResult<CertificateSummary> {
        let mut course = self.load(course_id).await?;
        actor.require_student_access(&course, student_id)?;

        let now = Utc::now();
        let course_name = course.title.clone();
        let record = course
            .progress_of_mut(student_id)
            .ok_or_else(|| progress_not_found(course_id, student_id))?;
        let newly_issued = progress::issue_certificate(record, now)?;
        let summary = CertificateSummary {
            course_id,
            student_id: student_id.to_string(),
            course_name,
            completion_date: record.completion_date,
            certificate_issued_date: record.certificate_issued_date.unwrap_or(now),
        };

        if newly_issued {
            self.save(&mut course).await?;
            tracing::info!(course_id = %course_id, student_id, "certificate issued");
        }
        Ok(summary)
    }

    // --- reviews & students ---

    pub async fn add_review(&self, actor: &Actor, course_id: Uuid, req: ReviewReq) -> AppResult<Course> {
        let mut course = self.load(course_id).await?;
        if actor.id != req.student_id && !actor.is_admin() {
            return Err(AppError::Forbidden("reviews can only be written by the student".into()));
        }
        if !(1..=5).contains(&req.rating) {
            return Err(AppError::Validation("rating must be between 1 and 5".into()));
        }
        if !course.is_enrolled(&req.student_id) {
            return Err(AppError::Forbidden("only enrolled students can review a course".into()));
        }
        if course.reviews.iter().any(|r| r.student_id == req.student_id) {
            return Err(AppError::Conflict("student has already reviewed this course".into()));
        }

        course.reviews.push(Review {
            id: Uuid::new_v4(),
            student_id: req.student_id,
            rating: req.rating,
            comment: req.comment,
            created_at: Utc::now(),
        });
        self.save(&mut course).await?;
        Ok(course)
    }

    pub async fn student_courses(&self, student_id: &str) -> AppResult<Vec<EnrollmentSummary>> {
        let filter = CourseFilter { student: Some(student_id.to_string()), ..Default::default() };
        let courses = self.ready_store().await?.list(&filter).await?;
        Ok(courses
            .iter()
            .map(|c| {
                let p = c.progress_of(student_id);
                EnrollmentSummary {
                    course_id: c.id,
                    title: c.title.clone(),
                    overall_progress: p.map_or(0.0, |p| p.overall_progress),
                    completed: p.is_some_and(|p| p.completed),
                    certificate_issued: p.is_some_and(|p| p.certificate_issued),
                }
            })
            .collect())
    }
}
