use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::{auth::Actor, error::AppResult, models::*, service::CourseService};

#[derive(Clone)]
pub struct AppState {
    pub service: CourseService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // courses
        .route("/courses", post(create_course).get(list_courses))
        .route("/courses/category/:category", get(courses_by_category))
        .route("/courses/instructor/:instructor_id", get(courses_by_instructor))
        .route(
            "/courses/:id",
            get(get_course).patch(update_course).delete(delete_course),
        )
        // enrollment
        .route("/courses/:id/enroll/:student_id", post(enroll).delete(unenroll))
        // content
        .route("/courses/:id/modules", post(add_module))
        .route("/courses/:id/modules/:module_id/lectures", post(add_lecture))
        .route("/courses/:id/modules/:module_id/assessments", post(add_assessment))
        .route(
            "/courses/:id/modules/:module_id/assessments/:assessment_id/submit",
            post(submit_assessment),
        )
        // progress
        .route(
            "/courses/:id/progress/:student_id",
            post(update_progress).get(get_progress),
        )
        .route("/courses/:id/certificate/:student_id", post(generate_certificate))
        .route("/courses/:id/reviews", post(add_review))
        .route("/students/:student_id/courses", get(student_courses))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let timestamp = Utc::now().to_rfc3339();
    match state.service.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "ok", "database": "up", "timestamp": timestamp })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "error",
                    "database": "down",
                    "error": e.to_string(),
                    "timestamp": timestamp,
                })),
            )
        }
    }
}

// --- courses ---

async fn create_course(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreateCourseReq>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let course = state.service.create_course(&actor, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn list_courses(
    State(state): State<AppState>,
    Query(filter): Query<CourseFilter>,
) -> AppResult<Json<Vec<Course>>> {
    Ok(Json(state.service.list_courses(&filter).await?))
}

async fn courses_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> AppResult<Json<Vec<Course>>> {
    let filter = CourseFilter { category: Some(category), ..Default::default() };
    Ok(Json(state.service.list_courses(&filter).await?))
}

async fn courses_by_instructor(
    State(state): State<AppState>,
    Path(instructor_id): Path<String>,
) -> AppResult<Json<Vec<Course>>> {
    let filter = CourseFilter { instructor: Some(instructor_id), ..Default::default() };
    Ok(Json(state.service.list_courses(&filter).await?))
}

async fn get_course(State(state): State<AppState>, Path(id): Path<Uuid>) -> AppResult<Json<Course>> {
    Ok(Json(state.service.get_course(id).await?))
}

async fn update_course(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<UpdateCourseReq>,
) -> AppResult<Json<Course>> {
    Ok(Json(state.service.update_course(&actor, id, patch).await?))
}

async fn delete_course(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.service.delete_course(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// --- enrollment ---

async fn enroll(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, student_id)): Path<(Uuid, String)>,
) -> AppResult<Json<Course>> {
    Ok(Json(state.service.enroll(&actor, id, &student_id).await?))
}

async fn unenroll(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, student_id)): Path<(Uuid, String)>,
) -> AppResult<Json<Course>> {
    Ok(Json(state.service.unenroll(&actor, id, &student_id).await?))
}

// --- content ---

async fn add_module(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<ModuleReq>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let course = state.service.add_module(&actor, id, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn add_lecture(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, module_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<LectureReq>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let course = state.service.add_lecture(&actor, id, module_id, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn add_assessment(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, module_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<AssessmentReq>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let course = state.service.add_assessment(&actor, id, module_id, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentQuery {
    student_id: String,
}

async fn submit_assessment(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, module_id, assessment_id)): Path<(Uuid, Uuid, Uuid)>,
    Query(q): Query<StudentQuery>,
    Json(submission): Json<SubmissionReq>,
) -> AppResult<Json<SubmissionOutcome>> {
    let outcome = state
        .service
        .submit_assessment(&actor, id, module_id, assessment_id, &q.student_id, submission)
        .await?;
    Ok(Json(outcome))
}

// --- progress ---

async fn update_progress(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, student_id)): Path<(Uuid, String)>,
    Json(update): Json<ProgressUpdate>,
) -> AppResult<Json<StudentProgress>> {
    Ok(Json(state.service.update_progress(&actor, id, &student_id, update).await?))
}

async fn get_progress(
    State(state): State<AppState>,
    Path((id, student_id)): Path<(Uuid, String)>,
) -> AppResult<Json<StudentProgress>> {
    Ok(Json(state.service.get_progress(id, &student_id).await?))
}

async fn generate_certificate(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, student_id)): Path<(Uuid, String)>,
) -> AppResult<Json<CertificateSummary>> {
    Ok(Json(state.service.generate_certificate(&actor, id, &student_id).await?))
}

async fn add_review(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    Json(req): Json<ReviewReq>,
) -> AppResult<(StatusCode, Json<Course>)> {
    let course = state.service.add_review(&actor, id, req).await?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn student_courses(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> AppResult<Json<Vec<EnrollmentSummary>>> {
    Ok(Json(state.service.student_courses(&student_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{USER_ID_HEADER, USER_ROLE_HEADER},
        store::memory::MemoryCourseStore,
    };
    use axum::{body::Body, http::Request};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let service = CourseService::new(Arc::new(MemoryCourseStore::default()));
        router(AppState { service })
    }

    async fn call(
        app: &Router,
        method: &str,
        uri: &str,
        who: Option<(&str, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = who {
            req = req.header(USER_ID_HEADER, id).header(USER_ROLE_HEADER, role);
        }
        let req = match body {
            Some(b) => req
                .header("content-type", "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    const INSTRUCTOR: Option<(&str, &str)> = Some(("teacher-1", "instructor"));
    const STUDENT: Option<(&str, &str)> = Some(("s1", "student"));

    async fn seeded(app: &Router) -> (String, String) {
        let (status, course) = call(
            app,
            "POST",
            "/courses",
            INSTRUCTOR,
            Some(json!({ "title": "Rust 101", "description": "d", "duration": 60, "status": "published" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = course["id"].as_str().unwrap().to_string();

        let (status, course) = call(
            app,
            "POST",
            &format!("/courses/{id}/modules"),
            INSTRUCTOR,
            Some(json!({ "title": "Basics", "description": "", "order": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let module_id = course["modules"][0]["id"].as_str().unwrap().to_string();
        (id, module_id)
    }

    #[tokio::test]
    async fn health_reports_database_up() {
        let (status, body) = call(&app(), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["database"], "up");
    }

    #[tokio::test]
    async fn mutations_need_identity() {
        let (status, body) = call(
            &app(),
            "POST",
            "/courses",
            None,
            Some(json!({ "title": "t", "description": "d", "duration": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["statusCode"], 401);
    }

    #[tokio::test]
    async fn unknown_course_is_404() {
        let uri = format!("/courses/{}", Uuid::new_v4());
        let (status, body) = call(&app(), "GET", &uri, None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");
    }

    #[tokio::test]
    async fn full_student_journey() {
        let app = app();
        let (id, module_id) = seeded(&app).await;

        let (status, course) = call(&app, "POST", &format!("/courses/{id}/enroll/s1"), STUDENT, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(course["enrolledStudents"], json!(["s1"]));

        let (status, _) = call(&app, "POST", &format!("/courses/{id}/certificate/s1"), STUDENT, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, progress) = call(
            &app,
            "POST",
            &format!("/courses/{id}/progress/s1"),
            STUDENT,
            Some(json!({ "moduleProgress": [{ "moduleId": module_id, "progress": 100 }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["overallProgress"], 100.0);
        assert_eq!(progress["completed"], true);

        let (status, cert) = call(&app, "POST", &format!("/courses/{id}/certificate/s1"), STUDENT, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cert["courseName"], "Rust 101");
        let (_, again) = call(&app, "POST", &format!("/courses/{id}/certificate/s1"), STUDENT, None).await;
        assert_eq!(cert["certificateIssuedDate"], again["certificateIssuedDate"]);

        let (status, mine) = call(&app, "GET", "/students/s1/courses", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine[0]["certificateIssued"], true);

        let (status, course) = call(&app, "DELETE", &format!("/courses/{id}/enroll/s1"), STUDENT, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(course["enrolledStudents"], json!([]));
        assert_eq!(course["studentProgress"], json!([]));
    }

    #[tokio::test]
    async fn submit_assessment_through_http() {
        let app = app();
        let (id, module_id) = seeded(&app).await;
        let (status, course) = call(
            &app,
            "POST",
            &format!("/courses/{id}/modules/{module_id}/assessments"),
            INSTRUCTOR,
            Some(json!({
                "title": "Check",
                "description": "",
                "questions": [{ "text": "2 + 2?", "type": "short-answer", "correctAnswer": ["4"] }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let assessment = &course["modules"][0]["assessments"][0];
        let assessment_id = assessment["id"].as_str().unwrap();
        let question_id = assessment["questions"][0]["id"].as_str().unwrap();

        call(&app, "POST", &format!("/courses/{id}/enroll/s1"), STUDENT, None).await;
        let uri = format!("/courses/{id}/modules/{module_id}/assessments/{assessment_id}/submit?studentId=s1");
        let body = json!({ "answers": [{ "questionId": question_id, "response": ["4"] }] });

        let (status, outcome) = call(&app, "POST", &uri, STUDENT, Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["grade"]["score"], 100.0);
        assert_eq!(outcome["attempts"], 1);

        let (_, outcome) = call(&app, "POST", &uri, STUDENT, Some(body)).await;
        assert_eq!(outcome["attempts"], 2);
        assert_eq!(outcome["progress"]["assessmentScores"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn category_route_filters() {
        let app = app();
        seeded(&app).await;
        let (status, list) = call(&app, "GET", "/courses/category/none", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list, json!([]));

        let (_, list) = call(&app, "GET", "/courses/instructor/teacher-1", None, None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);

        let (_, list) = call(&app, "GET", "/courses?status=published", None, None).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn progress_body_cannot_set_derived_fields() {
        let app = app();
        let (id, module_id) = seeded(&app).await;
        call(&app, "POST", &format!("/courses/{id}/enroll/s1"), STUDENT, None).await;

        let (status, progress) = call(
            &app,
            "POST",
            &format!("/courses/{id}/progress/s1"),
            STUDENT,
            Some(json!({
                "overallProgress": 100,
                "completed": true,
                "completionDate": "2024-01-01T00:00:00Z",
                "certificateIssued": true,
                "moduleProgress": [],
                "assessmentScores": [{ "assessmentId": module_id, "score": 100, "passed": true }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, stored) = call(&app, "GET", &format!("/courses/{id}/progress/s1"), None, None).await;
        assert_eq!(stored, progress);
        assert_eq!(stored["overallProgress"], 0.0);
        assert_eq!(stored["completed"], false);
        assert_eq!(stored["certificateIssued"], false);
        assert_eq!(stored["completionDate"], Value::Null);
        assert_eq!(stored["assessmentScores"], json!([]));

        let (status, _) = call(&app, "POST", &format!("/courses/{id}/certificate/s1"), STUDENT, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn clearing_scores_over_http_keeps_attempt_limit() {
        let app = app();
        let (id, module_id) = seeded(&app).await;
        let (_, course) = call(
            &app,
            "POST",
            &format!("/courses/{id}/modules/{module_id}/assessments"),
            INSTRUCTOR,
            Some(json!({
                "title": "Once",
                "description": "",
                "maxAttempts": 1,
                "questions": [{ "text": "2 + 2?", "type": "short-answer", "correctAnswer": ["4"] }]
            })),
        )
        .await;
        let assessment_id = course["modules"][0]["assessments"][0]["id"].as_str().unwrap().to_string();
        call(&app, "POST", &format!("/courses/{id}/enroll/s1"), STUDENT, None).await;

        let uri = format!("/courses/{id}/modules/{module_id}/assessments/{assessment_id}/submit?studentId=s1");
        let (status, _) = call(&app, "POST", &uri, STUDENT, Some(json!({ "answers": [] }))).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "POST", &uri, STUDENT, Some(json!({ "answers": [] }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, progress) = call(
            &app,
            "POST",
            &format!("/courses/{id}/progress/s1"),
            STUDENT,
            Some(json!({ "assessmentScores": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(progress["assessmentScores"][0]["attempts"], 1);

        let (status, _) = call(&app, "POST", &uri, STUDENT, Some(json!({ "answers": [] }))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
