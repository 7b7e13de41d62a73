use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{error::AppError, models::Course};

/// Set by the upstream auth gateway after it has verified the bearer token.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Instructor,
    Admin,
}

impl Role {
    fn parse(v: &str) -> Option<Self> {
        match v.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "instructor" | "teacher" => Some(Self::Instructor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The verified caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn owns(&self, course: &Course) -> bool {
        self.is_admin() || (self.role == Role::Instructor && course.instructor == self.id)
    }

    pub fn require_owner(&self, course: &Course) -> Result<(), AppError> {
        if self.owns(course) {
            Ok(())
        } else {
            Err(AppError::Forbidden("only the course instructor can modify this course".into()))
        }
    }

    /// The student themself, the course instructor, or an admin.
    pub fn require_student_access(&self, course: &Course, student_id: &str) -> Result<(), AppError> {
        if self.id == student_id || self.owns(course) {
            Ok(())
        } else {
            Err(AppError::Forbidden("not allowed to act for this student".into()))
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let id = header(USER_ID_HEADER).ok_or(AppError::Unauthorized)?;
        let role = header(USER_ROLE_HEADER)
            .and_then(Role::parse)
            .ok_or(AppError::Unauthorized)?;
        Ok(Actor::new(id, role))
    }
}
