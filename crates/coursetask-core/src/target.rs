//! Targets visited by update tasks: students and their per-problem state.

use crate::{CourseId, CoreError, ModuleId, StudentId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A student account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub username: String,
    pub email: String,
}

impl Student {
    /// Create a new Student.
    pub fn new(id: impl Into<StudentId>, username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            email: email.into(),
        }
    }
}

/// Enrollment of a student in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub student_id: StudentId,
    pub course_id: CourseId,
}

/// Stored state of one student for one problem of a course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentModule {
    /// Row key.
    pub id: ModuleId,

    /// Owning student.
    pub student_id: StudentId,

    /// Course the problem belongs to.
    pub course_id: CourseId,

    /// Location of the problem within the course.
    pub module_state_key: String,

    /// Problem state as a JSON object string, if any has been saved.
    pub state: Option<String>,

    /// Score earned on the problem.
    pub grade: Option<f64>,

    /// Maximum score for the problem.
    pub max_grade: Option<f64>,
}

impl StudentModule {
    /// Create a new StudentModule without state or score.
    pub fn new(
        id: impl Into<ModuleId>,
        student_id: impl Into<StudentId>,
        course_id: impl Into<CourseId>,
        module_state_key: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            student_id: student_id.into(),
            course_id: course_id.into(),
            module_state_key: module_state_key.into(),
            state: None,
            grade: None,
            max_grade: None,
        }
    }

    /// Builder method to set the serialized state.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Builder method to set the score.
    pub fn with_grade(mut self, grade: f64, max_grade: f64) -> Self {
        self.grade = Some(grade);
        self.max_grade = Some(max_grade);
        self
    }

    /// Parse the stored state. Missing or empty state is an empty object.
    pub fn problem_state(&self) -> Result<Map<String, Value>, CoreError> {
        match self.state.as_deref() {
            None | Some("") => Ok(Map::new()),
            Some(raw) => match serde_json::from_str(raw)? {
                Value::Object(map) => Ok(map),
                other => Err(CoreError::InvalidInput(format!(
                    "state of module {} is not an object: {other}",
                    self.id
                ))),
            },
        }
    }

    /// Replace the stored state.
    pub fn set_problem_state(&mut self, state: &Map<String, Value>) -> Result<(), CoreError> {
        self.state = Some(serde_json::to_string(state)?);
        Ok(())
    }
}

/// Grade summary computed offline for a student in a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfflineGrade {
    pub student_id: StudentId,
    pub course_id: CourseId,
    /// Gradeset as JSON.
    pub gradeset: String,
}
