use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::trace;

use coursetask_core::{CourseId, Student, StudentModule};

use crate::error::GraderError;
use crate::store::ModuleStateStore;

/// Result of rescoring one problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Rescore {
    /// Raw response; `success` is `correct` or `incorrect` when rescoring
    /// completed.
    pub response: Map<String, Value>,
    /// Module with its recomputed score and state, to be saved.
    pub module: StudentModule,
}

/// Problem grading backend.
#[async_trait]
pub trait Grader: Send + Sync {
    /// Re-evaluate a student's stored answers to one problem.
    async fn rescore(&self, student: &Student, module: &StudentModule) -> Result<Rescore, GraderError>;

    /// Compute the gradeset of a student in a course.
    async fn grade(&self, student: &Student, course_id: &CourseId) -> Result<Value, GraderError>;
}

/// Grades from what is already stored in student module rows.
///
/// Rescoring reads the `correct_map` of a problem's state; grading sums the
/// stored scores of every problem of the course.
pub struct StoredStateGrader {
    modules: Arc<dyn ModuleStateStore>,
}

impl StoredStateGrader {
    pub fn new(modules: Arc<dyn ModuleStateStore>) -> Self {
        Self { modules }
    }
}

#[async_trait]
impl Grader for StoredStateGrader {
    async fn rescore(&self, student: &Student, module: &StudentModule) -> Result<Rescore, GraderError> {
        if module.student_id != student.id {
            return Err(GraderError::ModuleUnavailable {
                module_state_key: module.module_state_key.clone(),
                student: student.username.clone(),
            });
        }
        if !module.module_state_key.contains("/problem/") {
            return Err(GraderError::RescoreUnsupported(module.module_state_key.clone()));
        }

        let state = module.problem_state()?;
        let Some(correct_map) = state.get("correct_map").and_then(Value::as_object) else {
            let mut response = Map::new();
            response.insert("success".to_string(), json!("unanswered"));
            return Ok(Rescore {
                response,
                module: module.clone(),
            });
        };

        let possible = correct_map.len() as f64;
        let earned = correct_map
            .values()
            .filter(|entry| entry.get("correctness").and_then(Value::as_str) == Some("correct"))
            .count() as f64;
        let success = if possible > 0.0 && earned == possible {
            "correct"
        } else {
            "incorrect"
        };

        let mut rescored = module.clone();
        rescored.grade = Some(earned);
        rescored.max_grade = Some(possible);

        let mut response = Map::new();
        response.insert("success".to_string(), json!(success));
        trace!(student = %student.username, earned, possible, "Rescored from correct_map");
        Ok(Rescore {
            response,
            module: rescored,
        })
    }

    async fn grade(&self, student: &Student, course_id: &CourseId) -> Result<Value, GraderError> {
        let modules = self.modules.modules_for(course_id, None).await?;

        let mut earned = 0.0;
        let mut possible = 0.0;
        let mut graded = 0u64;
        for module in modules.iter().filter(|m| m.student_id == student.id) {
            if module.problem_state().is_err() {
                return Err(GraderError::ModuleInstantiation(module.module_state_key.clone()));
            }
            if let (Some(grade), Some(max_grade)) = (module.grade, module.max_grade) {
                earned += grade;
                possible += max_grade;
                graded += 1;
            }
        }

        let percent = if possible > 0.0 { earned / possible } else { 0.0 };
        Ok(json!({
            "percent": percent,
            "earned": earned,
            "possible": possible,
            "graded_modules": graded,
        }))
    }
}
