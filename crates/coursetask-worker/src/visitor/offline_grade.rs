use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use coursetask_core::event::{offline_grade_payload, OFFLINE_GRADE};
use coursetask_core::{CourseId, OfflineGrade, Student, UpdateOutcome};

use super::{Grader, UpdateVisitor};
use crate::context::ExecutionContext;
use crate::error::{GraderError, TaskError};
use crate::store::GradeStore;

/// Computes and stores the offline gradeset of an enrolled student.
///
/// A student whose modules cannot be loaded for grading fails on their own;
/// the rest of the course is still graded.
pub struct OfflineGradeVisitor {
    course_id: CourseId,
    grader: Arc<dyn Grader>,
    grades: Arc<dyn GradeStore>,
}

impl OfflineGradeVisitor {
    pub fn new(course_id: CourseId, grader: Arc<dyn Grader>, grades: Arc<dyn GradeStore>) -> Self {
        Self {
            course_id,
            grader,
            grades,
        }
    }
}

#[async_trait]
impl UpdateVisitor for OfflineGradeVisitor {
    type Target = Student;

    fn name(&self) -> &'static str {
        "offline_grade"
    }

    async fn visit(&self, ctx: &ExecutionContext, student: &Student) -> Result<UpdateOutcome, TaskError> {
        let gradeset = match self.grader.grade(student, &self.course_id).await {
            Ok(gradeset) => gradeset,
            Err(GraderError::ModuleInstantiation(module)) => {
                warn!(
                    student_id = %student.id,
                    module = %module,
                    "Failing to grade student because of module failure"
                );
                return Ok(UpdateOutcome::Failed);
            }
            Err(e) => return Err(e.into()),
        };

        let created = self
            .grades
            .upsert_offline_grade(OfflineGrade {
                student_id: student.id,
                course_id: self.course_id.clone(),
                gradeset: serde_json::to_string(&gradeset).map_err(coursetask_core::CoreError::from)?,
            })
            .await?;

        ctx.track(student, OFFLINE_GRADE, offline_grade_payload(created))
            .await;
        Ok(UpdateOutcome::Succeeded)
    }
}
