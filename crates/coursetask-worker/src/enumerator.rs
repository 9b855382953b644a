//! Target enumeration: which rows a run visits.
//!
//! Enumeration materializes the full, filtered collection before the first
//! visit. Its length is the run's `total` and is never recomputed, even when
//! visitors delete the rows they visit.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use coursetask_core::{CourseId, Student, StudentModule};

use crate::error::TaskError;
use crate::store::{ModuleStateStore, StudentDirectory};

/// Caller-supplied transform applied to the enumerated targets last.
pub type TargetFilter<T> = Box<dyn Fn(Vec<T>) -> Vec<T> + Send + Sync>;

/// Scope of one run.
#[derive(Debug, Clone, Copy)]
pub struct TargetQuery<'a> {
    pub course_id: &'a CourseId,
    /// Problem to restrict to; `None` covers the whole course.
    pub module_state_key: Option<&'a str>,
    /// Username or email of a single student to restrict to.
    pub student: Option<&'a str>,
}

/// Strategy that resolves a query into an ordered collection of targets.
#[async_trait]
pub trait TargetEnumerator: Send + Sync {
    type Target: Send + Sync;

    async fn targets(&self, query: &TargetQuery<'_>) -> Result<Vec<Self::Target>, TaskError>;
}

/// Resolve targets for `query` and apply `filter` last.
pub async fn enumerate<E: TargetEnumerator + ?Sized>(
    enumerator: &E,
    query: &TargetQuery<'_>,
    filter: Option<&TargetFilter<E::Target>>,
) -> Result<Vec<E::Target>, TaskError> {
    let targets = enumerator.targets(query).await?;
    Ok(match filter {
        Some(filter) => filter(targets),
        None => targets,
    })
}

/// Look up a student by email when the identifier contains `@`, by username
/// otherwise.
pub async fn resolve_student(
    directory: &dyn StudentDirectory,
    identifier: &str,
) -> Result<Student, TaskError> {
    let student = if identifier.contains('@') {
        directory.find_by_email(identifier).await?
    } else {
        directory.find_by_username(identifier).await?
    };
    student.ok_or_else(|| TaskError::StudentNotFound(identifier.to_string()))
}

/// A student module row together with its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleTarget {
    pub student: Student,
    pub module: StudentModule,
}

/// Enumerates student module rows of a course, optionally for one problem.
pub struct ModuleStateEnumerator {
    directory: Arc<dyn StudentDirectory>,
    modules: Arc<dyn ModuleStateStore>,
}

impl ModuleStateEnumerator {
    pub fn new(directory: Arc<dyn StudentDirectory>, modules: Arc<dyn ModuleStateStore>) -> Self {
        Self { directory, modules }
    }
}

#[async_trait]
impl TargetEnumerator for ModuleStateEnumerator {
    type Target = ModuleTarget;

    async fn targets(&self, query: &TargetQuery<'_>) -> Result<Vec<ModuleTarget>, TaskError> {
        // Resolve the student first so a bad identifier fails before any query.
        let only = match query.student {
            Some(identifier) => Some(resolve_student(self.directory.as_ref(), identifier).await?),
            None => None,
        };

        let mut modules = self
            .modules
            .modules_for(query.course_id, query.module_state_key)
            .await?;
        if let Some(student) = &only {
            modules.retain(|m| m.student_id == student.id);
        }

        let mut targets = Vec::with_capacity(modules.len());
        for module in modules {
            let student = match &only {
                Some(student) => student.clone(),
                None => self
                    .directory
                    .get_student(module.student_id)
                    .await?
                    .ok_or_else(|| TaskError::StudentNotFound(module.student_id.to_string()))?,
            };
            targets.push(ModuleTarget { student, module });
        }

        debug!(
            course_id = %query.course_id,
            module_state_key = ?query.module_state_key,
            count = targets.len(),
            "Enumerated student modules"
        );
        Ok(targets)
    }
}

/// Enumerates students enrolled in a course, ordered by username.
pub struct EnrolledStudentEnumerator {
    directory: Arc<dyn StudentDirectory>,
}

impl EnrolledStudentEnumerator {
    pub fn new(directory: Arc<dyn StudentDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl TargetEnumerator for EnrolledStudentEnumerator {
    type Target = Student;

    async fn targets(&self, query: &TargetQuery<'_>) -> Result<Vec<Student>, TaskError> {
        if query.module_state_key.is_some() {
            return Err(TaskError::InvalidInput(
                "Value for problem_url not expected".to_string(),
            ));
        }

        let only = match query.student {
            Some(identifier) => Some(resolve_student(self.directory.as_ref(), identifier).await?),
            None => None,
        };

        let mut students = self.directory.enrolled_students(query.course_id).await?;
        if let Some(student) = &only {
            students.retain(|s| s.id == student.id);
        }

        debug!(course_id = %query.course_id, count = students.len(), "Enumerated enrolled students");
        Ok(students)
    }
}
