//! Storage collaborators used by the update runner.
//!
//! The runner never touches storage directly; it goes through these traits so
//! that tests can substitute fakes and deployments can plug in a real backend.

mod memory;

pub use memory::{MemoryStore, StoreSnapshot};

use async_trait::async_trait;

use coursetask_core::{
    CourseId, EntryId, ModuleId, OfflineGrade, Student, StudentId, StudentModule, TaskRecord,
};

use crate::error::StoreError;

/// Persistence of task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Load a record by primary key.
    async fn load(&self, entry_id: EntryId) -> Result<TaskRecord, StoreError>;

    /// Persist a record immediately.
    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError>;

    /// Release any connection or transaction resources held for a run.
    async fn release(&self) {}
}

/// Lookup of student accounts and enrollments.
#[async_trait]
pub trait StudentDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Student>, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Student>, StoreError>;

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StoreError>;

    /// Students enrolled in a course, ordered by username.
    async fn enrolled_students(&self, course_id: &CourseId) -> Result<Vec<Student>, StoreError>;
}

/// Per-student problem state.
#[async_trait]
pub trait ModuleStateStore: Send + Sync {
    /// Rows of a course, optionally restricted to one problem, ordered by id.
    async fn modules_for(
        &self,
        course_id: &CourseId,
        module_state_key: Option<&str>,
    ) -> Result<Vec<StudentModule>, StoreError>;

    /// Persist one row in its own atomic write.
    async fn save_module(&self, module: &StudentModule) -> Result<(), StoreError>;

    /// Delete one row in its own atomic write.
    async fn delete_module(&self, id: ModuleId) -> Result<(), StoreError>;
}

/// Offline grade summaries.
#[async_trait]
pub trait GradeStore: Send + Sync {
    /// Insert or replace the grade of a student in a course.
    ///
    /// Returns true if a new row was created.
    async fn upsert_offline_grade(&self, grade: OfflineGrade) -> Result<bool, StoreError>;
}
