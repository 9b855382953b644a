//! In-memory store, optionally mirrored to a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use coursetask_core::{
    CourseId, EntryId, Enrollment, ModuleId, OfflineGrade, Student, StudentId, StudentModule,
    TaskRecord,
};

use super::{GradeStore, ModuleStateStore, StudentDirectory, TaskStore};
use crate::error::StoreError;

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub students: Vec<Student>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(default)]
    pub modules: Vec<StudentModule>,
    #[serde(default)]
    pub offline_grades: Vec<OfflineGrade>,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    /// Task records indexed by EntryId.
    tasks: BTreeMap<EntryId, TaskRecord>,

    /// Students indexed by StudentId.
    students: BTreeMap<StudentId, Student>,

    enrollments: Vec<Enrollment>,

    /// Student module rows indexed by ModuleId.
    modules: BTreeMap<ModuleId, StudentModule>,

    /// Offline grades indexed by (student, course).
    offline_grades: BTreeMap<(StudentId, CourseId), OfflineGrade>,
}

impl Tables {
    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            tasks: snapshot.tasks.into_iter().map(|t| (t.id, t)).collect(),
            students: snapshot.students.into_iter().map(|s| (s.id, s)).collect(),
            enrollments: snapshot.enrollments,
            modules: snapshot.modules.into_iter().map(|m| (m.id, m)).collect(),
            offline_grades: snapshot
                .offline_grades
                .into_iter()
                .map(|g| ((g.student_id, g.course_id.clone()), g))
                .collect(),
        }
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            tasks: self.tasks.values().cloned().collect(),
            students: self.students.values().cloned().collect(),
            enrollments: self.enrollments.clone(),
            modules: self.modules.values().cloned().collect(),
            offline_grades: self.offline_grades.values().cloned().collect(),
        }
    }
}

/// Store holding every table in memory.
///
/// When opened on a file, every mutation rewrites the file before returning,
/// so a save is durable as soon as the call completes. A mutation whose
/// write fails leaves both memory and the file as they were.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,

    /// Backing file, if any.
    path: Option<PathBuf>,
}

impl MemoryStore {
    /// Create an empty store with no backing file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            tables: RwLock::new(Tables::from_snapshot(snapshot)),
            path: None,
        }
    }

    /// Open a store backed by `path`, starting empty if the file is missing.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(e) => return Err(e.into()),
        };

        let mut store = Self::from_snapshot(snapshot);
        store.path = Some(path);
        Ok(store)
    }

    /// Copy every table into a snapshot.
    pub async fn snapshot(&self) -> StoreSnapshot {
        self.tables.read().await.snapshot()
    }

    /// Apply `change` and persist the result.
    ///
    /// With a backing file the change is made to a copy of the tables, which
    /// replaces the live ones only once the file is rewritten. The write lock
    /// is held throughout, so mutations are serialized.
    async fn commit<R>(
        &self,
        change: impl FnOnce(&mut Tables) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(path) = &self.path else {
            return change(&mut *tables);
        };

        let mut staged = tables.clone();
        let out = change(&mut staged)?;
        write_file(path, &staged.snapshot()).await?;
        *tables = staged;
        Ok(out)
    }

    /// Next unused task key.
    pub async fn next_entry_id(&self) -> EntryId {
        let tables = self.tables.read().await;
        let next = tables.tasks.keys().next_back().map_or(1, |id| id.get() + 1);
        EntryId::new(next)
    }

    /// All task records ordered by key.
    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.tables.read().await.tasks.values().cloned().collect()
    }

    pub async fn insert_student(&self, student: Student) -> Result<(), StoreError> {
        self.commit(|t| {
            t.students.insert(student.id, student);
            Ok(())
        })
        .await
    }

    pub async fn enroll(&self, student_id: StudentId, course_id: CourseId) -> Result<(), StoreError> {
        self.commit(|t| {
            t.enrollments.push(Enrollment {
                student_id,
                course_id,
            });
            Ok(())
        })
        .await
    }

    pub async fn insert_module(&self, module: StudentModule) -> Result<(), StoreError> {
        self.commit(|t| {
            t.modules.insert(module.id, module);
            Ok(())
        })
        .await
    }

    pub async fn get_module(&self, id: ModuleId) -> Option<StudentModule> {
        self.tables.read().await.modules.get(&id).cloned()
    }

    pub async fn offline_grade(
        &self,
        student_id: StudentId,
        course_id: &CourseId,
    ) -> Option<OfflineGrade> {
        self.tables
            .read()
            .await
            .offline_grades
            .get(&(student_id, course_id.clone()))
            .cloned()
    }

    /// Get the number of task records.
    pub async fn task_count(&self) -> usize {
        self.tables.read().await.tasks.len()
    }
}

/// Rewrite `path` with `snapshot` through a temporary file.
async fn write_file(path: &Path, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
    let json = serde_json::to_vec_pretty(snapshot)?;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;

    debug!(path = %path.display(), "Store flushed");
    Ok(())
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn load(&self, entry_id: EntryId) -> Result<TaskRecord, StoreError> {
        self.tables
            .read()
            .await
            .tasks
            .get(&entry_id)
            .cloned()
            .ok_or(StoreError::EntryNotFound(entry_id))
    }

    async fn save(&self, record: &TaskRecord) -> Result<(), StoreError> {
        self.commit(|t| {
            t.tasks.insert(record.id, record.clone());
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl StudentDirectory for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Student>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.students.values().find(|s| s.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Student>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.students.values().find(|s| s.username == username).cloned())
    }

    async fn get_student(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        Ok(self.tables.read().await.students.get(&id).cloned())
    }

    async fn enrolled_students(&self, course_id: &CourseId) -> Result<Vec<Student>, StoreError> {
        let tables = self.tables.read().await;

        let mut enrolled: Vec<Student> = tables
            .enrollments
            .iter()
            .filter(|e| &e.course_id == course_id)
            .filter_map(|e| tables.students.get(&e.student_id).cloned())
            .collect();
        enrolled.sort_by(|a, b| a.username.cmp(&b.username));
        enrolled.dedup_by(|a, b| a.id == b.id);
        Ok(enrolled)
    }
}

#[async_trait]
impl ModuleStateStore for MemoryStore {
    async fn modules_for(
        &self,
        course_id: &CourseId,
        module_state_key: Option<&str>,
    ) -> Result<Vec<StudentModule>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .modules
            .values()
            .filter(|m| &m.course_id == course_id)
            .filter(|m| module_state_key.map_or(true, |key| m.module_state_key == key))
            .cloned()
            .collect())
    }

    async fn save_module(&self, module: &StudentModule) -> Result<(), StoreError> {
        self.commit(|t| {
            if !t.modules.contains_key(&module.id) {
                return Err(StoreError::ModuleNotFound(module.id));
            }
            t.modules.insert(module.id, module.clone());
            Ok(())
        })
        .await
    }

    async fn delete_module(&self, id: ModuleId) -> Result<(), StoreError> {
        self.commit(|t| {
            t.modules.remove(&id).ok_or(StoreError::ModuleNotFound(id))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl GradeStore for MemoryStore {
    async fn upsert_offline_grade(&self, grade: OfflineGrade) -> Result<bool, StoreError> {
        self.commit(|t| {
            Ok(t
                .offline_grades
                .insert((grade.student_id, grade.course_id.clone()), grade)
                .is_none())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coursetask_core::{TaskInput, TaskState};

    fn course() -> CourseId {
        CourseId::new("MITx/6.002x")
    }

    #[tokio::test]
    async fn test_load_missing_entry() {
        let store = MemoryStore::new();
        let err = store.load(EntryId::new(9)).await.unwrap_err();
        assert!(matches!(err, StoreError::EntryNotFound(id) if id == EntryId::new(9)));
    }

    #[tokio::test]
    async fn test_enrolled_students_sorted_by_username() {
        let store = MemoryStore::new();
        store.insert_student(Student::new(1, "zoe", "zoe@example.com")).await.unwrap();
        store.insert_student(Student::new(2, "adam", "adam@example.com")).await.unwrap();
        store.insert_student(Student::new(3, "mia", "mia@example.com")).await.unwrap();
        store.enroll(StudentId::new(1), course()).await.unwrap();
        store.enroll(StudentId::new(2), course()).await.unwrap();
        store.enroll(StudentId::new(3), CourseId::new("other")).await.unwrap();

        let names: Vec<String> = store
            .enrolled_students(&course())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.username)
            .collect();
        assert_eq!(names, vec!["adam", "zoe"]);
    }

    #[tokio::test]
    async fn test_modules_for_filters_by_key() {
        let store = MemoryStore::new();
        store.insert_module(StudentModule::new(1, 1, course(), "p1")).await.unwrap();
        store.insert_module(StudentModule::new(2, 1, course(), "p2")).await.unwrap();
        store.insert_module(StudentModule::new(3, 2, course(), "p1")).await.unwrap();

        let p1 = store.modules_for(&course(), Some("p1")).await.unwrap();
        assert_eq!(p1.iter().map(|m| m.id.get()).collect::<Vec<_>>(), vec![1, 3]);

        let all = store.modules_for(&course(), None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_offline_grade_reports_creation() {
        let store = MemoryStore::new();
        let grade = OfflineGrade {
            student_id: StudentId::new(1),
            course_id: course(),
            gradeset: "{}".to_string(),
        };
        assert!(store.upsert_offline_grade(grade.clone()).await.unwrap());
        assert!(!store.upsert_offline_grade(grade).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_backed_store_persists_saves() {
        let path = std::env::temp_dir().join(format!("coursetask-{}.json", uuid::Uuid::new_v4()));

        let store = MemoryStore::open(&path).await.unwrap();
        let entry_id = store.next_entry_id().await;
        let record = TaskRecord::new(
            entry_id,
            "reset_problem_attempts",
            course(),
            &TaskInput::for_problem("p1"),
            "staff",
        )
        .unwrap();
        store.save(&record).await.unwrap();

        let reopened = MemoryStore::open(&path).await.unwrap();
        let loaded = reopened.load(entry_id).await.unwrap();
        assert_eq!(loaded.task_state, TaskState::Pending);
        assert_eq!(reopened.next_entry_id().await, EntryId::new(entry_id.get() + 1));

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        // The parent directory does not exist, so every rewrite fails.
        let path = std::env::temp_dir()
            .join(format!("coursetask-missing-{}", uuid::Uuid::new_v4()))
            .join("store.json");
        let store = MemoryStore::open(&path).await.unwrap();
        let record = TaskRecord::new(
            EntryId::new(1),
            "reset_problem_attempts",
            course(),
            &TaskInput::for_problem("p1"),
            "staff",
        )
        .unwrap();

        let err = store.save(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert_eq!(store.task_count().await, 0);

        let err = store
            .insert_module(StudentModule::new(1, 1, course(), "p1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.get_module(ModuleId::new(1)).await.is_none());
        assert!(!path.exists());
    }
}
