//! Task operations.

use rusqlite::{Connection, Row, params};
use tracing::debug;

use cairn_types::{Id, NewTask, Task, TaskStatus, now};

use crate::error::{MemoryError, Result};
use crate::validation::validate_task_title;

use super::{RecordStore, format_ts, parse_ts};

const TASK_COLUMNS: &str = "id, project_path, title, description, status, complexity, \
                            dependencies, parent_id, created_at, completed_at";

impl RecordStore {
    /// Insert a new task in this project.
    ///
    /// A task created directly as `completed` gets its `completed_at` now.
    pub fn add_task(&self, new: NewTask) -> Result<Task> {
        validate_task_title(&new.title)?;

        let created_at = now();
        let task = Task {
            id: cairn_types::new_id(),
            title: new.title,
            description: new.description,
            status: new.status,
            complexity: new.complexity,
            dependencies: new.dependencies,
            parent_id: new.parent_id,
            project_path: self.project().to_string(),
            created_at,
            completed_at: (new.status == TaskStatus::Completed).then_some(created_at),
        };
        let dependencies = serde_json::to_string(&task.dependencies)?;

        self.write(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO tasks ({TASK_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    task.id.to_string(),
                    task.project_path,
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.complexity,
                    dependencies,
                    task.parent_id.map(|id| id.to_string()),
                    format_ts(&task.created_at),
                    task.completed_at.as_ref().map(format_ts),
                ],
            )?;
            Ok(())
        })?;

        debug!(task_id = %task.id, title = %task.title, "Inserted task");
        Ok(task)
    }

    /// Tasks in creation order, optionally filtered by status.
    pub fn get_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        self.read("get_tasks", |conn| match status {
            Some(status) => query_tasks(
                conn,
                "project_path = ?1 AND status = ?2",
                params![self.project(), status.as_str()],
            ),
            None => query_tasks(conn, "project_path = ?1", params![self.project()]),
        })
    }

    pub fn get_task(&self, id: Id) -> Option<Task> {
        self.read("get_task", |conn| {
            let mut tasks = query_tasks(
                conn,
                "project_path = ?1 AND id = ?2",
                params![self.project(), id.to_string()],
            )?;
            Ok(tasks.pop())
        })
    }

    /// Direct children of `parent_id`, in creation order.
    pub fn get_subtasks(&self, parent_id: Id) -> Vec<Task> {
        self.read("get_subtasks", |conn| {
            query_tasks(
                conn,
                "project_path = ?1 AND parent_id = ?2",
                params![self.project(), parent_id.to_string()],
            )
        })
    }

    /// Set a task's status. Returns `false` when no such task exists here.
    ///
    /// Any transition is accepted, including out of a terminal status, so a
    /// blocked or completed task can be reopened. `completed_at` is stamped on
    /// the first move into `completed` and kept through any later transitions.
    pub fn update_task_status(&self, id: Id, status: TaskStatus) -> Result<bool> {
        let updated = self.write(|conn| {
            Ok(conn.execute(
                "UPDATE tasks SET status = ?1, \
                     completed_at = CASE WHEN ?1 = 'completed' \
                         THEN COALESCE(completed_at, ?2) ELSE completed_at END \
                 WHERE project_path = ?3 AND id = ?4",
                params![
                    status.as_str(),
                    format_ts(&now()),
                    self.project(),
                    id.to_string()
                ],
            )?)
        })?;

        debug!(task_id = %id, status = %status, updated, "Updated task status");
        Ok(updated > 0)
    }

    /// Set the status of every task in this project titled `title`.
    pub fn update_task_status_by_name(&self, title: &str, status: TaskStatus) -> Result<bool> {
        validate_task_title(title)?;
        let updated = self.write(|conn| {
            Ok(conn.execute(
                "UPDATE tasks SET status = ?1, \
                     completed_at = CASE WHEN ?1 = 'completed' \
                         THEN COALESCE(completed_at, ?2) ELSE completed_at END \
                 WHERE project_path = ?3 AND title = ?4",
                params![status.as_str(), format_ts(&now()), self.project(), title],
            )?)
        })?;

        debug!(title, status = %status, updated, "Updated task status by title");
        Ok(updated > 0)
    }
}

fn query_tasks(
    conn: &Connection,
    filter: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks WHERE {filter} ORDER BY created_at ASC, rowid ASC"
    ))?;
    let mut rows = stmt.query(params)?;

    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        tasks.push(row_to_task(row)?);
    }
    Ok(tasks)
}

fn row_to_task(row: &Row<'_>) -> Result<Task> {
    let id: String = row.get(0)?;
    let status: String = row.get(4)?;
    let dependencies: String = row.get(6)?;
    let parent_id: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    let completed_at: Option<String> = row.get(9)?;

    Ok(Task {
        id: Id::parse_str(&id)?,
        project_path: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        status: status
            .parse::<TaskStatus>()
            .map_err(|e| MemoryError::InvalidData(e.to_string()))?,
        complexity: row.get(5)?,
        dependencies: serde_json::from_str(&dependencies)?,
        parent_id: parent_id.as_deref().map(Id::parse_str).transpose()?,
        created_at: parse_ts(&created_at)?,
        completed_at: completed_at.as_deref().map(parse_ts).transpose()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RecordStore {
        RecordStore::open_in_memory("/work/alpha").unwrap()
    }

    #[test]
    fn test_add_and_get_task() {
        let store = store();
        let dep = cairn_types::new_id();
        let task = store
            .add_task(
                NewTask::new("Write login form")
                    .with_description("email + password")
                    .with_complexity("medium")
                    .with_dependency(dep),
            )
            .unwrap();

        let loaded = store.get_task(task.id).unwrap();
        assert_eq!(loaded.title, "Write login form");
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert_eq!(loaded.complexity.as_deref(), Some("medium"));
        assert_eq!(loaded.dependencies, vec![dep]);
        assert_eq!(loaded.project_path, "/work/alpha");
        assert!(loaded.completed_at.is_none());
    }

    #[test]
    fn test_empty_title_rejected() {
        let store = store();
        assert!(matches!(
            store.add_task(NewTask::new("  ")),
            Err(MemoryError::InvalidData(_))
        ));
        assert!(store.get_tasks(None).is_empty());
    }

    #[test]
    fn test_get_tasks_filters_by_status_in_creation_order() {
        let store = store();
        let a = store.add_task(NewTask::new("a")).unwrap();
        let b = store.add_task(NewTask::new("b")).unwrap();
        store.add_task(NewTask::new("c")).unwrap();
        store.update_task_status(b.id, TaskStatus::InProgress).unwrap();

        let all: Vec<_> = store.get_tasks(None).into_iter().map(|t| t.title).collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let pending = store.get_tasks(Some(TaskStatus::Pending));
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, a.id);
    }

    #[test]
    fn test_completed_at_set_exactly_once() {
        let store = store();
        let task = store.add_task(NewTask::new("ship it")).unwrap();

        assert!(store.update_task_status(task.id, TaskStatus::Completed).unwrap());
        let first = store.get_task(task.id).unwrap().completed_at.unwrap();

        store.update_task_status(task.id, TaskStatus::InProgress).unwrap();
        store.update_task_status(task.id, TaskStatus::Completed).unwrap();
        let loaded = store.get_task(task.id).unwrap();
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.completed_at, Some(first));
    }

    #[test]
    fn test_terminal_tasks_can_be_reopened() {
        let store = store();
        let task = store.add_task(NewTask::new("flaky deploy")).unwrap();

        assert!(store.update_task_status(task.id, TaskStatus::Blocked).unwrap());
        assert!(store.update_task_status(task.id, TaskStatus::InProgress).unwrap());
        assert!(store.update_task_status(task.id, TaskStatus::Completed).unwrap());
        assert!(store.update_task_status(task.id, TaskStatus::Pending).unwrap());

        let reopened = store.get_task(task.id).unwrap();
        assert_eq!(reopened.status, TaskStatus::Pending);
        assert!(!reopened.is_finished());
        assert!(reopened.completed_at.is_some());
    }

    #[test]
    fn test_update_unknown_task_returns_false() {
        let store = store();
        assert!(!store
            .update_task_status(cairn_types::new_id(), TaskStatus::Failed)
            .unwrap());
        assert!(!store
            .update_task_status_by_name("nope", TaskStatus::Failed)
            .unwrap());
    }

    #[test]
    fn test_update_by_name() {
        let store = store();
        let task = store.add_task(NewTask::new("Deploy")).unwrap();
        assert!(store
            .update_task_status_by_name("Deploy", TaskStatus::Blocked)
            .unwrap());
        assert_eq!(store.get_task(task.id).unwrap().status, TaskStatus::Blocked);
    }

    #[test]
    fn test_subtasks() {
        let store = store();
        let parent = store.add_task(NewTask::new("Epic")).unwrap();
        store
            .add_task(NewTask::new("Child 1").with_parent(parent.id))
            .unwrap();
        store
            .add_task(NewTask::new("Child 2").with_parent(parent.id))
            .unwrap();
        store.add_task(NewTask::new("Unrelated")).unwrap();

        let children: Vec<_> = store
            .get_subtasks(parent.id)
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(children, vec!["Child 1", "Child 2"]);
    }

    #[test]
    fn test_tasks_isolated_by_project() {
        let a = store();
        let b = a.for_project("/work/beta").unwrap();
        let task = a.add_task(NewTask::new("alpha only")).unwrap();

        assert!(b.get_tasks(None).is_empty());
        assert!(b.get_task(task.id).is_none());
        assert!(!b.update_task_status(task.id, TaskStatus::Completed).unwrap());
        assert_eq!(a.get_task(task.id).unwrap().status, TaskStatus::Pending);
    }
}
