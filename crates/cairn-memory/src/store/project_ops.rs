//! Project-wide operations: task plans, stats and clearing.

use rusqlite::params;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use cairn_types::{Id, ProjectStats, memory_types};

use crate::error::Result;

use super::RecordStore;

impl RecordStore {
    /// Store a task plan as the project's newest `task_plan` memory.
    pub fn save_task_plan<T: Serialize>(&self, plan: &T) -> Result<Id> {
        let json = serde_json::to_string(plan)?;
        self.add_memory(&json, memory_types::TASK_PLAN)
    }

    /// The latest saved task plan, if any parses as `T`.
    pub fn get_task_plan<T: DeserializeOwned>(&self) -> Option<T> {
        let entry = self.get_latest_memory(memory_types::TASK_PLAN)?;
        match serde_json::from_str(&entry.text) {
            Ok(plan) => Some(plan),
            Err(e) => {
                warn!(memory_id = %entry.id, error = %e, "stored task plan does not parse");
                None
            }
        }
    }

    pub fn get_project_stats(&self) -> ProjectStats {
        self.read("get_project_stats", |conn| {
            let count = |table: &str| -> Result<usize> {
                let n: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM {table} WHERE project_path = ?1"),
                    params![self.project()],
                    |row| row.get(0),
                )?;
                Ok(n as usize)
            };
            Ok(ProjectStats {
                tasks: count("tasks")?,
                memories: count("memory_entries")?,
                discussions: count("discussion_turns")?,
            })
        })
    }

    /// Delete every task, memory entry and discussion turn of this project.
    ///
    /// Idempotent. Returns how many rows of each kind were removed.
    pub fn clear_project_data(&self) -> Result<ProjectStats> {
        let removed = self.with_transaction(|conn| {
            let delete = |table: &str| -> Result<usize> {
                Ok(conn.execute(
                    &format!("DELETE FROM {table} WHERE project_path = ?1"),
                    params![self.project()],
                )?)
            };
            Ok(ProjectStats {
                tasks: delete("tasks")?,
                memories: delete("memory_entries")?,
                discussions: delete("discussion_turns")?,
            })
        })?;

        info!(
            project = %self.project(),
            tasks = removed.tasks,
            memories = removed.memories,
            discussions = removed.discussions,
            "Cleared project data"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::NewTask;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Plan {
        steps: Vec<String>,
    }

    fn store() -> RecordStore {
        RecordStore::open_in_memory("/work/alpha").unwrap()
    }

    #[test]
    fn test_task_plan_latest_wins() {
        let store = store();
        assert!(store.get_task_plan::<Plan>().is_none());

        store
            .save_task_plan(&Plan {
                steps: vec!["draft".into()],
            })
            .unwrap();
        let v2 = Plan {
            steps: vec!["design".into(), "build".into()],
        };
        store.save_task_plan(&v2).unwrap();

        assert_eq!(store.get_task_plan::<Plan>(), Some(v2));
    }

    #[test]
    fn test_unparseable_plan_is_none() {
        let store = store();
        store.add_memory("not json", memory_types::TASK_PLAN).unwrap();
        assert!(store.get_task_plan::<Plan>().is_none());
    }

    #[test]
    fn test_stats_and_idempotent_clear() {
        let alpha = store();
        let beta = alpha.for_project("/work/beta").unwrap();
        alpha.add_task(NewTask::new("t")).unwrap();
        alpha.add_memory("m", "note").unwrap();
        alpha.add_memory("m2", "note").unwrap();
        alpha.add_discussion_turn("user", "d").unwrap();
        beta.add_memory("beta stays", "note").unwrap();

        assert_eq!(
            alpha.get_project_stats(),
            ProjectStats {
                tasks: 1,
                memories: 2,
                discussions: 1
            }
        );

        let removed = alpha.clear_project_data().unwrap();
        assert_eq!(removed.memories, 2);
        assert!(alpha.get_project_stats().is_empty());

        let again = alpha.clear_project_data().unwrap();
        assert!(again.is_empty());
        assert!(alpha.get_project_stats().is_empty());
        assert_eq!(beta.get_project_stats().memories, 1);
    }
}
