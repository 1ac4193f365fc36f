//! Discussion history operations.
//!
//! Turn indices are zero-based and contiguous per project. Appends take the
//! next index inside a transaction; a save replaces the whole history.

use rusqlite::{Connection, params};
use tracing::debug;

use cairn_types::{DiscussionTurn, Id, NewTurn, new_id, now};

use crate::error::Result;
use crate::validation::validate_turn;

use super::{RecordStore, format_ts};

impl RecordStore {
    /// Append one turn and return it with its assigned index.
    pub fn add_discussion_turn(&self, role: &str, message: &str) -> Result<DiscussionTurn> {
        validate_turn(role, message)?;

        let turn = self.with_transaction(|conn| {
            let next: u32 = conn.query_row(
                "SELECT COALESCE(MAX(turn_index) + 1, 0) FROM discussion_turns WHERE project_path = ?1",
                params![self.project()],
                |row| row.get(0),
            )?;
            let turn = DiscussionTurn {
                id: new_id(),
                role: role.to_string(),
                message: message.to_string(),
                turn_index: next,
                project_path: self.project().to_string(),
            };
            insert_turn(conn, &turn)?;
            Ok(turn)
        })?;

        debug!(turn_index = turn.turn_index, role = %turn.role, "Appended discussion turn");
        Ok(turn)
    }

    /// The project's discussion in turn order.
    pub fn get_discussion_history(&self) -> Vec<DiscussionTurn> {
        self.read("get_discussion_history", |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, role, message, turn_index, project_path FROM discussion_turns \
                 WHERE project_path = ?1 ORDER BY turn_index ASC",
            )?;
            let mut rows = stmt.query(params![self.project()])?;

            let mut turns = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                turns.push(DiscussionTurn {
                    id: Id::parse_str(&id)?,
                    role: row.get(1)?,
                    message: row.get(2)?,
                    turn_index: row.get(3)?,
                    project_path: row.get(4)?,
                });
            }
            Ok(turns)
        })
    }

    /// Replace the project's whole discussion with `turns`, indexed from 0.
    ///
    /// Every turn is validated first. Either the new history is fully written
    /// or the old one is left untouched.
    pub fn save_discussion_history(&self, turns: &[NewTurn]) -> Result<Vec<DiscussionTurn>> {
        for turn in turns {
            validate_turn(&turn.role, &turn.message)?;
        }

        let saved = self.with_transaction(|conn| {
            conn.execute(
                "DELETE FROM discussion_turns WHERE project_path = ?1",
                params![self.project()],
            )?;
            let mut saved = Vec::with_capacity(turns.len());
            for (index, turn) in turns.iter().enumerate() {
                let turn = DiscussionTurn {
                    id: new_id(),
                    role: turn.role.clone(),
                    message: turn.message.clone(),
                    turn_index: index as u32,
                    project_path: self.project().to_string(),
                };
                insert_turn(conn, &turn)?;
                saved.push(turn);
            }
            Ok(saved)
        })?;

        debug!(turns = saved.len(), "Saved discussion history");
        Ok(saved)
    }
}

fn insert_turn(conn: &Connection, turn: &DiscussionTurn) -> Result<()> {
    conn.execute(
        "INSERT INTO discussion_turns (id, project_path, turn_index, role, message, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            turn.id.to_string(),
            turn.project_path,
            turn.turn_index,
            turn.role,
            turn.message,
            format_ts(&now()),
        ],
    )?;
    Ok(())
}
