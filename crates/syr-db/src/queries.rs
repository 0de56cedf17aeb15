use std::collections::BTreeSet;
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, Row, TransactionBehavior};
use syr_types::models::{Message, NewMessage};

use crate::Database;
use crate::error::{StoreError, StoreResult};
use crate::models::{MessageRow, ServiceRow, UserRow, format_timestamp, parse_timestamp};

const MESSAGE_COLUMNS: &str = "id, from_user, from_service, to_service, message_type, content, \
     file_name, file_url, file_type, reply_to, created_at, read_by";

impl Database {
    // -- Services --

    pub fn list_services(&self) -> StoreResult<Vec<ServiceRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, display_name, icon_ref, color_ref FROM services ORDER BY display_name, id",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(ServiceRow {
                        id: row.get(0)?,
                        display_name: row.get(1)?,
                        icon_ref: row.get(2)?,
                        color_ref: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Users --

    pub fn create_user(&self, username: &str, password_hash: &str, service_id: &str) -> StoreResult<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, password, service_id) VALUES (?1, ?2, ?3)",
                (username, password_hash, service_id),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn user_exists(&self, username: &str) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT id FROM users WHERE username = ?1", [username], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Login lookup: a user only matches within its own service.
    pub fn get_user_for_service(&self, username: &str, service_id: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, username, password, service_id FROM users
                     WHERE username = ?1 AND service_id = ?2",
                    (username, service_id),
                    |row| {
                        Ok(UserRow {
                            id: row.get(0)?,
                            username: row.get(1)?,
                            password: row.get(2)?,
                            service_id: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    // -- Messages --

    /// Durably append a message. The id and timestamp are assigned here,
    /// inside the same write transaction as the `reply_to` existence check.
    ///
    /// Rolls back instead of committing once `deadline` has passed.
    pub fn insert_message(&self, new: &NewMessage, deadline: Instant) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(reply_to) = new.reply_to {
                if !message_exists(&tx, reply_to)? {
                    return Err(StoreError::MissingReplyTarget(reply_to));
                }
            }

            // createdAt never goes backwards relative to id order
            let mut created_at = format_timestamp(Utc::now());
            let latest: Option<String> = tx
                .query_row("SELECT created_at FROM messages ORDER BY id DESC LIMIT 1", [], |row| row.get(0))
                .optional()?;
            if let Some(latest) = latest {
                if latest > created_at {
                    created_at = latest;
                }
            }

            let (file_name, file_url, file_type) = match &new.file_ref {
                Some(f) => (Some(f.name.as_str()), Some(f.url.as_str()), Some(f.mime_type.as_str())),
                None => (None, None, None),
            };

            tx.execute(
                "INSERT INTO messages
                    (from_user, from_service, to_service, message_type, content,
                     file_name, file_url, file_type, reply_to, created_at, read_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, '[]')",
                rusqlite::params![
                    new.from_user,
                    new.from_service,
                    new.to_service,
                    new.message_type.as_str(),
                    new.content,
                    file_name,
                    file_url,
                    file_type,
                    new.reply_to,
                    created_at,
                ],
            )?;
            let id = tx.last_insert_rowid();
            check_deadline(deadline)?;
            tx.commit()?;

            Ok(Message {
                id,
                from_user: new.from_user.clone(),
                from_service: new.from_service.clone(),
                to_service: new.to_service.clone(),
                message_type: new.message_type,
                content: new.content.clone(),
                file_ref: new.file_ref.clone(),
                reply_to: new.reply_to,
                created_at: parse_timestamp(&created_at)?,
                read_by: BTreeSet::new(),
            })
        })
    }

    pub fn get_message(&self, id: i64) -> StoreResult<Message> {
        self.with_conn(|conn| query_message(conn, id)?.ok_or(StoreError::NotFound(id)))
    }

    /// All messages, most recent first.
    pub fn list_messages(&self, limit: Option<u32>) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages ORDER BY created_at DESC, id DESC LIMIT ?1",
                MESSAGE_COLUMNS
            );
            // SQLite treats a negative LIMIT as unbounded
            let limit = limit.map_or(-1, i64::from);
            query_messages(conn, &sql, rusqlite::params![limit])
        })
    }

    /// Public messages, most recent first.
    pub fn list_public_messages(&self) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE message_type = 'public'
                 ORDER BY created_at DESC, id DESC",
                MESSAGE_COLUMNS
            );
            query_messages(conn, &sql, rusqlite::params![])
        })
    }

    /// The private thread between two services, in either direction, oldest first.
    pub fn list_private_messages(&self, service_a: &str, service_b: &str) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE message_type = 'private'
                   AND ((from_service = ?1 AND to_service = ?2)
                     OR (from_service = ?2 AND to_service = ?1))
                 ORDER BY created_at ASC, id ASC",
                MESSAGE_COLUMNS
            );
            query_messages(conn, &sql, (service_a, service_b))
        })
    }

    /// Add `user_id` to a message's read set. The set only grows.
    pub fn mark_read(&self, message_id: i64, user_id: i64, deadline: Instant) -> StoreResult<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let raw: String = tx
                .query_row("SELECT read_by FROM messages WHERE id = ?1", [message_id], |row| row.get(0))
                .optional()?
                .ok_or(StoreError::NotFound(message_id))?;

            let mut read_by: BTreeSet<i64> = serde_json::from_str(&raw)?;
            if read_by.insert(user_id) {
                tx.execute(
                    "UPDATE messages SET read_by = ?1 WHERE id = ?2",
                    rusqlite::params![serde_json::to_string(&read_by)?, message_id],
                )?;
            }

            let message = query_message(&tx, message_id)?.ok_or(StoreError::NotFound(message_id))?;
            check_deadline(deadline)?;
            tx.commit()?;
            Ok(message)
        })
    }

    pub fn count_messages(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

/// A write whose caller has already given up must not become visible.
fn check_deadline(deadline: Instant) -> StoreResult<()> {
    if Instant::now() >= deadline {
        return Err(StoreError::Unavailable("deadline passed before commit".into()));
    }
    Ok(())
}

fn message_exists(conn: &Connection, id: i64) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT id FROM messages WHERE id = ?1", [id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

fn query_message(conn: &Connection, id: i64) -> StoreResult<Option<Message>> {
    let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
    let row = conn.query_row(&sql, [id], map_message_row).optional()?;
    row.map(Message::try_from).transpose()
}

fn query_messages<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> StoreResult<Vec<Message>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(Message::try_from).collect()
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        from_user: row.get(1)?,
        from_service: row.get(2)?,
        to_service: row.get(3)?,
        message_type: row.get(4)?,
        content: row.get(5)?,
        file_name: row.get(6)?,
        file_url: row.get(7)?,
        file_type: row.get(8)?,
        reply_to: row.get(9)?,
        created_at: row.get(10)?,
        read_by: row.get(11)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use syr_types::models::{BROADCAST_TARGET, FileRef, MessageType};

    fn later() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn public(content: &str) -> NewMessage {
        NewMessage {
            from_user: "admin".into(),
            from_service: "directeur".into(),
            to_service: BROADCAST_TARGET.into(),
            message_type: MessageType::Public,
            content: Some(content.into()),
            file_ref: None,
            reply_to: None,
        }
    }

    fn private(from: &str, to: &str, content: &str) -> NewMessage {
        NewMessage {
            from_user: "someone".into(),
            from_service: from.into(),
            to_service: to.into(),
            message_type: MessageType::Private,
            content: Some(content.into()),
            file_ref: None,
            reply_to: None,
        }
    }

    #[test]
    fn append_assigns_increasing_ids_and_timestamps() {
        let db = Database::open_in_memory().unwrap();

        let mut last: Option<Message> = None;
        for i in 0..20 {
            let msg = db.insert_message(&public(&format!("m{}", i)), later()).unwrap();
            assert!(msg.read_by.is_empty());
            if let Some(prev) = &last {
                assert!(msg.id > prev.id);
                assert!(msg.created_at >= prev.created_at);
            }
            last = Some(msg);
        }
    }

    #[test]
    fn append_round_trips_through_get() {
        let db = Database::open_in_memory().unwrap();
        let mut new = public("with attachment");
        new.file_ref = Some(FileRef {
            name: "plan.pdf".into(),
            url: "/uploads/plan.pdf".into(),
            mime_type: "application/pdf".into(),
        });

        let stored = db.insert_message(&new, later()).unwrap();
        let fetched = db.get_message(stored.id).unwrap();
        assert_eq!(stored, fetched);
    }

    #[test]
    fn get_missing_message_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.get_message(42), Err(StoreError::NotFound(42))));
    }

    #[test]
    fn dangling_reply_is_rejected_without_writing() {
        let db = Database::open_in_memory().unwrap();
        db.insert_message(&public("first"), later()).unwrap();

        let mut reply = public("reply");
        reply.reply_to = Some(999_999);
        let err = db.insert_message(&reply, later()).unwrap_err();

        assert!(matches!(err, StoreError::MissingReplyTarget(999_999)));
        assert_eq!(db.count_messages().unwrap(), 1);
    }

    #[test]
    fn reply_to_existing_message_is_accepted() {
        let db = Database::open_in_memory().unwrap();
        let parent = db.insert_message(&public("question"), later()).unwrap();

        let mut reply = public("answer");
        reply.reply_to = Some(parent.id);
        let stored = db.insert_message(&reply, later()).unwrap();
        assert_eq!(stored.reply_to, Some(parent.id));
    }

    #[test]
    fn listings_use_expected_order_and_filters() {
        let db = Database::open_in_memory().unwrap();
        let p1 = db.insert_message(&public("p1"), later()).unwrap();
        let x1 = db.insert_message(&private("comptable", "commercial", "x1"), later()).unwrap();
        let other = db.insert_message(&private("comptable", "personnel", "other"), later()).unwrap();
        let x2 = db.insert_message(&private("commercial", "comptable", "x2"), later()).unwrap();
        let p2 = db.insert_message(&public("p2"), later()).unwrap();

        let all: Vec<i64> = db.list_messages(None).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(all, vec![p2.id, x2.id, other.id, x1.id, p1.id]);

        let limited: Vec<i64> = db.list_messages(Some(2)).unwrap().iter().map(|m| m.id).collect();
        assert_eq!(limited, vec![p2.id, x2.id]);

        let public_ids: Vec<i64> = db.list_public_messages().unwrap().iter().map(|m| m.id).collect();
        assert_eq!(public_ids, vec![p2.id, p1.id]);

        let thread: Vec<i64> = db
            .list_private_messages("commercial", "comptable")
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(thread, vec![x1.id, x2.id]);
    }

    #[test]
    fn mark_read_only_grows() {
        let db = Database::open_in_memory().unwrap();
        let msg = db.insert_message(&public("read me"), later()).unwrap();

        db.mark_read(msg.id, 3, later()).unwrap();
        db.mark_read(msg.id, 1, later()).unwrap();
        let again = db.mark_read(msg.id, 3, later()).unwrap();

        assert_eq!(again.read_by.into_iter().collect::<Vec<_>>(), vec![1, 3]);
        assert!(matches!(db.mark_read(777, 1, later()), Err(StoreError::NotFound(777))));
    }

    #[test]
    fn expired_deadline_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let msg = db.insert_message(&public("kept"), later()).unwrap();

        let err = db.insert_message(&public("late"), Instant::now()).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(db.count_messages().unwrap(), 1);

        let err = db.mark_read(msg.id, 4, Instant::now()).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(db.get_message(msg.id).unwrap().read_by.is_empty());

        // The aborted transaction must not wedge the connection
        db.insert_message(&public("after"), later()).unwrap();
        assert_eq!(db.count_messages().unwrap(), 2);
    }

    #[test]
    fn users_are_scoped_to_their_service() {
        let db = Database::open_in_memory().unwrap();
        let id = db.create_user("anwar", "$hash", "commercial").unwrap();

        let row = db.get_user_for_service("anwar", "commercial").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert!(db.get_user_for_service("anwar", "magasin").unwrap().is_none());
        assert!(db.user_exists("anwar").unwrap());
        assert!(!db.user_exists("nobody").unwrap());
    }

    #[test]
    fn seeded_services_are_ordered_and_exclude_broadcast() {
        let db = Database::open_in_memory().unwrap();
        let services = db.list_services().unwrap();

        assert_eq!(services.len(), 12);
        assert!(services.iter().all(|s| s.id != BROADCAST_TARGET));
        let names: Vec<&str> = services.iter().map(|s| s.display_name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
