use voxen_database::typed::{get_json, put_json, remove, scan_json};
use voxen_database::{tables, SafeDatabase};

use crate::error::{Result, ServiceError};
use crate::parser::DiscussionMessage;
use crate::repo::time_key;

fn key(message: &DiscussionMessage) -> String {
    tables::composite(
        &message.proposal_id,
        &tables::composite(&time_key(message.created_at), &message.id),
    )
}

pub fn insert<D: SafeDatabase>(db: &D, message: &DiscussionMessage) -> Result<()> {
    let key = key(message);
    put_json(db, tables::DISCUSSIONS, &key, message)?;
    put_json(db, tables::DISCUSSION_INDEX, &message.id, &key)?;
    Ok(())
}

pub fn get<D: SafeDatabase>(db: &D, id: &str) -> Result<Option<DiscussionMessage>> {
    let key: Option<String> = get_json(db, tables::DISCUSSION_INDEX, id)?;
    match key {
        Some(key) => Ok(get_json(db, tables::DISCUSSIONS, &key)?),
        None => Ok(None),
    }
}

pub fn require<D: SafeDatabase>(db: &D, id: &str) -> Result<DiscussionMessage> {
    get(db, id)?.ok_or_else(|| ServiceError::not_found("Message not found"))
}

/// Overwrites an existing message in place; the key does not depend on edited fields.
pub fn save<D: SafeDatabase>(db: &D, message: &DiscussionMessage) -> Result<()> {
    Ok(put_json(db, tables::DISCUSSIONS, &key(message), message)?)
}

pub fn delete<D: SafeDatabase>(db: &D, message: &DiscussionMessage) -> Result<()> {
    remove(db, tables::DISCUSSIONS, &key(message))?;
    remove(db, tables::DISCUSSION_INDEX, &message.id)?;
    Ok(())
}

/// Oldest first.
pub fn list<D: SafeDatabase>(db: &D, proposal_id: &str) -> Result<Vec<DiscussionMessage>> {
    Ok(scan_json(db, tables::DISCUSSIONS, &tables::prefix(proposal_id))?)
}

pub fn delete_all<D: SafeDatabase>(db: &D, proposal_id: &str) -> Result<()> {
    for message in list(db, proposal_id)? {
        delete(db, &message)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::tempdir;
    use voxen_database::InnerDatabase;

    fn message(id: &str, proposal_id: &str, offset: i64) -> DiscussionMessage {
        let at = Utc::now() + Duration::seconds(offset);
        DiscussionMessage {
            id: id.into(),
            proposal_id: proposal_id.into(),
            author: "0xa".into(),
            text: format!("text {}", id),
            edited: false,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_insert_edit_delete() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        insert(&db, &message("m2", "p1", 5))?;
        insert(&db, &message("m1", "p1", 0))?;
        insert(&db, &message("m3", "p2", 0))?;

        let ids: Vec<String> = list(&db, "p1")?.into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["m1".to_string(), "m2".to_string()]);

        let mut edited = require(&db, "m2")?;
        edited.text = "changed".into();
        edited.edited = true;
        save(&db, &edited)?;
        assert_eq!(require(&db, "m2")?.text, "changed");
        assert_eq!(list(&db, "p1")?.len(), 2);

        delete(&db, &edited)?;
        assert!(get(&db, "m2")?.is_none());

        delete_all(&db, "p1")?;
        assert!(list(&db, "p1")?.is_empty());
        assert_eq!(list(&db, "p2")?.len(), 1);
        Ok(())
    }
}
