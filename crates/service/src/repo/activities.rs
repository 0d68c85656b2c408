use chrono::{DateTime, Utc};
use uuid::Uuid;
use voxen_database::typed::{put_json, scan_json};
use voxen_database::{tables, SafeDatabase};

use crate::error::Result;
use crate::parser::{Activity, ActivityKind};
use crate::repo::time_key;

const GLOBAL_SCOPE: &str = "global";

pub struct NewActivity<'a> {
    pub space_id: Option<&'a str>,
    pub actor: &'a str,
    pub kind: ActivityKind,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// Appends a row. Rows are never updated or deleted.
pub fn record<D: SafeDatabase>(db: &D, entry: NewActivity<'_>, now: DateTime<Utc>) -> Result<Activity> {
    let activity = Activity {
        id: Uuid::new_v4().to_string(),
        space_id: entry.space_id.map(str::to_string),
        actor: entry.actor.to_string(),
        kind: entry.kind,
        description: entry.description,
        metadata: entry.metadata,
        created_at: now,
    };
    let scope = entry.space_id.unwrap_or(GLOBAL_SCOPE);
    let key = tables::composite(scope, &tables::composite(&time_key(now), &activity.id));
    put_json(db, tables::ACTIVITIES, &key, &activity)?;
    Ok(activity)
}

fn page(mut rows: Vec<Activity>, limit: usize, offset: usize) -> Vec<Activity> {
    rows.reverse();
    rows.into_iter().skip(offset).take(limit).collect()
}

/// Newest first.
pub fn list_for_space<D: SafeDatabase>(db: &D, space_id: &str, limit: usize, offset: usize) -> Result<Vec<Activity>> {
    let rows: Vec<Activity> = scan_json(db, tables::ACTIVITIES, &tables::prefix(space_id))?;
    Ok(page(rows, limit, offset))
}

pub fn list_for_actor<D: SafeDatabase>(db: &D, actor: &str, limit: usize, offset: usize) -> Result<Vec<Activity>> {
    let mut rows: Vec<Activity> = scan_json::<D, Activity>(db, tables::ACTIVITIES, "")?
        .into_iter()
        .filter(|a| a.actor == actor)
        .collect();
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(page(rows, limit, offset))
}
