use voxen_database::typed::{get_json, put_json, remove as remove_key, scan_json};
use voxen_database::{tables, SafeDatabase};

use crate::error::Result;
use crate::parser::{Membership, Role};

pub fn get<D: SafeDatabase>(db: &D, space_id: &str, address: &str) -> Result<Option<Membership>> {
    Ok(get_json(db, tables::MEMBERS, &tables::composite(space_id, address))?)
}

pub fn role_of<D: SafeDatabase>(db: &D, space_id: &str, address: &str) -> Result<Option<Role>> {
    Ok(get(db, space_id, address)?.map(|m| m.role))
}

pub fn save<D: SafeDatabase>(db: &D, membership: &Membership) -> Result<()> {
    let key = tables::composite(&membership.space_id, &membership.address);
    Ok(put_json(db, tables::MEMBERS, &key, membership)?)
}

pub fn remove<D: SafeDatabase>(db: &D, space_id: &str, address: &str) -> Result<bool> {
    Ok(remove_key(db, tables::MEMBERS, &tables::composite(space_id, address))?)
}

pub fn list<D: SafeDatabase>(db: &D, space_id: &str) -> Result<Vec<Membership>> {
    Ok(scan_json(db, tables::MEMBERS, &tables::prefix(space_id))?)
}

pub fn of_user<D: SafeDatabase>(db: &D, address: &str) -> Result<Vec<Membership>> {
    let all: Vec<Membership> = scan_json(db, tables::MEMBERS, "")?;
    Ok(all.into_iter().filter(|m| m.address == address).collect())
}
