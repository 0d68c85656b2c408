//! Permission checks over membership roles.

use crate::parser::Role;

pub fn can_manage_space(role: Option<Role>) -> bool {
    role.map_or(false, |r| r >= Role::Admin)
}

pub fn can_delete_space(role: Option<Role>) -> bool {
    role == Some(Role::Owner)
}

pub fn can_moderate(role: Option<Role>) -> bool {
    role.map_or(false, |r| r >= Role::Moderator)
}

/// Authors always manage their own proposals; admins manage everyone's.
pub fn can_manage_proposal(role: Option<Role>, actor: &str, author: &str) -> bool {
    actor == author || can_manage_space(role)
}

/// An admin+ may move someone they outrank to any role below their own.
/// Ownership is never granted or taken through this path.
pub fn can_change_role(actor: Role, target_current: Role, target_new: Role) -> bool {
    actor >= Role::Admin && actor > target_current && target_new < actor
}

pub fn can_remove(actor: Role, target: Role) -> bool {
    actor >= Role::Moderator && actor > target
}
