//! Input validation shared by the handlers. Functions return the normalized
//! value so callers store exactly what was checked.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::{Result, ServiceError};
use crate::parser::VotingType;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 20_000;
pub const MAX_OPTION_LEN: usize = 200;
pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 20;
pub const MAX_MESSAGE_LEN: usize = 2_000;
pub const MAX_DISPLAY_NAME_LEN: usize = 50;
pub const MAX_BIO_LEN: usize = 500;

fn handle(value: &str, what: &str, extra: &[char]) -> Result<String> {
    let value = value.trim().to_ascii_lowercase();
    let len = value.chars().count();
    if !(3..=30).contains(&len) {
        return Err(ServiceError::validation(format!(
            "{} must be between 3 and 30 characters",
            what
        )));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || extra.contains(&c))
    {
        let allowed = if extra.contains(&'-') {
            "letters, numbers, underscores and hyphens"
        } else {
            "letters, numbers and underscores"
        };
        return Err(ServiceError::validation(format!("{} may only contain {}", what, allowed)));
    }
    Ok(value)
}

pub fn username(value: &str) -> Result<String> {
    handle(value, "Username", &[])
}

/// Names that collide with fixed routes under `/api/spaces/`.
const RESERVED_SPACE_USERNAMES: &[&str] = &["mine"];

pub fn space_username(value: &str) -> Result<String> {
    let value = handle(value, "Space username", &['-'])?;
    if RESERVED_SPACE_USERNAMES.contains(&value.as_str()) {
        return Err(ServiceError::validation("Space username is reserved"));
    }
    Ok(value)
}

pub fn email(value: &str) -> Result<String> {
    let value = value.trim().to_ascii_lowercase();
    let valid = value.len() <= 254
        && !value.contains(char::is_whitespace)
        && match value.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
    if valid {
        Ok(value)
    } else {
        Err(ServiceError::validation("Invalid email address"))
    }
}

pub fn bounded(value: &str, field: &str, max: usize) -> Result<String> {
    let value = value.trim();
    if value.chars().count() > max {
        return Err(ServiceError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

pub fn required(value: &str, field: &str, max: usize) -> Result<String> {
    let value = bounded(value, field, max)?;
    if value.is_empty() {
        return Err(ServiceError::validation(format!("{} is required", field)));
    }
    Ok(value)
}

pub fn options(options: &[String]) -> Result<Vec<String>> {
    if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
        return Err(ServiceError::validation(format!(
            "A proposal needs between {} and {} options",
            MIN_OPTIONS, MAX_OPTIONS
        )));
    }
    let mut seen = HashSet::new();
    let mut cleaned = Vec::with_capacity(options.len());
    for option in options {
        let option = required(option, "Option", MAX_OPTION_LEN)?;
        if !seen.insert(option.to_lowercase()) {
            return Err(ServiceError::validation(format!("Duplicate option: {}", option)));
        }
        cleaned.push(option);
    }
    Ok(cleaned)
}

pub fn voting_window(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
    if end <= start {
        return Err(ServiceError::validation("End date must be after start date"));
    }
    if end <= now {
        return Err(ServiceError::validation("End date must be in the future"));
    }
    Ok(())
}

/// Checks a ballot against the proposal shape and returns the sorted choices.
pub fn choices(voting_type: VotingType, choices: &[u32], option_count: usize) -> Result<Vec<u32>> {
    if choices.is_empty() {
        return Err(ServiceError::validation("Select at least one option"));
    }
    if voting_type == VotingType::SingleChoice && choices.len() != 1 {
        return Err(ServiceError::validation("Single choice proposals take exactly one option"));
    }
    let mut sorted = choices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.len() != choices.len() {
        return Err(ServiceError::validation("Options may only be selected once"));
    }
    if sorted.iter().any(|c| *c as usize >= option_count) {
        return Err(ServiceError::validation("Invalid option selected"));
    }
    Ok(sorted)
}

pub fn message_text(text: &str) -> Result<String> {
    required(text, "Message", MAX_MESSAGE_LEN)
}
