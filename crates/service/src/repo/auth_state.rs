//! Short-lived authentication state: login nonces, email codes and pending
//! OAuth authorizations. Expired entries are treated as absent.

use chrono::{DateTime, Utc};
use voxen_database::typed::{get_json, put_json, remove};
use voxen_database::{tables, SafeDatabase};

use crate::error::Result;
use crate::parser::{EmailOtp, LoginNonce, OAuthState};

pub fn put_nonce<D: SafeDatabase>(db: &D, address: &str, nonce: &LoginNonce) -> Result<()> {
    Ok(put_json(db, tables::NONCES, address, nonce)?)
}

/// Removes and returns the nonce; a nonce can be redeemed once.
pub fn take_nonce<D: SafeDatabase>(db: &D, address: &str, now: DateTime<Utc>) -> Result<Option<LoginNonce>> {
    let nonce: Option<LoginNonce> = get_json(db, tables::NONCES, address)?;
    if nonce.is_some() {
        remove(db, tables::NONCES, address)?;
    }
    Ok(nonce.filter(|n| n.expires_at > now))
}

pub fn get_otp<D: SafeDatabase>(db: &D, address: &str) -> Result<Option<EmailOtp>> {
    Ok(get_json(db, tables::OTPS, address)?)
}

pub fn put_otp<D: SafeDatabase>(db: &D, address: &str, otp: &EmailOtp) -> Result<()> {
    Ok(put_json(db, tables::OTPS, address, otp)?)
}

pub fn clear_otp<D: SafeDatabase>(db: &D, address: &str) -> Result<()> {
    remove(db, tables::OTPS, address)?;
    Ok(())
}

pub fn put_oauth<D: SafeDatabase>(db: &D, state: &str, pending: &OAuthState) -> Result<()> {
    Ok(put_json(db, tables::OAUTH_STATES, state, pending)?)
}

pub fn take_oauth<D: SafeDatabase>(db: &D, state: &str, now: DateTime<Utc>) -> Result<Option<OAuthState>> {
    let pending: Option<OAuthState> = get_json(db, tables::OAUTH_STATES, state)?;
    if pending.is_some() {
        remove(db, tables::OAUTH_STATES, state)?;
    }
    Ok(pending.filter(|p| p.expires_at > now))
}
