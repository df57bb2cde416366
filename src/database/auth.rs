use crate::api::common::is_token;
use crate::error::{MNError, Result};
use crate::models::{Admin, Snapshot, User};

/// The user whose current session token equals `token`. Suspension is not
/// checked here.
pub fn authenticate<'a>(snapshot: &'a Snapshot, token: Option<&str>) -> Result<&'a User> {
    let token = token.filter(|token| is_token(token)).ok_or(MNError::Unauthorized)?;
    snapshot
        .users
        .iter()
        .find(|user| user.token.as_deref() == Some(token))
        .ok_or(MNError::Unauthorized)
}

/// Like [`authenticate`], but suspended accounts are refused. Used by every
/// route that mutates state on the caller's behalf.
pub fn authenticate_active<'a>(snapshot: &'a Snapshot, token: Option<&str>) -> Result<&'a User> {
    let user = authenticate(snapshot, token)?;
    if user.is_suspended {
        return Err(MNError::Forbidden("Account suspended"));
    }
    Ok(user)
}

pub fn authenticate_admin<'a>(snapshot: &'a Snapshot, token: Option<&str>) -> Result<&'a Admin> {
    let token = token.filter(|token| is_token(token)).ok_or(MNError::Unauthorized)?;
    if snapshot.admin.token.as_deref() == Some(token) {
        Ok(&snapshot.admin)
    } else {
        Err(MNError::Unauthorized)
    }
}
