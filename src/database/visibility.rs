use crate::error::{MNError, Result};
use crate::models::{Note, Snapshot};

/// Public notes whose owner is not suspended. Notes whose owner record is
/// missing are treated as unsuspended.
pub fn is_publicly_listed(snapshot: &Snapshot, note: &Note) -> bool {
    note.is_public
        && !snapshot
            .find_user(&note.user_id)
            .map_or(false, |owner| owner.is_suspended)
}

pub fn can_view(snapshot: &Snapshot, note: &Note, viewer_id: Option<&str>) -> bool {
    viewer_id == Some(note.user_id.as_str()) || is_publicly_listed(snapshot, note)
}

pub fn list_public_notes(snapshot: &Snapshot) -> Vec<&Note> {
    snapshot
        .notes
        .iter()
        .filter(|note| is_publicly_listed(snapshot, note))
        .collect()
}

/// Every note owned by `user_id`, private ones included.
pub fn list_notes_for_user<'a>(snapshot: &'a Snapshot, user_id: &str) -> Vec<&'a Note> {
    snapshot
        .notes
        .iter()
        .filter(|note| note.user_id == user_id)
        .collect()
}

/// Notes hidden from the viewer are reported as missing.
pub fn visible_note<'a>(
    snapshot: &'a Snapshot,
    note_id: &str,
    viewer_id: Option<&str>,
) -> Result<&'a Note> {
    snapshot
        .find_note(note_id)
        .filter(|note| can_view(snapshot, note, viewer_id))
        .ok_or(MNError::NotFound("Note not found"))
}
