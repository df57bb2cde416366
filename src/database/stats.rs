//! Derived counts. Nothing here is stored; every number is recomputed from
//! the view, like and comment rows of the snapshot it is given.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{Note, Snapshot};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoteCounts {
    pub views: usize,
    pub likes: usize,
    pub comments: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NoteWithStats {
    #[serde(flatten)]
    pub note: Note,
    #[serde(flatten)]
    pub counts: NoteCounts,
}

pub fn note_counts(snapshot: &Snapshot, note_id: &str) -> NoteCounts {
    NoteCounts {
        views: snapshot.views.iter().filter(|v| v.note_id == note_id).count(),
        likes: snapshot.likes.iter().filter(|l| l.note_id == note_id).count(),
        comments: snapshot.comments.iter().filter(|c| c.note_id == note_id).count(),
    }
}

pub fn enrich(snapshot: &Snapshot, note: &Note) -> NoteWithStats {
    NoteWithStats {
        note: note.clone(),
        counts: note_counts(snapshot, &note.id),
    }
}

/// Counts for every note, built in one pass over each related collection.
struct StatsIndex<'a> {
    counts: HashMap<&'a str, NoteCounts>,
}

impl<'a> StatsIndex<'a> {
    fn build(snapshot: &'a Snapshot) -> Self {
        let mut counts: HashMap<&'a str, NoteCounts> = HashMap::new();
        for view in &snapshot.views {
            counts.entry(view.note_id.as_str()).or_default().views += 1;
        }
        for like in &snapshot.likes {
            counts.entry(like.note_id.as_str()).or_default().likes += 1;
        }
        for comment in &snapshot.comments {
            counts.entry(comment.note_id.as_str()).or_default().comments += 1;
        }
        StatsIndex { counts }
    }

    fn get(&self, note_id: &str) -> NoteCounts {
        self.counts.get(note_id).copied().unwrap_or_default()
    }
}

/// Same result as calling [`enrich`] on each note.
pub fn enrich_all<'a, I>(snapshot: &Snapshot, notes: I) -> Vec<NoteWithStats>
where
    I: IntoIterator<Item = &'a Note>,
{
    let index = StatsIndex::build(snapshot);
    notes
        .into_iter()
        .map(|note| NoteWithStats {
            note: note.clone(),
            counts: index.get(&note.id),
        })
        .collect()
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_notes: usize,
    pub total_public_notes: usize,
    pub total_views: usize,
    pub total_likes: usize,
    pub total_comments: usize,
}

/// Totals over every note the user owns, private ones included.
pub fn user_stats(snapshot: &Snapshot, user_id: &str) -> UserStats {
    let index = StatsIndex::build(snapshot);
    snapshot
        .notes
        .iter()
        .filter(|note| note.user_id == user_id)
        .fold(UserStats::default(), |mut stats, note| {
            let counts = index.get(&note.id);
            stats.total_notes += 1;
            if note.is_public {
                stats.total_public_notes += 1;
            }
            stats.total_views += counts.views;
            stats.total_likes += counts.likes;
            stats.total_comments += counts.comments;
            stats
        })
}
