//! Bootstrap selection: which stored fragment seeds the editor on load.
//!
//! A note may own several fragments (one seeded at creation, one or more
//! from editing sessions). The most recently edited one wins. Each fragment's
//! timestamp is `metadata.lastEditedAt` if it parses, else the store's
//! `updatedAt`, else the Unix epoch. Ties keep the fragment that came
//! first in store order.

use chrono::{DateTime, Utc};

use crate::models::Fragment;

/// Comparable timestamp of a fragment.
pub fn fragment_timestamp(fragment: &Fragment) -> DateTime<Utc> {
    fragment
        .metadata
        .as_ref()
        .and_then(|meta| meta.last_edited_at())
        .or(fragment.updated_at)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Selects the most recent fragment, first-seen on ties.
pub fn select_latest(fragments: &[Fragment]) -> Option<&Fragment> {
    latest(fragments)
}

/// Like [`select_latest`], but only among fragments whose content shape
/// carries markup. An unreadable newer fragment never hides a readable
/// older one.
pub fn select_latest_readable(fragments: &[Fragment]) -> Option<&Fragment> {
    latest(fragments.iter().filter(|f| f.content.text().is_some()))
}

/// Content of the selected fragment, normalized across content shapes.
///
/// Returns `None` when no fragment carries a markup string.
pub fn select_initial_content(fragments: &[Fragment]) -> Option<String> {
    select_latest_readable(fragments)
        .and_then(|fragment| fragment.content.text())
        .map(str::to_string)
}

fn latest<'a>(fragments: impl IntoIterator<Item = &'a Fragment>) -> Option<&'a Fragment> {
    let mut best: Option<(&Fragment, DateTime<Utc>)> = None;
    for fragment in fragments {
        let ts = fragment_timestamp(fragment);
        match best {
            Some((_, best_ts)) if ts <= best_ts => {}
            _ => best = Some((fragment, ts)),
        }
    }
    best.map(|(fragment, _)| fragment)
}
