//! Translation of raw `notify` events into add/delete events.

use std::path::Path;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind as RawKind};

use super::events::PathEvent;

/// Kind of an existing path: `Some(true)` for directories, `None` if missing.
#[must_use]
pub fn path_kind(path: &Path) -> Option<bool> {
    std::fs::symlink_metadata(path).ok().map(|meta| meta.is_dir())
}

/// Normalize one raw event.
///
/// `kind_of` reports whether a path currently exists and is a directory; it
/// is only consulted when the event itself does not say.
pub fn normalize<F>(event: &Event, kind_of: F) -> Vec<PathEvent>
where
    F: Fn(&Path) -> Option<bool>,
{
    let mut out = Vec::with_capacity(event.paths.len());

    match event.kind {
        RawKind::Create(CreateKind::File) => {
            out.extend(event.paths.iter().map(|p| PathEvent::add(p, false)));
        }
        RawKind::Create(CreateKind::Folder) => {
            out.extend(event.paths.iter().map(|p| PathEvent::add(p, true)));
        }
        RawKind::Create(_) => {
            for path in &event.paths {
                if let Some(is_dir) = kind_of(path) {
                    out.push(PathEvent::add(path, is_dir));
                }
            }
        }
        RawKind::Remove(RemoveKind::File) => {
            out.extend(event.paths.iter().map(|p| PathEvent::delete(p, false)));
        }
        RawKind::Remove(RemoveKind::Folder) => {
            out.extend(event.paths.iter().map(|p| PathEvent::delete(p, true)));
        }
        RawKind::Remove(_) => {
            for path in &event.paths {
                push_unknown_delete(&mut out, path);
            }
        }
        RawKind::Modify(ModifyKind::Name(_)) => {
            for path in &event.paths {
                match kind_of(path) {
                    Some(is_dir) => out.push(PathEvent::add(path, is_dir)),
                    None => push_unknown_delete(&mut out, path),
                }
            }
        }
        RawKind::Modify(_) | RawKind::Access(_) => {}
        RawKind::Any | RawKind::Other => {
            tracing::debug!(kind = ?event.kind, paths = ?event.paths, "Dropping unclassified event");
        }
    }

    out
}

fn push_unknown_delete(out: &mut Vec<PathEvent>, path: &Path) {
    out.push(PathEvent::delete(path, false));
    out.push(PathEvent::delete(path, true));
}
