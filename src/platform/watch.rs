use std::path::Path;

use notify::{
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher,
    event::{CreateKind, ModifyKind, RemoveKind},
};
use tracing::{debug, error};

use super::LibraryChange;
use super::scan;

/// Watch `root` recursively and report media changes to `on_change`.
///
/// `on_change` runs on the watcher's own thread.
pub fn start_watcher<F>(root: &Path, on_change: F) -> NotifyResult<RecommendedWatcher>
where
    F: Fn(LibraryChange) + Send + 'static,
{
    let owned_root = root.to_path_buf();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if let Some(change) = library_change(&owned_root, event) {
                on_change(change);
            }
        }
        Err(e) => error!("watch error: {e}"),
    })?;

    watcher.configure(Config::default())?;
    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

fn library_change(root: &Path, event: Event) -> Option<LibraryChange> {
    let relevant = match &event.kind {
        EventKind::Create(CreateKind::File | CreateKind::Folder | CreateKind::Any) => true,
        EventKind::Remove(RemoveKind::File | RemoveKind::Folder | RemoveKind::Any) => true,
        // macOS often reports moves as Name(Any).
        EventKind::Modify(ModifyKind::Name(_) | ModifyKind::Data(_)) => true,
        _ => false,
    };
    if !relevant {
        debug!(kind = ?event.kind, "fs: ignored");
        return None;
    }
    let identifiers: Vec<String> = event
        .paths
        .iter()
        .filter(|p| is_candidate(p))
        .filter_map(|p| p.strip_prefix(root).ok())
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    if identifiers.is_empty() {
        return None;
    }
    debug!(kind = ?event.kind, ?identifiers, "fs: library change");
    Some(LibraryChange { identifiers })
}

// Folders count too: creating or removing one adds or removes an album.
fn is_candidate(p: &Path) -> bool {
    scan::playback_style(p).is_some() || p.extension().is_none()
}
