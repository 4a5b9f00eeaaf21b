use std::path::{Path, PathBuf};

use log::{error, info, warn};
use notify::{Config, Error, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::command::Command;

/// Reads a schedule document from disk into a `SetSchedules` command.
/// Documents that aren't JSON are logged and skipped; shape errors are left
/// to the schedule store, which keeps the previous schedules.
pub async fn read_import(path: &Path) -> Option<Command> {
    let json_string = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) => {
            error!("Failed to read schedule import {:?}: {}", path, err);
            return None;
        }
    };
    match serde_json::from_str(&json_string) {
        Ok(document) => Some(Command::SetSchedules { document }),
        Err(err) => {
            warn!("Schedule import {:?} is not JSON: {}", path, err);
            None
        }
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    (event.kind.is_modify() || event.kind.is_create())
        && event.paths.iter().any(|changed| changed.ends_with(path.file_name().unwrap_or_default()))
}

/// Forwards the import file, and every later write to it, to the service.
pub async fn watch_schedule_import(path: PathBuf, commands: mpsc::UnboundedSender<Command>) {
    if path.exists() {
        if let Some(command) = read_import(&path).await {
            let _ = commands.send(command);
        }
    }

    let runtime_handle = tokio::runtime::Handle::current();
    let (sender, mut receiver) = mpsc::channel(1);
    let watched = path.clone();

    let watcher = RecommendedWatcher::new(
        move |result: Result<Event, Error>| {
            let sender_clone = sender.clone();
            let watched = watched.clone();
            runtime_handle.spawn(async move {
                match result {
                    Ok(event) => {
                        if touches(&event, &watched) {
                            if let Some(command) = read_import(&watched).await {
                                if let Err(e) = sender_clone.send(command).await {
                                    error!("Unable to send schedule import {:?}", e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Watch error: {:?}", e);
                    }
                }
            });
        },
        Config::default(),
    );
    let mut watcher = match watcher {
        Ok(watcher) => watcher,
        Err(e) => {
            error!("Unable to create schedule import watcher: {:?}", e);
            return;
        }
    };

    // The file may not exist yet, so watch its directory.
    let directory = path.parent().unwrap_or_else(|| Path::new("."));
    if let Err(e) = watcher.watch(directory, RecursiveMode::NonRecursive) {
        error!("Unable to watch for schedule import: {:?}", e);
        return;
    }
    info!("Watching {:?} for schedule imports", path);

    while let Some(command) = receiver.recv().await {
        if commands.send(command).is_err() {
            info!("Service gone, schedule import watcher exiting");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, EventKind, ModifyKind};

    fn scratch_file(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedules.json");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_import_becomes_set_schedules() {
        let (_dir, path) = scratch_file("[]");
        assert_eq!(
            read_import(&path).await,
            Some(Command::SetSchedules {
                document: serde_json::json!([])
            })
        );
    }

    #[tokio::test]
    async fn test_non_json_import_is_skipped() {
        let (_dir, path) = scratch_file("schedules: none");
        assert_eq!(read_import(&path).await, None);
    }

    #[tokio::test]
    async fn test_missing_import_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_import(&dir.path().join("absent.json")).await, None);
    }

    #[test]
    fn test_only_writes_to_the_import_file_count() {
        let path = PathBuf::from("/data/schedules.json");
        let write = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.clone());
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone());
        let other = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/data/settings.json"));
        let removed = Event::new(EventKind::Remove(notify::event::RemoveKind::File))
            .add_path(path.clone());

        assert!(touches(&write, &path));
        assert!(touches(&create, &path));
        assert!(!touches(&other, &path));
        assert!(!touches(&removed, &path));
    }
}
