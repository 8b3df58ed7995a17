//! Hot reload for placement configs on disk.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use bevy::prelude::Resource;
use crossbeam_channel::{unbounded, Receiver};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::PlacementConfig;

#[derive(Debug, Error)]
pub enum ConfigWatchError {
    #[error("config path {0:?} has no parent directory")]
    NoParent(PathBuf),
    #[error("failed to watch placement config: {0}")]
    Watch(#[from] notify::Error),
}

/// Re-parses the config file whenever it changes and queues the result.
/// Files that fail to parse or validate are logged and skipped.
#[derive(Resource)]
pub struct ConfigWatcher {
    path: PathBuf,
    receiver: Receiver<PlacementConfig>,
    _watcher: Mutex<RecommendedWatcher>,
}

impl ConfigWatcher {
    pub fn watch(path: impl Into<PathBuf>) -> Result<Self, ConfigWatchError> {
        let path = path.into();
        // Editors often replace the file, so watch the directory and filter.
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ConfigWatchError::NoParent(path.clone()))?;
        let directory = if directory.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            directory
        };

        let (sender, receiver) = unbounded::<PlacementConfig>();
        let watched = path.clone();
        let mut watcher = notify::recommended_watcher(move |event: notify::Result<Event>| {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    warn!(target: "terrain_markers::config", error = %err, "placement_config.watch_error");
                    return;
                }
            };
            if !touches(&event, &watched) {
                return;
            }
            match PlacementConfig::from_file(&watched) {
                Ok(config) => {
                    info!(
                        target: "terrain_markers::config",
                        path = %watched.display(),
                        "placement_config.reloaded"
                    );
                    let _ = sender.send(config);
                }
                Err(err) => warn!(
                    target: "terrain_markers::config",
                    path = %watched.display(),
                    error = %err,
                    "placement_config.reload_rejected"
                ),
            }
        })?;
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;

        Ok(Self {
            path,
            receiver,
            _watcher: Mutex::new(watcher),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The most recent valid config written since the last call, if any.
    pub fn latest(&self) -> Option<PlacementConfig> {
        self.receiver.try_iter().last()
    }
}

fn touches(event: &Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|changed| changed.file_name() == path.file_name())
}
