use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number of entries kept in the recent-projects list.
pub const RECENT_PROJECTS_LIMIT: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentProject {
    pub path: PathBuf,
    pub name: String,
    pub opened_at: DateTime<Utc>,
}

impl RecentProject {
    pub fn new(path: PathBuf, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| project_name(&path));
        Self {
            path,
            name,
            opened_at: Utc::now(),
        }
    }

    pub fn display_path(&self) -> String {
        self.path
            .to_str()
            .map(|s| {
                if let Some(home) = dirs::home_dir() {
                    if let Some(home_str) = home.to_str() {
                        if s.starts_with(home_str) {
                            return format!("~{}", &s[home_str.len()..]);
                        }
                    }
                }
                s.to_string()
            })
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// A user-defined command (dev server, test watcher, ...) remembered per project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCommand {
    pub name: String,
    pub command: String,
}

/// Folder name of a project path, used as the default workspace title.
pub fn project_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("workspace")
        .to_string()
}

/// Move `entry` to the front, drop older duplicates of its path, cap at `limit`.
pub fn push_recent(list: &mut Vec<RecentProject>, entry: RecentProject, limit: usize) {
    list.retain(|existing| existing.path != entry.path);
    list.insert(0, entry);
    list.truncate(limit);
}
