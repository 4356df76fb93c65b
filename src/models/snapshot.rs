use super::layout::SplitOrientation;
use super::project::project_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneRecord {
    pub id: String,
    pub name: String,
}

/// Serializable description of one tab's panes and layout, used for resume/restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub project_path: PathBuf,
    #[serde(default)]
    pub workspace_name: Option<String>,
    pub panes: Vec<PaneRecord>,
    pub active_id: String,
    #[serde(default)]
    pub last_split_orientation: SplitOrientation,
    #[serde(default)]
    pub grid_layout_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Active pane id, repaired to the first pane when the recorded one is stale.
    pub fn resolved_active_id(&self) -> Option<&str> {
        if self.panes.iter().any(|p| p.id == self.active_id) {
            Some(self.active_id.as_str())
        } else {
            self.panes.first().map(|p| p.id.as_str())
        }
    }

    /// Title for a tab restored from this snapshot.
    pub fn title(&self) -> String {
        self.workspace_name
            .clone()
            .unwrap_or_else(|| project_name(&self.project_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(active: &str) -> Snapshot {
        Snapshot {
            project_path: PathBuf::from("/work/api"),
            workspace_name: None,
            panes: vec![
                PaneRecord { id: "a".into(), name: "Terminal 1".into() },
                PaneRecord { id: "b".into(), name: "Terminal 2".into() },
            ],
            active_id: active.to_string(),
            last_split_orientation: SplitOrientation::Vertical,
            grid_layout_id: Some("1x2".into()),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stale_active_id_falls_back_to_first_pane() {
        assert_eq!(snapshot("b").resolved_active_id(), Some("b"));
        assert_eq!(snapshot("gone").resolved_active_id(), Some("a"));
    }

    #[test]
    fn title_prefers_the_workspace_name_over_the_folder() {
        let mut snap = snapshot("a");
        assert_eq!(snap.title(), project_name(&snap.project_path));
        snap.project_path = PathBuf::from("/");
        assert_eq!(snap.title(), "workspace");
        snap.workspace_name = Some("backend".into());
        assert_eq!(snap.title(), "backend");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(snapshot("a")).unwrap();
        assert_eq!(json["projectPath"], "/work/api");
        assert_eq!(json["activeId"], "a");
        assert_eq!(json["lastSplitOrientation"], "vertical");
        assert_eq!(json["gridLayoutId"], "1x2");
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let json = r#"{
            "projectPath": "/work/api",
            "panes": [{"id": "a", "name": "Terminal 1"}],
            "activeId": "a",
            "updatedAt": "2024-05-01T10:00:00Z"
        }"#;
        let snap: Snapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.last_split_orientation, SplitOrientation::Horizontal);
        assert!(snap.grid_layout_id.is_none());
        assert_eq!(snap.title(), "api");
    }
}
