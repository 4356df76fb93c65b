use super::action::{Command, Effect};
use crate::models::{
    check_capacity, project_name, resolve_grid, GridDims, GridLayout, LayoutError, Pane, PaneRecord,
    Snapshot, SplitOrientation, Tab, TabState, LAYOUT_CATALOG,
};
use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const NEW_TAB_TITLE: &str = "New Tab";

/// Authoritative state of the tab on screen.
#[derive(Debug, Default)]
struct LiveTab {
    project_path: Option<PathBuf>,
    workspace_name: Option<String>,
    panes: Vec<Pane>,
    active_id: Option<String>,
    orientation: SplitOrientation,
    pinned: Option<&'static GridLayout>,
}

impl LiveTab {
    fn snapshot(&self) -> Option<Snapshot> {
        let project_path = self.project_path.clone()?;
        if self.panes.is_empty() {
            return None;
        }
        Some(Snapshot {
            project_path,
            workspace_name: self.workspace_name.clone(),
            panes: self
                .panes
                .iter()
                .map(|p| PaneRecord {
                    id: p.id.clone(),
                    name: p.display_name.clone(),
                })
                .collect(),
            active_id: self.active_id.clone().unwrap_or_default(),
            last_split_orientation: self.orientation,
            grid_layout_id: self.pinned.map(|l| l.id.to_string()),
            updated_at: Utc::now(),
        })
    }

    /// Rebuild live state from a snapshot, reusing parked panes whose ids match.
    ///
    /// Records without a parked pane get a fresh session; parked panes the
    /// snapshot no longer mentions are closed.
    fn from_snapshot(snapshot: &Snapshot, mut parked: Vec<Pane>, limit: usize) -> (Self, Vec<Effect>) {
        let mut effects = Vec::new();
        let mut seen = HashSet::new();
        let mut panes = Vec::new();

        for record in &snapshot.panes {
            if panes.len() >= limit || !seen.insert(record.id.clone()) {
                continue;
            }
            let pane = match parked.iter().position(|p| p.id == record.id) {
                Some(pos) => {
                    let mut pane = parked.remove(pos);
                    pane.display_name = record.name.clone();
                    pane
                }
                None => {
                    let pane = Pane::new(record.id.clone(), record.name.clone(), None);
                    effects.push(create_effect(&pane, &snapshot.project_path));
                    pane
                }
            };
            panes.push(pane);
        }

        effects.extend(parked.iter().map(close_effect));

        if panes.is_empty() {
            let pane = Pane::new(Pane::generate_id(), "Terminal 1".to_string(), None);
            effects.push(create_effect(&pane, &snapshot.project_path));
            panes.push(pane);
        }

        let mut live = Self {
            project_path: Some(snapshot.project_path.clone()),
            workspace_name: snapshot.workspace_name.clone(),
            panes,
            active_id: snapshot.resolved_active_id().map(str::to_string),
            orientation: snapshot.last_split_orientation,
            pinned: snapshot.grid_layout_id.as_deref().and_then(GridLayout::find),
        };
        live.repair_active();
        (live, effects)
    }

    fn index_of(&self, pane_id: &str) -> Option<usize> {
        self.panes.iter().position(|p| p.id == pane_id)
    }

    fn active_index(&self) -> Option<usize> {
        self.active_id.as_deref().and_then(|id| self.index_of(id))
    }

    fn repair_active(&mut self) {
        if self.active_index().is_none() {
            self.active_id = self.panes.first().map(|p| p.id.clone());
        }
    }

    /// Lowest "Terminal N" not already taken.
    fn next_pane_name(&self) -> String {
        (1..)
            .map(|n| format!("Terminal {n}"))
            .find(|name| !self.panes.iter().any(|p| &p.display_name == name))
            .unwrap_or_else(|| "Terminal".to_string())
    }
}

fn create_effect(pane: &Pane, cwd: &Path) -> Effect {
    Effect::CreateSession {
        pane_id: pane.id.clone(),
        session_id: pane.session_id.clone(),
        cwd: cwd.to_path_buf(),
    }
}

fn close_effect(pane: &Pane) -> Effect {
    Effect::CloseSession {
        pane_id: pane.id.clone(),
        session_id: pane.session_id.clone(),
    }
}

/// Tabs, panes and layout. Pure state: every change returns the effects the runtime must carry out.
pub struct Workspace {
    tabs: Vec<Tab>,
    active_tab: usize,
    live: LiveTab,
    pane_limit: usize,
}

impl Workspace {
    pub fn new(pane_limit: usize) -> Self {
        Self {
            tabs: vec![Tab::new(NEW_TAB_TITLE.to_string())],
            active_tab: 0,
            live: LiveTab::default(),
            pane_limit: pane_limit.clamp(1, crate::models::MAX_PANES),
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<Vec<Effect>, LayoutError> {
        match command {
            Command::OpenProject {
                path,
                workspace_name,
                panes,
                layout,
                startup_command,
            } => self.open_project(path, workspace_name, panes, layout, startup_command),
            Command::Split(orientation) => self.split(orientation),
            Command::Close(pane_id) => Ok(self.close(pane_id)),
            Command::Focus(pane_id) => Ok(self.focus(&pane_id)),
            Command::FocusNext => Ok(self.focus_step(1)),
            Command::FocusPrev => Ok(self.focus_step(-1)),
            Command::RenamePane { pane_id, name } => Ok(self.rename_pane(&pane_id, &name)),
            Command::RenameTab(title) => Ok(self.rename_tab(&title)),
            Command::NewTab(path) => self.new_tab(path),
            Command::SwitchTab(index) => Ok(self.switch_tab(index)),
            Command::CloseTab => Ok(self.close_tab()),
            Command::PinLayout(layout_id) => Ok(self.pin_layout(layout_id.as_deref())),
            Command::CycleLayout => Ok(self.cycle_layout()),
            Command::Restore(snapshot) => Ok(self.restore(snapshot)),
        }
    }

    fn check_limit(&self, panes: usize) -> Result<(), LayoutError> {
        check_capacity(panes)?;
        if panes > self.pane_limit {
            return Err(LayoutError::Overflow {
                limit: self.pane_limit,
            });
        }
        Ok(())
    }

    fn open_project(
        &mut self,
        path: PathBuf,
        workspace_name: Option<String>,
        panes: Option<usize>,
        layout: Option<String>,
        startup_command: Option<String>,
    ) -> Result<Vec<Effect>, LayoutError> {
        let pinned = match layout.as_deref() {
            Some(id) => {
                let found = GridLayout::find(id);
                if found.is_none() {
                    tracing::warn!(layout = id, "unknown layout, using computed grid");
                }
                found
            }
            None => None,
        };
        let count = panes
            .unwrap_or_else(|| pinned.map(|l| l.capacity()).unwrap_or(1))
            .max(1);
        self.check_limit(count)?;

        let mut effects = self.close_live_panes();
        let workspace_name = workspace_name.filter(|n| !n.trim().is_empty());
        let panes: Vec<Pane> = (1..=count)
            .map(|n| Pane::new(Pane::generate_id(), format!("Terminal {n}"), startup_command.clone()))
            .collect();
        effects.extend(panes.iter().map(|p| create_effect(p, &path)));

        self.live = LiveTab {
            project_path: Some(path.clone()),
            workspace_name: workspace_name.clone(),
            active_id: panes.first().map(|p| p.id.clone()),
            panes,
            orientation: SplitOrientation::default(),
            pinned,
        };

        let tab = &mut self.tabs[self.active_tab];
        tab.state = TabState::Ready;
        tab.title = workspace_name.clone().unwrap_or_else(|| project_name(&path));

        tracing::info!(path = %path.display(), panes = count, "opened project");
        effects.push(Effect::RecordRecent {
            path,
            name: workspace_name,
        });
        effects.push(Effect::ResizeAll);
        self.commit(&mut effects);
        Ok(effects)
    }

    fn split(&mut self, orientation: SplitOrientation) -> Result<Vec<Effect>, LayoutError> {
        let Some(cwd) = self.live.project_path.clone() else {
            return Ok(Vec::new());
        };
        if self.live.panes.is_empty() {
            return Ok(Vec::new());
        }
        self.check_limit(self.live.panes.len() + 1)?;

        let pane = Pane::new(Pane::generate_id(), self.live.next_pane_name(), None);
        let insert_at = self
            .live
            .active_index()
            .map(|i| i + 1)
            .unwrap_or(self.live.panes.len());

        let mut effects = vec![create_effect(&pane, &cwd)];
        self.live.active_id = Some(pane.id.clone());
        self.live.panes.insert(insert_at, pane);
        self.live.orientation = orientation;

        effects.push(Effect::ResizeAll);
        self.commit(&mut effects);
        Ok(effects)
    }

    fn close(&mut self, pane_id: Option<String>) -> Vec<Effect> {
        let Some(pane_id) = pane_id.or_else(|| self.live.active_id.clone()) else {
            return Vec::new();
        };
        let Some(index) = self.live.index_of(&pane_id) else {
            return Vec::new();
        };
        if self.live.panes.len() <= 1 {
            return Vec::new();
        }

        let pane = self.live.panes.remove(index);
        if self.live.active_id.as_deref() == Some(pane.id.as_str()) {
            self.live.active_id = self.live.panes.first().map(|p| p.id.clone());
        }

        let mut effects = vec![close_effect(&pane), Effect::ResizeAll];
        self.commit(&mut effects);
        effects
    }

    fn focus(&mut self, pane_id: &str) -> Vec<Effect> {
        if self.live.index_of(pane_id).is_none() || self.live.active_id.as_deref() == Some(pane_id) {
            return Vec::new();
        }
        self.live.active_id = Some(pane_id.to_string());
        let mut effects = Vec::new();
        self.commit(&mut effects);
        effects
    }

    fn focus_step(&mut self, delta: isize) -> Vec<Effect> {
        let count = self.live.panes.len();
        if count < 2 {
            return Vec::new();
        }
        let current = self.live.active_index().unwrap_or(0) as isize;
        let next = (current + delta).rem_euclid(count as isize) as usize;
        let pane_id = self.live.panes[next].id.clone();
        self.focus(&pane_id)
    }

    fn rename_pane(&mut self, pane_id: &str, name: &str) -> Vec<Effect> {
        let name = name.trim();
        if name.is_empty() {
            return Vec::new();
        }
        let Some(index) = self.live.index_of(pane_id) else {
            return Vec::new();
        };
        self.live.panes[index].display_name = name.to_string();
        let mut effects = Vec::new();
        self.commit(&mut effects);
        effects
    }

    fn rename_tab(&mut self, title: &str) -> Vec<Effect> {
        let title = title.trim();
        if title.is_empty() {
            return Vec::new();
        }
        self.tabs[self.active_tab].title = title.to_string();
        if self.live.project_path.is_some() {
            self.live.workspace_name = Some(title.to_string());
        }
        let mut effects = Vec::new();
        self.commit(&mut effects);
        effects
    }

    fn new_tab(&mut self, path: Option<PathBuf>) -> Result<Vec<Effect>, LayoutError> {
        self.freeze_active();
        self.tabs.push(Tab::new(NEW_TAB_TITLE.to_string()));
        self.active_tab = self.tabs.len() - 1;
        self.live = LiveTab::default();

        match path {
            Some(path) => self.open_project(path, None, None, None, None),
            None => Ok(Vec::new()),
        }
    }

    fn switch_tab(&mut self, index: usize) -> Vec<Effect> {
        if index >= self.tabs.len() || index == self.active_tab {
            return Vec::new();
        }
        self.freeze_active();
        let mut effects = self.rehydrate(index);
        effects.push(Effect::ResizeAll);
        self.commit(&mut effects);
        effects
    }

    fn close_tab(&mut self) -> Vec<Effect> {
        let mut effects = self.close_live_panes();
        self.live = LiveTab::default();
        self.tabs.remove(self.active_tab);
        if self.tabs.is_empty() {
            self.tabs.push(Tab::new(NEW_TAB_TITLE.to_string()));
        }
        let index = self.active_tab.min(self.tabs.len() - 1);
        effects.extend(self.rehydrate(index));
        effects.push(Effect::ResizeAll);
        self.commit(&mut effects);
        effects
    }

    fn pin_layout(&mut self, layout_id: Option<&str>) -> Vec<Effect> {
        if self.live.project_path.is_none() {
            return Vec::new();
        }
        let layout = match layout_id {
            None => None,
            Some(id) => match GridLayout::find(id) {
                Some(layout) => Some(layout),
                None => {
                    tracing::warn!(layout = id, "unknown layout");
                    return Vec::new();
                }
            },
        };
        self.live.pinned = layout;
        let mut effects = vec![Effect::ResizeAll];
        self.commit(&mut effects);
        effects
    }

    /// Step through the catalog layouts that fit the current panes, then back to computed.
    fn cycle_layout(&mut self) -> Vec<Effect> {
        let count = self.live.panes.len();
        let fitting: Vec<&'static GridLayout> =
            LAYOUT_CATALOG.iter().filter(|l| l.capacity() >= count).collect();

        let next = match self.live.pinned {
            None => fitting.first().copied(),
            Some(current) => fitting
                .iter()
                .position(|l| l.id == current.id)
                .and_then(|i| fitting.get(i + 1).copied()),
        };
        self.pin_layout(next.map(|l| l.id))
    }

    fn restore(&mut self, snapshot: Snapshot) -> Vec<Effect> {
        let mut effects = self.close_live_panes();
        let (live, created) = LiveTab::from_snapshot(&snapshot, Vec::new(), self.pane_limit);
        effects.extend(created);
        self.live = live;

        let tab = &mut self.tabs[self.active_tab];
        tab.state = TabState::Ready;
        tab.title = snapshot.title();

        tracing::info!(path = %snapshot.project_path.display(), panes = self.live.panes.len(), "restored snapshot");
        effects.push(Effect::RecordRecent {
            path: snapshot.project_path.clone(),
            name: snapshot.workspace_name.clone(),
        });
        effects.push(Effect::ResizeAll);
        self.commit(&mut effects);
        effects
    }

    fn close_live_panes(&mut self) -> Vec<Effect> {
        self.live.panes.drain(..).map(|p| close_effect(&p)).collect()
    }

    /// Freeze the outgoing tab: its snapshot is taken from live state and its panes are parked.
    fn freeze_active(&mut self) {
        let live = std::mem::take(&mut self.live);
        let tab = &mut self.tabs[self.active_tab];
        if tab.state == TabState::Ready {
            tab.snapshot = live.snapshot();
            tab.state = TabState::Archived;
        }
        tab.parked_panes = live.panes;
    }

    fn rehydrate(&mut self, index: usize) -> Vec<Effect> {
        self.active_tab = index;
        let tab = &mut self.tabs[index];
        let parked = std::mem::take(&mut tab.parked_panes);

        let Some(snapshot) = tab.snapshot.clone() else {
            self.live = LiveTab::default();
            return parked.iter().map(close_effect).collect();
        };

        tab.state = TabState::Ready;
        let (live, effects) = LiveTab::from_snapshot(&snapshot, parked, self.pane_limit);
        self.live = live;
        effects
    }

    /// Record the active tab's snapshot and queue it for persistence.
    fn commit(&mut self, effects: &mut Vec<Effect>) {
        if let Some(snapshot) = self.live.snapshot() {
            self.tabs[self.active_tab].snapshot = Some(snapshot.clone());
            effects.push(Effect::Persist(snapshot));
        }
    }

    pub fn panes(&self) -> &[Pane] {
        &self.live.panes
    }

    pub fn active_pane_id(&self) -> Option<&str> {
        self.live.active_id.as_deref()
    }

    pub fn active_pane(&self) -> Option<&Pane> {
        self.live.active_index().map(|i| &self.live.panes[i])
    }

    pub fn grid(&self) -> GridDims {
        resolve_grid(self.live.panes.len(), self.live.orientation, self.live.pinned)
    }

    pub fn orientation(&self) -> SplitOrientation {
        self.live.orientation
    }

    pub fn pinned_layout(&self) -> Option<&'static GridLayout> {
        self.live.pinned
    }

    pub fn project_path(&self) -> Option<&Path> {
        self.live.project_path.as_deref()
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active_tab_index(&self) -> usize {
        self.active_tab
    }

    pub fn active_tab(&self) -> &Tab {
        &self.tabs[self.active_tab]
    }

    pub fn snapshot(&self) -> Option<Snapshot> {
        self.live.snapshot()
    }

    fn all_panes(&self) -> impl Iterator<Item = &Pane> {
        self.live
            .panes
            .iter()
            .chain(self.tabs.iter().flat_map(|t| t.parked_panes.iter()))
    }

    fn all_panes_mut(&mut self) -> impl Iterator<Item = &mut Pane> {
        self.live
            .panes
            .iter_mut()
            .chain(self.tabs.iter_mut().flat_map(|t| t.parked_panes.iter_mut()))
    }

    /// Any pane, on screen or parked in an archived tab.
    pub fn pane(&self, pane_id: &str) -> Option<&Pane> {
        self.all_panes().find(|p| p.id == pane_id)
    }

    pub fn pane_by_session(&self, session_id: &str) -> Option<&Pane> {
        self.all_panes().find(|p| p.session_id == session_id)
    }

    pub fn mark_running(&mut self, pane_id: &str) -> bool {
        self.with_pane(pane_id, Pane::mark_running)
    }

    pub fn mark_failed(&mut self, pane_id: &str) -> bool {
        self.with_pane(pane_id, Pane::mark_failed)
    }

    pub fn mark_exited(&mut self, session_id: &str) -> bool {
        match self.all_panes_mut().find(|p| p.session_id == session_id) {
            Some(pane) => {
                pane.mark_exited();
                true
            }
            None => false,
        }
    }

    pub fn take_startup_command(&mut self, pane_id: &str) -> Option<String> {
        self.all_panes_mut()
            .find(|p| p.id == pane_id)
            .and_then(Pane::take_startup_command)
    }

    fn with_pane(&mut self, pane_id: &str, update: impl FnOnce(&mut Pane)) -> bool {
        match self.all_panes_mut().find(|p| p.id == pane_id) {
            Some(pane) => {
                update(pane);
                true
            }
            None => false,
        }
    }
}
