use crate::app::geometry::{grid_area, grid_cells};
use crate::app::Multiplexer;
use crate::config::{GridCommand, KeybindingConfig};
use crate::models::{Pane, PaneStatus, TabState};
use crate::tui::utils::{convert_vt100_to_lines, get_cursor_info, render_cursor};
use ratatui::{
    layout::{Alignment, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

pub fn draw(frame: &mut Frame, mux: &Multiplexer, keys: &KeybindingConfig) {
    let size = frame.area();
    let grid = grid_area(size.width, size.height);
    let status = Rect::new(0, grid.height, size.width, size.height - grid.height);

    if mux.workspace().active_tab().state == TabState::Uninitialized {
        render_empty_tab(frame, grid, keys);
    } else {
        render_grid(frame, grid, mux);
    }
    render_status_bar(frame, status, mux, keys);
}

fn render_grid(frame: &mut Frame, area: Rect, mux: &Multiplexer) {
    let workspace = mux.workspace();
    let panes = workspace.panes();
    let cells = grid_cells(area, workspace.grid(), panes.len());
    let active = workspace.active_pane_id();

    for (pane, cell) in panes.iter().zip(cells) {
        let is_active = active == Some(pane.id.as_str());
        render_pane(frame, cell, mux, pane, is_active);
    }
}

fn render_pane(frame: &mut Frame, area: Rect, mux: &Multiplexer, pane: &Pane, is_active: bool) {
    let working = mux.is_working(&pane.id);

    let border_style = match pane.status {
        PaneStatus::Failed => Style::default().fg(Color::Red),
        _ if is_active => Style::default().fg(Color::Cyan),
        _ => Style::default().fg(Color::DarkGray),
    };

    let mut title = vec![Span::raw(" ")];
    if working {
        title.push(Span::styled(
            "● ",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ));
    }
    let name_style = if is_active {
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Gray)
    };
    title.push(Span::styled(pane.display_name.clone(), name_style));
    if pane.status == PaneStatus::Exited {
        title.push(Span::styled(" [exited]", Style::default().fg(Color::DarkGray)));
    }
    title.push(Span::raw(" "));

    let block = Block::default()
        .title(Line::from(title))
        .borders(Borders::ALL)
        .border_style(border_style);
    let inner = block.inner(area);

    match (pane.status, mux.screen(&pane.id)) {
        (PaneStatus::Failed, _) => {
            let message = Paragraph::new(vec![
                Line::from(""),
                Line::from(Span::styled(
                    "  failed to start",
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
                )),
                Line::from(Span::styled(
                    "  close this pane to free its slot",
                    Style::default().fg(Color::Gray),
                )),
            ])
            .block(block);
            frame.render_widget(message, area);
        }
        (PaneStatus::Starting, _) | (_, None) => {
            let message = Paragraph::new(Line::from(Span::styled(
                "  starting…",
                Style::default().fg(Color::Gray),
            )))
            .block(block);
            frame.render_widget(message, area);
        }
        (_, Some(parser)) => {
            let screen = parser.screen();
            frame.render_widget(Paragraph::new(convert_vt100_to_lines(screen)).block(block), area);

            if is_active && pane.status == PaneStatus::Running {
                render_cursor(frame, inner, get_cursor_info(screen), false);
            }
        }
    }
}

fn render_empty_tab(frame: &mut Frame, area: Rect, keys: &KeybindingConfig) {
    let open_key = keys
        .key_for(GridCommand::NewTab)
        .unwrap_or_else(|| "the new tab key".to_string());

    let text = vec![
        Line::from(""),
        Line::from(Span::styled(
            "No project open",
            Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("Press ", Style::default().fg(Color::Gray)),
            Span::styled(open_key, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
            Span::styled(" to open the launch directory here", Style::default().fg(Color::Gray)),
        ]),
    ];

    let paragraph = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::DarkGray)));
    frame.render_widget(paragraph, area);
}

fn render_status_bar(frame: &mut Frame, area: Rect, mux: &Multiplexer, keys: &KeybindingConfig) {
    if area.height == 0 {
        return;
    }
    let workspace = mux.workspace();

    let mut left = Vec::new();
    for (idx, tab) in workspace.tabs().iter().enumerate() {
        let label = format!(" {}:{} ", idx + 1, tab.title);
        let style = if idx == workspace.active_tab_index() {
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        left.push(Span::styled(label, style));
    }

    if workspace.active_tab().is_ready() {
        let layout = match workspace.pinned_layout() {
            Some(layout) => format!(" {} pinned", layout.id),
            None => {
                let grid = workspace.grid();
                format!(" {}x{} {}", grid.rows, grid.cols, workspace.orientation().label())
            }
        };
        left.push(Span::styled(layout, Style::default().fg(Color::Magenta)));

        let busy = workspace.panes().iter().filter(|p| mux.is_working(&p.id)).count();
        if busy > 0 {
            left.push(Span::styled(
                format!("  ● {} working", busy),
                Style::default().fg(Color::Yellow),
            ));
        }
    }

    let right: Vec<Span> = [
        GridCommand::SplitHorizontal,
        GridCommand::SplitVertical,
        GridCommand::ClosePane,
        GridCommand::FocusNext,
        GridCommand::CycleLayout,
        GridCommand::Quit,
    ]
    .into_iter()
    .filter_map(|command| {
        keys.key_for(command)
            .map(|key| hint(&key, command.name().replace('_', " ")))
    })
    .flatten()
    .collect();

    let left_len: usize = left.iter().map(|s| s.content.chars().count()).sum();
    let right_len: usize = right.iter().map(|s| s.content.chars().count()).sum();
    let padding = (area.width as usize).saturating_sub(left_len + right_len + 1);

    let mut spans = left;
    spans.push(Span::raw(" ".repeat(padding)));
    spans.extend(right);

    let paragraph = Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));
    frame.render_widget(paragraph, area);
}

fn hint(key: &str, label: String) -> [Span<'static>; 2] {
    [
        Span::styled(
            format!(" {}", key),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!(" {}", label), Style::default().fg(Color::Gray)),
    ]
}
