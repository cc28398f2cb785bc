use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, Paragraph},
    Frame,
};

use crate::app::{App, Mode};
use crate::group::FlatItem;
use crate::session::{Status, Tool};

pub fn draw(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1), Constraint::Length(1)])
        .split(frame.area());

    let main_area = chunks[0];
    let banner_area = chunks[1];
    let help_area = chunks[2];

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(main_area);

    app.clamp_viewport(panels[0].height.saturating_sub(2) as usize);

    draw_tree(frame, app, panels[0]);
    draw_preview(frame, app, panels[1]);
    draw_banner(frame, app, banner_area);
    draw_help_bar(frame, app, help_area);

    match &app.mode {
        Mode::NewSessionName => draw_input_dialog(frame, " New session name ", &app.input),
        Mode::NewSessionTool => draw_tool_select(frame, app),
        Mode::NewGroupName { parent } => {
            let title = match parent {
                Some(parent) => format!(" New subgroup of {parent} "),
                None => String::from(" New group name "),
            };
            draw_input_dialog(frame, &title, &app.input);
        }
        Mode::RenameGroup { .. } => draw_input_dialog(frame, " Rename group ", &app.input),
        Mode::RenameSession { .. } => draw_input_dialog(frame, " Rename session ", &app.input),
        Mode::MoveSession => draw_group_select(frame, app),
        Mode::ConfirmDelete => draw_confirm_delete(frame, app),
        Mode::Browse | Mode::Attached => {}
    }
}

fn status_color(status: Status) -> Color {
    match status {
        Status::Active => Color::Green,
        Status::Waiting | Status::Error => Color::Yellow,
        Status::Idle => Color::DarkGray,
        Status::Inactive => Color::Red,
    }
}

fn draw_tree(frame: &mut Frame, app: &App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .flat
        .iter()
        .enumerate()
        .skip(app.scroll_offset)
        .take(height.max(1))
        .map(|(i, item)| {
            let selected = i == app.cursor;
            let marker = if selected { "> " } else { "  " };
            let indent = "  ".repeat(item.level());
            let base_style = if selected {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };
            let spans = match item {
                FlatItem::Group { path, .. } => {
                    let expanded = app.tree().get(path).map(|g| g.expanded).unwrap_or(true);
                    let arrow = if expanded { "▾ " } else { "▸ " };
                    let name = path.rsplit('/').next().unwrap_or(path);
                    let count = app
                        .tree()
                        .get(path)
                        .map(|g| g.sessions.len())
                        .unwrap_or(0);
                    vec![
                        Span::styled(marker, base_style),
                        Span::raw(indent),
                        Span::styled(
                            format!("{arrow}{name}"),
                            base_style.add_modifier(Modifier::BOLD),
                        ),
                        Span::styled(format!(" ({count})"), Style::default().fg(Color::DarkGray)),
                    ]
                }
                FlatItem::Session { session, .. } => vec![
                    Span::styled(marker, base_style),
                    Span::raw(indent),
                    Span::styled("● ", Style::default().fg(status_color(session.status()))),
                    Span::styled(
                        format!("{} [{}]", session.display_name(), session.tool()),
                        base_style,
                    ),
                ],
            };
            ListItem::new(Line::from(spans))
        })
        .collect();

    let title = " Agent Deck ";
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(list, area);
}

fn draw_preview(frame: &mut Frame, app: &App, area: Rect) {
    let (title, border) = if app.mode == Mode::Attached {
        (" Attached (Ctrl+Q to detach) ", Style::default().fg(Color::Green))
    } else {
        (" Preview ", Style::default().fg(Color::DarkGray))
    };

    // Show the tail of the capture that fits the pane.
    let inner_height = area.height.saturating_sub(2) as usize;
    let lines: Vec<&str> = app.preview.lines().collect();
    let start = lines.len().saturating_sub(inner_height);
    let visible = lines[start..].join("\n");

    let preview = Paragraph::new(visible).block(
        Block::default().borders(Borders::ALL).title(title).border_style(border),
    );
    frame.render_widget(preview, area);
}

/// Error banner when one is pending, group/session counts otherwise.
fn draw_banner(frame: &mut Frame, app: &App, area: Rect) {
    let line = match &app.status_message {
        Some(message) => Line::from(Span::styled(
            format!(" {message}"),
            Style::default().fg(Color::Black).bg(Color::Yellow),
        )),
        None => Line::from(Span::styled(
            format!(
                " {} groups · {} sessions",
                app.tree().group_count(),
                app.tree().session_count()
            ),
            Style::default().fg(Color::DarkGray),
        )),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_help_bar(frame: &mut Frame, app: &App, area: Rect) {
    let help = match app.mode {
        Mode::Attached => " Ctrl+Q detach · keys are forwarded to the session",
        _ => " n new · g group · Enter attach · d delete · m move · R rename · q quit",
    };
    let bar = Paragraph::new(Line::from(Span::styled(help, Style::default().fg(Color::DarkGray))));
    frame.render_widget(bar, area);
}

fn dialog_area(frame: &Frame, width: u16, height: u16) -> Rect {
    let area = frame.area();
    let x = area.width.saturating_sub(width) / 2;
    let y = area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}

fn draw_input_dialog(frame: &mut Frame, title: &str, input: &str) {
    let area = dialog_area(frame, 44, 3);
    frame.render_widget(Clear, area);
    let dialog = Paragraph::new(format!("{input}▏")).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(title)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(dialog, area);
}

fn draw_tool_select(frame: &mut Frame, app: &App) {
    let tools = Tool::all();
    let area = dialog_area(frame, 30, tools.len() as u16 + 2);
    frame.render_widget(Clear, area);

    let items: Vec<ListItem> = tools
        .iter()
        .enumerate()
        .map(|(i, tool)| {
            let style = if i == app.tool_selection {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(format!("  {tool}"), style))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Tool ")
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(list, area);
}

fn draw_group_select(frame: &mut Frame, app: &App) {
    let area = dialog_area(frame, 40, app.group_choices.len().max(1) as u16 + 2);
    frame.render_widget(Clear, area);

    let items: Vec<ListItem> = app
        .group_choices
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let style = if i == app.group_selection {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(Span::styled(format!("  {path}"), style))
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Move to group ")
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(list, area);
}

fn draw_confirm_delete(frame: &mut Frame, app: &App) {
    let target = match app.selected_item() {
        Some(FlatItem::Group { path, .. }) => format!("group '{path}'"),
        Some(FlatItem::Session { session, .. }) => {
            format!("session '{}'", session.display_name())
        }
        None => return,
    };
    let area = dialog_area(frame, 50, 3);
    frame.render_widget(Clear, area);
    let dialog = Paragraph::new(format!("Delete {target}? (y/N)")).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Confirm ")
            .border_style(Style::default().fg(Color::Red)),
    );
    frame.render_widget(dialog, area);
}
