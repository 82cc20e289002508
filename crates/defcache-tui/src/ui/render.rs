use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use defcache_core::catalog::pretty_table_name;
use defcache_core::utils::{format_count, truncate_string};
use defcache_core::{DefinitionSummary, Lookup, Slot};

use crate::app::{App, AppState, Population, CELL_HEIGHT};

use super::styles;

const TITLE_HEIGHT: u16 = 2;
const STATUS_HEIGHT: u16 = 2;

fn layout(area: Rect) -> [Rect; 3] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(TITLE_HEIGHT),  // Title bar
            Constraint::Min(CELL_HEIGHT),      // Grid
            Constraint::Length(STATUS_HEIGHT), // Status bar
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2]]
}

/// Area the grid is drawn into for a given frame size
pub fn grid_area(area: Rect) -> Rect {
    layout(area)[1]
}

pub fn render(frame: &mut Frame, app: &App) {
    let [title, grid, status] = layout(frame.area());

    render_title_bar(frame, title);
    if app.total == 0 {
        render_empty(frame, app, grid);
    } else {
        render_grid(frame, app, grid);
    }
    render_status_bar(frame, app, status);

    if matches!(app.state, AppState::ShowingHelp) {
        render_help_overlay(frame);
    }
}

fn render_title_bar(frame: &mut Frame, area: Rect) {
    let title = "  Definitions";
    let help_hint = "[?] Help";

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            area.width
                .saturating_sub(title.len() as u16 + help_hint.len() as u16 + 2)
                as usize,
        )),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_empty(frame: &mut Frame, app: &App, area: Rect) {
    let message = match app.population {
        Population::Running {
            finished,
            total,
            ref current,
        } => {
            let mut text = format!("Loading tables... {}/{}", finished, total);
            if let Some(table) = current {
                text.push_str(&format!("  (fetching {})", table));
            }
            text
        }
        Population::Done { .. } => "No definitions stored. Check the log for errors.".to_string(),
    };

    let y = area.y + area.height / 2;
    let line_area = Rect::new(area.x, y.min(area.bottom().saturating_sub(1)), area.width, 1);
    frame.render_widget(
        Paragraph::new(Span::styled(message, styles::loading_style())).alignment(Alignment::Center),
        line_area,
    );
}

fn render_grid(frame: &mut Frame, app: &App, area: Rect) {
    let grid = app.layout;
    let cell_width = grid.cell_width(area.width);

    for view_row in 0..app.visible_rows {
        let row = app.first_row + view_row;
        for col in 0..grid.columns {
            if !grid.contains(row, col) {
                continue;
            }
            let Some((slot, lookup)) = app.cell(view_row, col) else {
                continue;
            };

            let cell_area = Rect::new(
                area.x + col as u16 * cell_width,
                area.y + view_row as u16 * CELL_HEIGHT,
                cell_width,
                CELL_HEIGHT,
            );

            let style = if grid.global_index(row, col) == app.selected {
                styles::selected_style()
            } else {
                styles::cell_style(row, col)
            };

            let text_width = cell_width.saturating_sub(2) as usize;
            let paragraph = Paragraph::new(cell_lines(&slot, &lookup, text_width)).style(style);
            frame.render_widget(paragraph, cell_area);
        }
    }
}

/// Two lines per cell: table and offset, then the definition name or load state
fn cell_lines(slot: &Slot, lookup: &Lookup, width: usize) -> Vec<Line<'static>> {
    let header = match slot {
        Slot::Record { table_name, offset } => {
            let name = pretty_table_name(table_name).unwrap_or(table_name);
            format!(" {} {}", name, offset)
        }
        Slot::Unknown => " unknown".to_string(),
    };

    let body = match lookup {
        Lookup::Pending => Span::styled(" loading...", styles::loading_style()),
        Lookup::Absent => Span::styled(
            truncate_string(" unable to load definition", width + 1),
            styles::error_style(),
        ),
        Lookup::Loaded(definition) => {
            let summary = DefinitionSummary::from_value(definition);
            Span::raw(format!(" {}", truncate_string(&summary.title(), width)))
        }
    };

    vec![
        Line::from(Span::styled(
            truncate_string(&header, width + 1),
            styles::highlight_style(),
        )),
        Line::from(body),
    ]
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let left = if let Some(ref message) = app.status_message {
        Span::styled(format!(" {}", message), styles::error_style())
    } else {
        match app.population {
            Population::Running { finished, total, .. } => Span::raw(format!(
                " Populating {}/{} tables",
                finished, total
            )),
            Population::Done { .. } => match app.slot_for(app.selected) {
                Slot::Record { table_name, offset } => {
                    let mut text = format!(" {} #{}", table_name, offset);
                    if let Some(ref age) = app.selected_age {
                        text.push_str(&format!("  cached {}", age));
                    }
                    if let Some(icon) = app.selected_icon_url() {
                        text.push_str(&format!("  {}", icon));
                    }
                    Span::raw(text)
                }
                Slot::Unknown => Span::raw(""),
            },
        }
    };

    let right = format!(
        "{} / {} definitions in {} tables ",
        format_count(if app.total == 0 { 0 } else { app.selected + 1 }),
        format_count(app.total),
        app.counts.iter().filter(|c| c.count > 0).count()
    );

    let padding = (area.width as usize).saturating_sub(left.content.chars().count() + right.len());
    let line = Line::from(vec![left, Span::raw(" ".repeat(padding)), Span::raw(right)]);

    frame.render_widget(Paragraph::new(line).style(styles::status_bar_style()), area);
}

fn render_help_overlay(frame: &mut Frame) {
    let keys = [
        ("Arrows / hjkl", "Move selection"),
        ("PgUp / PgDn", "Scroll a page"),
        ("Home / End", "First / last definition"),
        ("[ / ]", "Previous / next table"),
        ("?", "Toggle help"),
        ("q / Ctrl+C", "Quit"),
    ];

    let lines: Vec<Line> = keys
        .iter()
        .map(|(key, desc)| {
            Line::from(vec![
                Span::styled(format!("  {:<16}", key), styles::help_key_style()),
                Span::styled(*desc, styles::help_desc_style()),
            ])
        })
        .collect();

    let area = centered_rect(50, lines.len() as u16 + 2, frame.area());
    let block = Block::default()
        .title(" Help ")
        .title_style(styles::title_style())
        .borders(Borders::ALL)
        .border_style(styles::muted_style());

    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_cell_lines_states() {
        let slot = Slot::record("DestinyInventoryItemDefinition", 12);

        let pending = cell_lines(&slot, &Lookup::Pending, 30);
        assert_eq!(text(&pending[0]), " InventoryItem 12");
        assert_eq!(text(&pending[1]), " loading...");

        let absent = cell_lines(&slot, &Lookup::Absent, 30);
        assert_eq!(text(&absent[1]), " unable to load definition");

        let loaded = cell_lines(
            &slot,
            &Lookup::Loaded(json!({"hash": 1, "displayProperties": {"name": "Thorn"}})),
            30,
        );
        assert_eq!(text(&loaded[1]), " Thorn");
    }

    #[test]
    fn test_grid_area_leaves_room_for_bars() {
        let area = grid_area(Rect::new(0, 0, 80, 24));
        assert_eq!(area.y, TITLE_HEIGHT);
        assert_eq!(area.height, 24 - TITLE_HEIGHT - STATUS_HEIGHT);
    }

    #[test]
    fn test_centered_rect_clamps() {
        let r = centered_rect(50, 10, Rect::new(0, 0, 20, 5));
        assert_eq!(r, Rect::new(0, 0, 20, 5));
    }
}
