use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::{NaiveDate, NaiveDateTime};
use unicode_width::UnicodeWidthStr;

use crate::bucket::{ListContext, TaskSection};
use crate::calendar::{CalendarGrid, DayCell, GRID_COLUMNS, WEEKDAY_LABELS};
use crate::config::Config;
use crate::datetime::format_deadline;
use crate::task::Task;
use crate::view::Presenter;

const CELL_WIDTH: usize = 5;
const SHORT_ID_LEN: usize = 8;
const TASK_MARKER: &str = "•";

/// Plain-text presenter: the month grid followed by one table per list.
#[derive(Debug)]
pub struct TerminalPresenter<W: Write> {
    out: W,
    color: bool,
    selected: Option<NaiveDate>,
}

impl TerminalPresenter<io::Stdout> {
    pub fn stdout(cfg: &Config) -> anyhow::Result<Self> {
        let color = color_enabled(cfg)? && io::stdout().is_terminal();
        Ok(Self::new(io::stdout(), color))
    }
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            selected: None,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }

    fn cell_text(&self, cell: &DayCell) -> String {
        let (open, close) = if cell.is_selected { ("[", "]") } else { (" ", " ") };
        let marker = if cell.has_tasks { TASK_MARKER } else { " " };
        let text = format!("{open}{:>2}{close}{marker}", cell.day());

        if !cell.in_viewed_month() {
            self.paint(&text, "2")
        } else if cell.is_today {
            self.paint(&text, "1;32")
        } else if cell.is_selected {
            self.paint(&text, "1")
        } else {
            text
        }
    }

    fn section_heading(&self, section: TaskSection, count: usize) -> String {
        match (section, self.selected) {
            (TaskSection::SelectedDay, Some(day)) => {
                format!("{} ({}, {count})", section.title(), day.format("%Y-%m-%d"))
            }
            (TaskSection::SelectedDay, None) => format!("{} (none)", section.title()),
            _ => format!("{} ({count})", section.title()),
        }
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    #[tracing::instrument(skip(self, grid), fields(month = %grid.month().format("%Y-%m")))]
    fn render_calendar(&mut self, grid: &CalendarGrid) -> anyhow::Result<()> {
        self.selected = grid
            .cells()
            .iter()
            .find(|cell| cell.is_selected)
            .map(|cell| cell.date);

        let width = CELL_WIDTH * GRID_COLUMNS;
        let label = self.paint(grid.label(), "1");
        let padding = width.saturating_sub(UnicodeWidthStr::width(grid.label())) / 2;
        writeln!(self.out, "{}{label}", " ".repeat(padding))?;

        let header = WEEKDAY_LABELS
            .iter()
            .map(|name| format!("{name:^4} "))
            .collect::<String>();
        writeln!(self.out, "{}", header.trim_end())?;

        for row in grid.rows() {
            let line = row
                .iter()
                .map(|cell| self.cell_text(cell))
                .collect::<String>();
            writeln!(self.out, "{}", line.trim_end())?;
        }
        writeln!(self.out)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, tasks, now), fields(count = tasks.len()))]
    fn render_tasks(
        &mut self,
        section: TaskSection,
        tasks: &[&Task],
        context: ListContext,
        now: NaiveDateTime,
    ) -> anyhow::Result<()> {
        let heading = self.paint(&self.section_heading(section, tasks.len()), "1");
        writeln!(self.out, "{heading}")?;

        if tasks.is_empty() {
            writeln!(self.out, "  no tasks")?;
            writeln!(self.out)?;
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Done".to_string(),
            "Title".to_string(),
            "Description".to_string(),
            "Deadline".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for task in tasks {
            let mut row = vec![
                self.paint(short_id(task.id.as_str()), "33"),
                if task.completed { "[x]" } else { "[ ]" }.to_string(),
                if task.completed {
                    self.paint(&task.title, "9")
                } else {
                    task.title.clone()
                },
                task.description.clone().unwrap_or_default(),
                format_deadline(task.deadline),
            ];

            if context.marks_overdue(task, now) {
                row = row
                    .iter()
                    .map(|cell| self.paint(&strip_ansi(cell), "31"))
                    .collect();
            }
            rows.push(row);
        }

        write_table(&mut self.out, headers, rows)?;
        writeln!(self.out)?;
        Ok(())
    }
}

pub fn color_enabled(cfg: &Config) -> anyhow::Result<bool> {
    let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
    match color_cfg.to_ascii_lowercase().as_str() {
        "on" | "yes" | "true" | "1" => Ok(true),
        "off" | "no" | "false" | "0" => Ok(false),
        other => Err(anyhow!("invalid color setting: {other}")),
    }
}

/// Leading characters of an id, enough to pick it out in a list.
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(SHORT_ID_LEN) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    write!(writer, "  ")?;
    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    write!(writer, "  ")?;
    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        write!(writer, "  ")?;
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
