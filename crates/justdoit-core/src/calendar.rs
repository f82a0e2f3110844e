//! Month grid shown next to the task lists.
//!
//! The grid is always six Sunday-first weeks so its height does not
//! change while paging through months.

use std::collections::BTreeSet;

use chrono::{
  Datelike,
  NaiveDate,
  NaiveDateTime
};
use serde::Serialize;

use crate::datetime::{
  add_days,
  first_day_of_month,
  last_day_of_month,
  month_label
};

pub const GRID_ROWS: usize = 6;
pub const GRID_COLUMNS: usize = 7;
pub const GRID_CELLS: usize =
  GRID_ROWS * GRID_COLUMNS;

pub const WEEKDAY_LABELS: [&str;
  GRID_COLUMNS] = [
  "Sun", "Mon", "Tue", "Wed", "Thu",
  "Fri", "Sat"
];

/// Which month a grid cell belongs to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MonthMembership {
  Previous,
  Current,
  Next
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
)]
pub struct DayCell {
  pub date:        NaiveDate,
  pub membership:  MonthMembership,
  pub is_today:    bool,
  pub has_tasks:   bool,
  pub is_selected: bool
}

impl DayCell {
  fn padding(
    date: NaiveDate,
    membership: MonthMembership
  ) -> Self {
    Self {
      date,
      membership,
      is_today: false,
      has_tasks: false,
      is_selected: false
    }
  }

  /// Day-of-month number shown in the cell.
  pub fn day(&self) -> u32 {
    self.date.day()
  }

  pub fn in_viewed_month(&self) -> bool {
    self.membership
      == MonthMembership::Current
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarGrid {
  month: NaiveDate,
  label: String,
  cells: Vec<DayCell>
}

impl CalendarGrid {
  /// First day of the viewed month.
  pub fn month(&self) -> NaiveDate {
    self.month
  }

  /// Upper-cased month heading, e.g. `OCTOBER 2024`.
  pub fn label(&self) -> &str {
    &self.label
  }

  pub fn cells(&self) -> &[DayCell] {
    &self.cells
  }

  pub fn rows(
    &self
  ) -> impl Iterator<Item = &[DayCell]>
  {
    self.cells.chunks(GRID_COLUMNS)
  }

  pub fn cell_for(
    &self,
    date: NaiveDate
  ) -> Option<&DayCell> {
    self
      .cells
      .iter()
      .find(|cell| cell.date == date)
  }
}

/// Lays out the month containing `reference` (or `today` when unset).
///
/// Only cells of the viewed month are classified; padding cells from
/// the neighbouring months never carry the today, has-tasks or selected
/// flags.
#[tracing::instrument(skip(deadlines))]
pub fn build_month_grid<I>(
  reference: Option<NaiveDate>,
  today: NaiveDateTime,
  selected: Option<NaiveDate>,
  deadlines: I
) -> CalendarGrid
where
  I: IntoIterator<Item = NaiveDateTime>
{
  let reference =
    reference.unwrap_or(today.date());
  let first = first_day_of_month(
    reference.year(),
    reference.month()
  );
  let last = last_day_of_month(
    reference.year(),
    reference.month()
  );
  let today = today.date();

  let busy_days = deadlines
    .into_iter()
    .map(|deadline| deadline.date())
    .filter(|day| {
      *day >= first && *day <= last
    })
    .collect::<BTreeSet<_>>();

  let mut cells =
    Vec::with_capacity(GRID_CELLS);

  let leading = first
    .weekday()
    .num_days_from_sunday()
    as i64;
  for offset in (1..=leading).rev() {
    cells.push(DayCell::padding(
      add_days(first, -offset),
      MonthMembership::Previous
    ));
  }

  for day in first.day()..=last.day() {
    let date = first
      .with_day(day)
      .unwrap_or(first);
    cells.push(DayCell {
      date,
      membership:
        MonthMembership::Current,
      is_today: date == today,
      has_tasks: busy_days
        .contains(&date),
      is_selected: selected
        == Some(date)
    });
  }

  let mut trailing = 0_i64;
  while cells.len() < GRID_CELLS {
    trailing += 1;
    cells.push(DayCell::padding(
      add_days(last, trailing),
      MonthMembership::Next
    ));
  }

  tracing::debug!(
    month = %first.format("%Y-%m"),
    leading,
    trailing,
    busy_days = busy_days.len(),
    "month grid built"
  );

  CalendarGrid {
    month: first,
    label: month_label(first),
    cells
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    NaiveDate,
    NaiveDateTime
  };

  use super::*;
  use crate::datetime::days_in_month;

  fn day(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  fn at(
    y: i32,
    m: u32,
    d: u32,
    h: u32,
    min: u32
  ) -> NaiveDateTime {
    day(y, m, d)
      .and_hms_opt(h, min, 0)
      .expect("valid time")
  }

  fn count(
    grid: &CalendarGrid,
    membership: MonthMembership
  ) -> usize {
    grid
      .cells()
      .iter()
      .filter(|cell| {
        cell.membership == membership
      })
      .count()
  }

  #[test]
  fn october_2024_layout() {
    let grid = build_month_grid(
      Some(day(2024, 10, 15)),
      at(2024, 10, 15, 14, 0),
      None,
      Vec::new()
    );

    assert_eq!(
      grid.label(),
      "OCTOBER 2024"
    );
    let rows =
      grid.rows().collect::<Vec<_>>();
    assert_eq!(rows.len(), GRID_ROWS);
    assert!(rows.iter().all(|row| {
      row.len() == GRID_COLUMNS
    }));

    let first_row = rows[0];
    assert_eq!(first_row[0].day(), 29);
    assert_eq!(first_row[1].day(), 30);
    assert_eq!(
      first_row[0].membership,
      MonthMembership::Previous
    );
    assert_eq!(first_row[2].day(), 1);
    assert!(first_row[2].in_viewed_month());

    assert!(rows[5].iter().all(|cell| {
      cell.membership
        == MonthMembership::Next
    }));
    assert_eq!(rows[5][0].day(), 3);
    assert_eq!(rows[5][6].day(), 9);
  }

  #[test]
  fn every_month_fills_exactly_42_cells()
  {
    let today = at(2024, 1, 1, 12, 0);
    for year in [1999, 2000, 2023, 2024, 2100]
    {
      for month in 1..=12 {
        let grid = build_month_grid(
          Some(day(year, month, 1)),
          today,
          None,
          Vec::new()
        );
        let days =
          days_in_month(year, month)
            as usize;

        assert_eq!(
          grid.cells().len(),
          GRID_CELLS
        );
        assert_eq!(
          count(
            &grid,
            MonthMembership::Current
          ),
          days
        );
        assert_eq!(
          count(
            &grid,
            MonthMembership::Previous
          ) + count(
            &grid,
            MonthMembership::Next
          ),
          GRID_CELLS - days
        );

        let leading = count(
          &grid,
          MonthMembership::Previous
        );
        assert_eq!(
          leading as u32,
          day(year, month, 1)
            .weekday()
            .num_days_from_sunday()
        );
        assert!(grid.cells().windows(2).all(
          |pair| {
            add_days(pair[0].date, 1)
              == pair[1].date
          }
        ));
      }
    }
  }

  #[test]
  fn month_starting_sunday_has_no_leading_padding(
  ) {
    // February 2015: starts on Sunday, 28 days
    let grid = build_month_grid(
      Some(day(2015, 2, 10)),
      at(2015, 2, 10, 9, 0),
      None,
      Vec::new()
    );
    assert_eq!(
      grid.cells()[0].date,
      day(2015, 2, 1)
    );
    assert_eq!(
      count(&grid, MonthMembership::Next),
      14
    );
    assert_eq!(
      grid.cells()[28].day(),
      1
    );
  }

  #[test]
  fn saturday_start_with_31_days_uses_sixth_row(
  ) {
    // March 2025 starts on Saturday
    let grid = build_month_grid(
      Some(day(2025, 3, 1)),
      at(2025, 3, 1, 9, 0),
      None,
      Vec::new()
    );
    let rows =
      grid.rows().collect::<Vec<_>>();
    assert_eq!(rows[0][6].day(), 1);
    assert_eq!(rows[5][1].day(), 31);
    assert!(rows[5][1].in_viewed_month());
    assert_eq!(
      rows[5][2].membership,
      MonthMembership::Next
    );
  }

  #[test]
  fn flags_use_calendar_day_equality() {
    let deadlines = vec![
      at(2024, 10, 3, 23, 59),
      at(2024, 10, 3, 0, 0),
      at(2024, 10, 20, 8, 0),
      at(2024, 11, 2, 8, 0),
    ];
    let grid = build_month_grid(
      None,
      at(2024, 10, 15, 14, 0),
      Some(day(2024, 10, 20)),
      deadlines
    );

    let busy = grid
      .cells()
      .iter()
      .filter(|cell| cell.has_tasks)
      .map(|cell| cell.date)
      .collect::<Vec<_>>();
    assert_eq!(
      busy,
      vec![
        day(2024, 10, 3),
        day(2024, 10, 20)
      ]
    );

    let today = grid
      .cell_for(day(2024, 10, 15))
      .expect("today cell");
    assert!(today.is_today);
    assert!(!today.has_tasks);

    let selected = grid
      .cell_for(day(2024, 10, 20))
      .expect("selected cell");
    assert!(selected.is_selected);
    assert!(selected.has_tasks);

    // Nov 2 is shown as padding and stays unflagged
    let padding = grid
      .cell_for(day(2024, 11, 2))
      .expect("padding cell");
    assert!(!padding.has_tasks);
  }

  #[test]
  fn unset_reference_uses_todays_month() {
    let grid = build_month_grid(
      None,
      at(2026, 10, 19, 8, 0),
      None,
      Vec::new()
    );
    assert_eq!(
      grid.month(),
      day(2026, 10, 1)
    );
    assert_eq!(
      grid.label(),
      "OCTOBER 2026"
    );
  }
}
