//! Navigation state and the controller that turns events into a fresh
//! calendar and task lists.

use std::path::Path;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bucket::{ListContext, TaskSection, bucket_tasks};
use crate::calendar::{CalendarGrid, build_month_grid};
use crate::datetime::{first_day_of_month, local_now, shift_months};
use crate::error::StoreResult;
use crate::store::TaskStore;
use crate::store::local::{read_json, write_json_atomic};
use crate::task::{NewTask, Task, TaskId, TaskPatch};

pub const VIEW_FILE: &str = "view.json";

const SECTIONS: [TaskSection; 3] = [
    TaskSection::Today,
    TaskSection::SelectedDay,
    TaskSection::Backlog,
];

/// Which day the user is looking at. The viewed month follows from it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    #[serde(default)]
    pub selected_date: Option<NaiveDate>,
}

impl NavigationState {
    pub fn selecting(date: NaiveDate) -> Self {
        Self {
            selected_date: Some(date),
        }
    }

    /// First day of the month of the selection, or of `today` when nothing
    /// is selected.
    pub fn viewed_month(&self, today: NaiveDate) -> NaiveDate {
        let reference = self.selected_date.unwrap_or(today);
        first_day_of_month(reference.year(), reference.month())
    }

    pub fn load(data_dir: &Path) -> StoreResult<Self> {
        Ok(read_json(&data_dir.join(VIEW_FILE))?.unwrap_or_default())
    }

    pub fn save(&self, data_dir: &Path) -> StoreResult<()> {
        write_json_atomic(&data_dir.join(VIEW_FILE), self)
    }
}

/// Receives the computed calendar and lists.
pub trait Presenter {
    fn render_calendar(&mut self, grid: &CalendarGrid) -> anyhow::Result<()>;

    fn render_tasks(
        &mut self,
        section: TaskSection,
        tasks: &[&Task],
        context: ListContext,
        now: NaiveDateTime,
    ) -> anyhow::Result<()>;
}

/// Owns the navigation state and recomputes the view after every event.
///
/// State only moves forward once the store has answered and the presenter
/// has accepted the new view; any failure leaves it where it was.
pub struct ViewController<'a, S, P>
where
    S: TaskStore + ?Sized,
    P: Presenter,
{
    store: &'a mut S,
    presenter: P,
    state: NavigationState,
    clock: fn() -> NaiveDateTime,
}

impl<'a, S, P> ViewController<'a, S, P>
where
    S: TaskStore + ?Sized,
    P: Presenter,
{
    pub fn new(store: &'a mut S, presenter: P, state: NavigationState) -> Self {
        Self {
            store,
            presenter,
            state,
            clock: local_now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    pub fn viewed_month(&self) -> NaiveDate {
        self.state.viewed_month((self.clock)().date())
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn into_presenter(self) -> P {
        self.presenter
    }

    /// Moves the view by `delta` months and selects day 1 of the target.
    #[tracing::instrument(skip(self))]
    pub async fn navigate_month(&mut self, delta: i32) -> anyhow::Result<()> {
        let target = shift_months(self.viewed_month(), delta);
        info!(month = %target.format("%Y-%m"), "navigating");
        self.recompute(NavigationState::selecting(target)).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn select_date(&mut self, date: NaiveDate) -> anyhow::Result<()> {
        self.recompute(NavigationState::selecting(date)).await
    }

    /// Drops the selection so the view follows the current month again.
    pub async fn clear_selection(&mut self) -> anyhow::Result<()> {
        self.recompute(NavigationState::default()).await
    }

    pub async fn on_tasks_changed(&mut self) -> anyhow::Result<()> {
        self.recompute(self.state).await
    }

    pub async fn add_task(&mut self, new: NewTask) -> anyhow::Result<Task> {
        let task = self.store.create_task(new).await?;
        self.refresh_after_change().await;
        Ok(task)
    }

    pub async fn update_task(&mut self, id: &TaskId, patch: TaskPatch) -> anyhow::Result<Task> {
        let task = self.store.update_task(id, patch).await?;
        self.refresh_after_change().await;
        Ok(task)
    }

    pub async fn delete_task(&mut self, id: &TaskId) -> anyhow::Result<()> {
        self.store.delete_task(id).await?;
        self.refresh_after_change().await;
        Ok(())
    }

    pub async fn toggle_task_complete(&mut self, id: &TaskId) -> anyhow::Result<Task> {
        let task = self.store.toggle_complete(id).await?;
        self.refresh_after_change().await;
        Ok(task)
    }

    /// Recomputes after a change the store already applied. A failure here
    /// is logged, not returned, so callers never see an error for a saved
    /// change.
    async fn refresh_after_change(&mut self) {
        if let Err(err) = self.on_tasks_changed().await {
            warn!(error = %format_args!("{err:#}"), "change saved, view not refreshed");
        }
    }

    #[tracing::instrument(skip(self), fields(store = self.store.kind()))]
    async fn recompute(&mut self, next: NavigationState) -> anyhow::Result<()> {
        let now = (self.clock)();
        let tasks = self.store.list_tasks().await?;

        let grid = build_month_grid(
            next.selected_date,
            now,
            next.selected_date,
            tasks.iter().map(|task| task.deadline),
        );
        let buckets = bucket_tasks(&tasks, now, next.selected_date);

        self.presenter.render_calendar(&grid)?;
        for section in SECTIONS {
            self.presenter
                .render_tasks(section, buckets.section(section), section.context(), now)?;
        }

        debug!(month = %grid.month().format("%Y-%m"), count = tasks.len(), "view recomputed");
        self.state = next;
        Ok(())
    }
}
