use std::io;
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::NaiveDateTime;
use tracing::{debug, info, instrument, warn};

use crate::auth::{AuthClient, TokenStore};
use crate::cli::{Command, PASSWORD_CONFIRM_ENV, PASSWORD_ENV};
use crate::config::{Config, StoreKind};
use crate::datetime::{default_deadline, local_now, parse_day, parse_deadline, parse_month};
use crate::render::{TerminalPresenter, short_id};
use crate::store::{LocalStore, RemoteStore, TaskStore};
use crate::task::{NewTask, TaskId, TaskPatch};
use crate::view::{NavigationState, ViewController};

type Controller<'a> = ViewController<'a, dyn TaskStore, TerminalPresenter<io::Stdout>>;

#[instrument(skip(cfg, data_dir, command), fields(command = command.name()))]
pub async fn dispatch(cfg: &Config, data_dir: &Path, command: Command) -> anyhow::Result<()> {
    debug!("dispatching command");

    match command {
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Logout => cmd_logout(data_dir),
        Command::Login { email, password } => cmd_login(cfg, data_dir, &email, password).await,
        Command::Register {
            name,
            email,
            password,
            confirm_password,
        } => cmd_register(cfg, data_dir, &name, &email, password, confirm_password).await,
        view_command => {
            let mut store = open_store(cfg, data_dir)?;
            let target = match &view_command {
                Command::Edit { id, .. } | Command::Done { id } | Command::Delete { id } => {
                    Some(resolve_task_id(store.as_ref(), id).await?)
                }
                _ => None,
            };

            let state = NavigationState::load(data_dir).context("failed to read saved view")?;
            let presenter = TerminalPresenter::stdout(cfg)?;
            let mut controller = ViewController::new(store.as_mut(), presenter, state);

            run_view_command(&mut controller, view_command, target).await?;

            controller
                .state()
                .save(data_dir)
                .context("failed to save view")?;
            info!("done");
            Ok(())
        }
    }
}

/// Opens the store selected by the `store` setting.
#[instrument(skip(cfg, data_dir))]
pub fn open_store(cfg: &Config, data_dir: &Path) -> anyhow::Result<Box<dyn TaskStore>> {
    match cfg.store_kind()? {
        StoreKind::Local => {
            let store = LocalStore::open(data_dir).with_context(|| {
                format!("failed to open task store at {}", data_dir.display())
            })?;
            Ok(Box::new(store))
        }
        StoreKind::Remote => {
            let token = TokenStore::new(data_dir).require()?;
            let url = cfg.remote_url()?;
            info!(url = %url, "using remote store");
            let store = RemoteStore::with_timeout(url, token, cfg.remote_timeout()?)?;
            Ok(Box::new(store))
        }
    }
}

/// Exact id, or the only id that starts with `raw`. Unknown ids are passed
/// through so the store reports them.
pub async fn resolve_task_id(store: &dyn TaskStore, raw: &str) -> anyhow::Result<TaskId> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(anyhow!("task id cannot be empty"));
    }

    let tasks = store.list_tasks().await?;
    if let Some(task) = tasks.iter().find(|task| task.id.as_str() == raw) {
        return Ok(task.id.clone());
    }

    let mut matches = tasks
        .iter()
        .filter(|task| task.id.as_str().starts_with(raw));
    let Some(first) = matches.next() else {
        return Ok(TaskId::new(raw));
    };
    if matches.next().is_some() {
        return Err(anyhow!("ambiguous task id: {raw}"));
    }
    debug!(prefix = raw, task_id = %first.id, "resolved id prefix");
    Ok(first.id.clone())
}

async fn run_view_command(
    controller: &mut Controller<'_>,
    command: Command,
    target: Option<TaskId>,
) -> anyhow::Result<()> {
    let now = local_now();

    match (command, target) {
        (Command::Show, _) => controller.on_tasks_changed().await,
        (
            Command::Add {
                title,
                description,
                due,
            },
            _,
        ) => cmd_add(controller, &title.join(" "), description.as_deref(), due.as_deref(), now).await,
        (
            Command::Edit {
                title,
                description,
                due,
                ..
            },
            Some(id),
        ) => {
            let deadline = due
                .as_deref()
                .map(|expr| parse_deadline(expr, now))
                .transpose()?;
            let patch = TaskPatch {
                title,
                description,
                deadline,
            };
            cmd_edit(controller, &id, patch).await
        }
        (Command::Done { .. }, Some(id)) => cmd_done(controller, &id).await,
        (Command::Delete { .. }, Some(id)) => cmd_delete(controller, &id).await,
        (Command::Next, _) => controller.navigate_month(1).await,
        (Command::Prev, _) => controller.navigate_month(-1).await,
        (Command::Select { day }, _) => controller.select_date(parse_day(&day, now)?).await,
        (Command::Month { month }, _) => controller.select_date(parse_month(&month)?).await,
        (Command::Today, _) => controller.clear_selection().await,
        (other, _) => Err(anyhow!("command {} needs a task id", other.name())),
    }
}

#[instrument(skip(controller, description, due, now))]
async fn cmd_add(
    controller: &mut Controller<'_>,
    title: &str,
    description: Option<&str>,
    due: Option<&str>,
    now: NaiveDateTime,
) -> anyhow::Result<()> {
    info!("command add");

    let deadline = match due {
        Some(expr) => parse_deadline(expr, now)?,
        None => default_deadline(now),
    };
    let new = NewTask::new(title, description, deadline)?;
    let task = controller.add_task(new).await?;

    println!("Created task {}.", short_id(task.id.as_str()));
    Ok(())
}

#[instrument(skip(controller, patch), fields(task_id = %id))]
async fn cmd_edit(controller: &mut Controller<'_>, id: &TaskId, patch: TaskPatch) -> anyhow::Result<()> {
    info!("command edit");

    if patch.is_empty() {
        return Err(anyhow!("nothing to change: pass --title, --description or --due"));
    }
    let task = controller.update_task(id, patch).await?;

    println!("Modified task {}.", short_id(task.id.as_str()));
    Ok(())
}

#[instrument(skip(controller), fields(task_id = %id))]
async fn cmd_done(controller: &mut Controller<'_>, id: &TaskId) -> anyhow::Result<()> {
    info!("command done");

    let task = controller.toggle_task_complete(id).await?;
    if task.completed {
        println!("Completed task {}.", short_id(task.id.as_str()));
    } else {
        println!("Reopened task {}.", short_id(task.id.as_str()));
    }
    Ok(())
}

#[instrument(skip(controller), fields(task_id = %id))]
async fn cmd_delete(controller: &mut Controller<'_>, id: &TaskId) -> anyhow::Result<()> {
    info!("command delete");

    controller.delete_task(id).await?;
    println!("Deleted task {}.", short_id(id.as_str()));
    Ok(())
}

#[instrument(skip(cfg, data_dir, password))]
async fn cmd_login(
    cfg: &Config,
    data_dir: &Path,
    email: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    info!("command login");
    warn_if_local(cfg)?;

    let password = require_password(password, PASSWORD_ENV, "--password")?;
    let client = AuthClient::new(cfg.remote_url()?, cfg.remote_timeout()?)?;
    let token = client.login(email, &password).await.context("login failed")?;

    TokenStore::new(data_dir)
        .save(&token)
        .context("failed to save session token")?;
    println!("Logged in as {email}.");
    Ok(())
}

#[instrument(skip(cfg, data_dir, password, confirmation))]
async fn cmd_register(
    cfg: &Config,
    data_dir: &Path,
    name: &str,
    email: &str,
    password: Option<String>,
    confirmation: Option<String>,
) -> anyhow::Result<()> {
    info!("command register");
    warn_if_local(cfg)?;

    let password = require_password(password, PASSWORD_ENV, "--password")?;
    let confirmation =
        require_password(confirmation, PASSWORD_CONFIRM_ENV, "--confirm-password")?;
    let client = AuthClient::new(cfg.remote_url()?, cfg.remote_timeout()?)?;
    let token = client
        .register(name, email, &password, &confirmation)
        .await
        .context("registration failed")?;

    TokenStore::new(data_dir)
        .save(&token)
        .context("failed to save session token")?;
    println!("Registered and logged in as {email}.");
    Ok(())
}

#[instrument(skip(data_dir))]
fn cmd_logout(data_dir: &Path) -> anyhow::Result<()> {
    info!("command logout");

    if TokenStore::new(data_dir).clear()? {
        println!("Logged out.");
    } else {
        println!("Not logged in.");
    }
    Ok(())
}

fn require_password(value: Option<String>, env: &str, flag: &str) -> anyhow::Result<String> {
    value
        .filter(|password| !password.is_empty())
        .ok_or_else(|| anyhow!("password required: pass {flag} or set {env}"))
}

fn warn_if_local(cfg: &Config) -> anyhow::Result<()> {
    if cfg.store_kind()? == StoreKind::Local {
        warn!("store is set to local; the session token is only used with store=remote");
    }
    Ok(())
}
