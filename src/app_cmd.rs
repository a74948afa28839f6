//! `app` and `session` commands: one runtime interaction per invocation.
//!
//! The current page and search query of each app are kept in the workspace
//! session file, so consecutive invocations behave like one sitting.

use anyhow::{Result, bail};
use log::info;
use serde_json::Value as JsonValue;

use crate::{
    Workspace,
    cli::{AppAction, AppArgs, SessionCommand},
    error::AppError,
    layout::{MAIN_PAGE_KEY, managed_page_key},
    render,
    runtime::{AppRuntime, Page},
    session::{self, FileSession, SessionContext},
};

pub fn execute(workspace: &Workspace, args: &AppArgs) -> Result<()> {
    workspace.app(&args.app)?;
    let session = FileSession::new(&workspace.dir);
    let mut runtime = match AppRuntime::open(
        &workspace.store,
        &workspace.store,
        &args.app,
        workspace.settings.runtime.clone(),
    ) {
        Ok(runtime) => runtime,
        Err(AppError::SpecNotFound(_)) => {
            println!("'{}' has not been generated yet. Run `generate` first.", args.app);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    restore(&mut runtime, &session, &args.app)?;
    if let Some(page) = args.page {
        runtime.go_to_page(page.saturating_sub(1))?;
    }

    let outcome = apply(&mut runtime, &session, &args.app, args.action.as_ref());
    print!("{}", render::render_runtime(&runtime));
    outcome
}

fn restore(runtime: &mut AppRuntime<'_>, session: &dyn SessionContext, app: &str) -> Result<()> {
    if let Some(page) = session::read_string(session, &session::page_key(app))? {
        runtime.select_page(&page);
    }
    if let Some(query) = session::read_string(session, &session::query_key(app))?
        && !query.is_empty()
    {
        runtime.search(&query)?;
    }
    Ok(())
}

fn remember_page(session: &dyn SessionContext, app: &str, key: &str) -> Result<()> {
    session.write(&session::page_key(app), JsonValue::String(key.to_string()))?;
    Ok(())
}

/// Full id, or the one record on the loaded page whose id starts with `prefix`.
fn resolve_id(runtime: &AppRuntime<'_>, prefix: &str) -> Result<String> {
    let matches = runtime
        .records()
        .iter()
        .filter(|r| r.id.starts_with(prefix))
        .map(|r| r.id.clone())
        .collect::<Vec<_>>();
    match matches.as_slice() {
        [id] => Ok(id.clone()),
        [] => Ok(prefix.to_string()),
        _ => bail!("Id prefix '{prefix}' matches {} records", matches.len()),
    }
}

fn apply(
    runtime: &mut AppRuntime<'_>,
    session: &dyn SessionContext,
    app: &str,
    action: Option<&AppAction>,
) -> Result<()> {
    match action {
        None | Some(AppAction::View) => {}
        Some(AppAction::Nav { key }) => {
            if let Page::Unavailable(_) = runtime.select_page(key)
                && !runtime.navigator().is_known(key)
            {
                bail!("'{key}' is not a page of this app");
            }
            remember_page(session, app, runtime.navigator().current())?;
        }
        Some(AppAction::Search { query }) => {
            runtime.search(query)?;
            runtime.select_page(MAIN_PAGE_KEY);
            remember_page(session, app, MAIN_PAGE_KEY)?;
            if query.trim().is_empty() {
                session.remove(&session::query_key(app))?;
            } else {
                session.write(&session::query_key(app), JsonValue::String(query.clone()))?;
            }
        }
        Some(AppAction::Managed { column }) => {
            let key = managed_page_key(column);
            if !runtime.navigator().is_known(&key) {
                bail!("'{column}' is not a managed column of this app");
            }
            runtime.select_page(&key);
            remember_page(session, app, &key)?;
        }
        Some(AppAction::Add { values }) => {
            runtime.open_create();
            for (key, value) in values {
                runtime.set_field(key, value)?;
            }
            let record = runtime.save()?;
            info!("Created record {}", record.id);
        }
        Some(AppAction::Edit { id, values }) => {
            let id = resolve_id(runtime, id)?;
            runtime.open_edit(&id)?;
            for (key, value) in values {
                runtime.set_field(key, value)?;
            }
            let record = runtime.save()?;
            info!("Updated record {}", record.id);
        }
        Some(AppAction::Delete { id, yes }) => {
            let id = resolve_id(runtime, id)?;
            runtime.request_delete(&id)?;
            if *yes {
                runtime.confirm_delete()?;
                info!("Deleted record {id}");
            } else {
                println!("Re-run with --yes to delete record {id}.");
                runtime.cancel_delete();
            }
        }
    }
    Ok(())
}

pub fn execute_session(workspace: &Workspace, command: &SessionCommand) -> Result<()> {
    match command {
        SessionCommand::Clear => {
            let session = FileSession::new(&workspace.dir);
            session.clear()?;
            info!("Cleared session state in {:?}", workspace.dir);
            Ok(())
        }
    }
}
