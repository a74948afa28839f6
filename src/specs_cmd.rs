use anyhow::{Context, Result, bail};
use log::info;

use crate::{
    Workspace,
    cli::SpecsCommand,
    layout::diff_specs,
    render,
    store::{SpecStore, StoredSpec},
};

pub fn execute(workspace: &Workspace, command: &SpecsCommand) -> Result<()> {
    let store = &workspace.store;
    match command {
        SpecsCommand::List(args) => {
            workspace.app(&args.app)?;
            let versions = store.versions(&args.app)?;
            if versions.is_empty() {
                println!("'{}' has not been generated yet.", args.app);
            } else {
                print!("{}", render::render_spec_versions(&versions));
            }
            Ok(())
        }
        SpecsCommand::Show(args) => {
            let stored = match args.version {
                Some(version) => store.get(&args.app, version)?,
                None => store.active(&args.app)?,
            };
            println!("{}", stored.spec.to_pretty_json()?);
            info!(
                "Spec '{}' v{} ({}) fingerprint {}",
                stored.app,
                stored.version,
                stored.status.as_str(),
                stored.spec.fingerprint()?
            );
            Ok(())
        }
        SpecsCommand::Activate(args) => {
            let stored = store
                .activate(&args.app, args.version)
                .with_context(|| format!("Activating '{}' v{}", args.app, args.version))?;
            println!("{} v{} {}", stored.app, stored.version, stored.status.as_str());
            info!("Activated '{}' v{}", stored.app, stored.version);
            Ok(())
        }
        SpecsCommand::Diff(args) => {
            let versions = store.versions(&args.app)?;
            let (from, to) = diff_pair(&versions, args.from, args.to)?;
            let diff = diff_specs(&from.spec, &to.spec)?;
            if diff.is_empty() {
                println!("v{} and v{} are identical", from.version, to.version);
            } else {
                print!("{diff}");
            }
            Ok(())
        }
    }
}

/// Resolves the two versions to compare; defaults to the latest and the one before it.
fn diff_pair(
    versions: &[StoredSpec],
    from: Option<u32>,
    to: Option<u32>,
) -> Result<(StoredSpec, StoredSpec)> {
    let find = |version: u32| -> Result<StoredSpec> {
        match versions.iter().find(|s| s.version == version) {
            Some(stored) => Ok(stored.clone()),
            None => bail!("Version {version} does not exist"),
        }
    };
    let to = match to {
        Some(version) => find(version)?,
        None => match versions.last() {
            Some(stored) => stored.clone(),
            None => bail!("No spec versions to compare"),
        },
    };
    let from = match from {
        Some(version) => find(version)?,
        None => match versions.iter().rev().find(|s| s.version < to.version) {
            Some(stored) => stored.clone(),
            None => bail!("v{} has no earlier version to compare with", to.version),
        },
    };
    Ok((from, to))
}
