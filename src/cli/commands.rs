//! Command dispatch

use std::collections::HashSet;
use std::io;
use std::path::Path;

use clap::CommandFactory;
use clap_complete::generate;
use colored::Colorize;
use tracing::{debug, instrument};

use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::cli::picker::{run_picker, selection_json};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{
    CategoryForest, PickerConfig, PickerSession, SearchScope, SelectionMode, SelectionSink,
    SelectionValue,
};
use crate::infrastructure::di::ServiceContainer;
use crate::infrastructure::InfraError;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    let Some(command) = &cli.command else {
        return Err(CliError::Usage(
            "no command given, see `catpick --help`".into(),
        ));
    };
    if let Commands::Completion { shell } = command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let cwd = std::env::current_dir().map_err(|e| InfraError::io("current directory", e))?;
    let settings = Settings::load(Some(&cwd))?;
    let container = ServiceContainer::new(settings);

    match command {
        Commands::Tree { filter, all } => cmd_tree(&container, cli, filter.as_deref(), *all),
        Commands::Leaves => cmd_leaves(&container, cli),
        Commands::Search { query, all_text } => cmd_search(&container, cli, query, *all_text),
        Commands::Show { key } => cmd_show(&container, cli, key),
        Commands::Path { key } => cmd_path(&container, cli, key),
        Commands::Pick {
            multiple,
            policy,
            current,
        } => cmd_pick(&container, cli, *multiple, policy.as_deref(), current),
        Commands::Config { command } => cmd_config(&container, &cwd, command),
        Commands::Completion { .. } => Ok(()),
    }
}

fn load_forest(container: &ServiceContainer, cli: &Cli) -> CliResult<CategoryForest> {
    let path = container.catalog.source_path(cli.file.as_deref())?;
    Ok(container.catalog.load_forest(&path)?)
}

/// Session with the snapshot applied as its first fetch.
fn open_session(
    container: &ServiceContainer,
    cli: &Cli,
    config: PickerConfig,
    initial: SelectionValue,
    sink: impl SelectionSink + 'static,
) -> CliResult<PickerSession> {
    let path = container.catalog.source_path(cli.file.as_deref())?;
    let mut session = PickerSession::new(config, initial, sink);
    let ticket = session.begin_fetch();
    match container.catalog.load(&path) {
        Ok(records) => {
            session.complete_fetch(ticket, records);
            Ok(session)
        }
        Err(e) => {
            session.fail_fetch(ticket);
            Err(e.into())
        }
    }
}

#[instrument(level = "debug", skip(container, cli))]
fn cmd_tree(
    container: &ServiceContainer,
    cli: &Cli,
    filter: Option<&str>,
    all: bool,
) -> CliResult<()> {
    let mut config = container.settings.to_picker_config()?;
    config.expand_all = config.expand_all || all;
    let initial = SelectionValue::Single(None);
    let mut session = open_session(container, cli, config, initial, |_: SelectionValue| {})?;
    if session.forest().is_empty() {
        output::warning("no categories");
        return Ok(());
    }
    if let Some(query) = filter {
        session.set_filter(query);
    }
    let rows = session.rows();
    if rows.is_empty() {
        output::warning(&format!("no category matches '{}'", session.filter()));
        return Ok(());
    }
    let shown: HashSet<_> = rows.iter().map(|r| r.id).collect();
    output::info(&session.forest().to_tree_string("categories", Some(&shown)));
    Ok(())
}

fn cmd_leaves(container: &ServiceContainer, cli: &Cli) -> CliResult<()> {
    let forest = load_forest(container, cli)?;
    for id in forest.leaf_ids() {
        if let Some(record) = forest.record(id) {
            output::info(&format!("{:>6}  {}", id, record.display_label()));
        }
    }
    Ok(())
}

fn cmd_search(
    container: &ServiceContainer,
    cli: &Cli,
    query: &str,
    all_text: bool,
) -> CliResult<()> {
    let forest = load_forest(container, cli)?;
    let scope = if all_text {
        SearchScope::all_text()
    } else {
        container.settings.search_scope()?
    };
    let hits = container.catalog.search(&forest, query, scope);
    if hits.is_empty() {
        output::warning(&format!("no category matches '{query}'"));
        return Ok(());
    }
    for hit in hits {
        output::info(&format!("{:>6}  {}", hit.id, hit.label.bold()));
        output::detail(&hit.breadcrumb.dimmed());
    }
    Ok(())
}

fn cmd_show(container: &ServiceContainer, cli: &Cli, key: &str) -> CliResult<()> {
    let forest = load_forest(container, cli)?;
    let id = container.catalog.find(&forest, key)?;
    if let Some(card) = container.catalog.card(&forest, id) {
        output::header(&card.title);
        if !card.description.is_empty() {
            output::info(&card.description);
        }
        output::action("Includes  ", &panel(&card.includes));
        output::action("Excludes  ", &panel(&card.excludes));
        output::action("Borderline", &panel(&card.borderline));
    }
    Ok(())
}

fn panel(text: &str) -> &str {
    if text.is_empty() {
        "—"
    } else {
        text
    }
}

fn cmd_path(container: &ServiceContainer, cli: &Cli, key: &str) -> CliResult<()> {
    let forest = load_forest(container, cli)?;
    let id = container.catalog.find(&forest, key)?;
    output::info(&forest.breadcrumb(id));
    Ok(())
}

/// Terminal picker; prints the changed selection as JSON.
#[instrument(level = "debug", skip(container, cli))]
fn cmd_pick(
    container: &ServiceContainer,
    cli: &Cli,
    multiple: bool,
    policy: Option<&str>,
    current: &[i64],
) -> CliResult<()> {
    let mut config = container.settings.to_picker_config()?;
    if multiple {
        config.mode = SelectionMode::Multiple;
    }
    if let Some(policy) = policy {
        config.policy = policy.parse().map_err(CliError::InvalidArgs)?;
    }
    let initial = match config.mode {
        SelectionMode::Single if current.len() > 1 => {
            return Err(CliError::InvalidArgs(
                "--current takes a single id without --multiple".into(),
            ))
        }
        SelectionMode::Single => SelectionValue::Single(current.first().copied()),
        SelectionMode::Multiple => SelectionValue::Multiple(current.to_vec()),
    };

    let sink = |value: SelectionValue| debug!("pick: selection now {:?}", value);
    let mut session = open_session(container, cli, config, initial, sink)?;
    if session.forest().is_empty() {
        output::warning("no categories");
        return Ok(());
    }

    match run_picker(container.selector.as_ref(), &mut session)? {
        Some(value) => output::info(&selection_json(&value)?),
        None => output::warning("selection unchanged"),
    }
    Ok(())
}

fn cmd_config(container: &ServiceContainer, cwd: &Path, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            output::info(&container.settings.to_toml()?);
            Ok(())
        }
        ConfigCommands::Init { global } => {
            let path = if *global {
                global_config_path().ok_or_else(|| {
                    CliError::Usage("cannot determine global config directory".into())
                })?
            } else {
                local_config_path(cwd)
            };
            if container.fs.exists(&path) {
                return Err(CliError::Usage(format!(
                    "config already exists: {}",
                    path.display()
                )));
            }
            container
                .fs
                .ensure_parent(&path)
                .map_err(|e| InfraError::io(format!("create {}", path.display()), e))?;
            container
                .fs
                .write(&path, &Settings::template())
                .map_err(|e| InfraError::io(format!("write {}", path.display()), e))?;
            output::success(&format!("created {}", path.display()));
            Ok(())
        }
        ConfigCommands::Path => {
            let mark = |p: &Path| {
                if container.fs.exists(p) {
                    "(exists)".green()
                } else {
                    "(not found)".dimmed()
                }
            };
            match global_config_path() {
                Some(global) => {
                    output::action("global", &format!("{} {}", global.display(), mark(&global)))
                }
                None => output::action("global", &"unavailable".dimmed()),
            }
            let local = local_config_path(cwd);
            output::action("local ", &format!("{} {}", local.display(), mark(&local)));
            Ok(())
        }
    }
}
