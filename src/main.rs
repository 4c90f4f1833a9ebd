mod api;
mod auth;
mod cli;
mod config;
mod engine;
mod error;
mod logging;
mod state_machine;
mod store;
mod ui;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;

use api::AppState;
use cli::{Cli, Command};
use config::WasteflowConfig;
use engine::{ProcessEngine, ProcessFilter};
use state_machine::NewProcess;
use store::{FileStore, MemoryStore, ProcessStore};
use ui::ProcessView;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = WasteflowConfig::load(cli.config.as_deref())?;
    logging::init(&config.log_level, config.log_format, cli.verbose)?;
    debug!(?config, "configuration loaded");

    let caller = cli.as_caller();
    let view = ProcessView::default();

    if let Command::Serve { bind, memory } = &cli.command {
        let store: Arc<dyn ProcessStore> = if *memory {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(FileStore::open(&config.data_path)?)
        };
        let addr = match bind {
            Some(bind) => bind
                .parse()
                .with_context(|| format!("invalid bind address '{bind}'"))?,
            None => config.socket_addr()?,
        };
        let state = AppState {
            engine: ProcessEngine::new(store),
            default_speed_factor: config.default_speed_factor,
        };
        return api::serve(state, addr).await;
    }

    let engine = ProcessEngine::new(Arc::new(FileStore::open(&config.data_path)?));

    let changed = match cli.command {
        Command::Serve { .. } => return Ok(()),
        Command::List { status, search } => {
            let filter = ProcessFilter {
                search,
                status: status.map(Into::into),
            };
            let processes = engine.list(&filter)?;
            if cli.json {
                view.print_json(&processes)?;
            } else {
                view.print_table(&processes);
            }
            return Ok(());
        }
        Command::Stats => {
            let stats = engine.stats()?;
            if cli.json {
                view.print_json(&stats)?;
            } else {
                view.print_stats(&stats);
            }
            return Ok(());
        }
        Command::Delete { id } => {
            if !engine.delete(&caller, &id)? {
                anyhow::bail!("process {id} not found");
            }
            if !cli.json {
                view.print_message(&format!("Deleted process {id}"));
            }
            return Ok(());
        }
        Command::Show { id } => engine.get(&id)?,
        Command::Create {
            name,
            description,
            process_type,
            duration,
        } => engine.create(
            &caller,
            NewProcess {
                name,
                description,
                process_type: process_type.into(),
                estimated_duration: duration,
            },
        )?,
        Command::Update { id, fields } => engine.update(&caller, &id, fields.into_patch())?,
        Command::Start { id } => engine.start(&caller, &id)?,
        Command::Pause { id } => engine.pause(&caller, &id)?,
        Command::Resume { id } => engine.resume(&caller, &id)?,
        Command::Stop { id } => engine.stop(&caller, &id)?,
        Command::Fix { id } => engine.fix(&caller, &id)?,
        Command::Complete { id } => engine.mark_completed(&caller, &id)?,
        Command::ForceStop { id, reason } => engine.force_stop(&caller, &id, reason)?,
        Command::Boost { id, factor } => {
            engine.speed_boost(&caller, &id, factor.unwrap_or(config.default_speed_factor))?
        }
    };

    if cli.json {
        view.print_json(&changed)?;
    } else {
        view.print_detail(&changed);
    }
    Ok(())
}
