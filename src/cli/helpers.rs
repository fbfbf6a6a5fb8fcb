//! Shared helper functions for CLI commands
//!
//! Project/engine setup, ID resolution and list output live here so the
//! command modules only deal with their own arguments.

use chrono::{DateTime, Local, Utc};
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::io;
use std::path::Path;
use tabled::{builder::Builder, settings::Style};

use crate::catalog::ProjectCatalog;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::loader::find_by_id;
use crate::core::project::{CatalogKind, Project};
use crate::core::store::{SqliteStore, SubmissionStore};
use crate::core::Config;
use crate::engine::{Engine, EngineSettings};
use crate::entities::{EntityInstance, Submission};
use crate::schema::template::Generated;

/// An opened project with its merged configuration
pub struct Workspace {
    pub project: Project,
    pub config: Config,
}

impl Workspace {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project =
            Project::locate(global.project.as_deref()).map_err(|e| miette::miette!("{}", e))?;
        let config = Config::load_for(Some(&project));
        Ok(Self { project, config })
    }

    pub fn catalog(&self) -> ProjectCatalog<'_> {
        ProjectCatalog::new(&self.project)
    }

    pub fn store(&self) -> Result<SqliteStore> {
        SqliteStore::open(&self.project.database_path()).into_diagnostic()
    }

    /// Engine over the project's submission database and catalog files
    pub fn engine<'c>(&self, catalog: &'c ProjectCatalog<'_>) -> Result<Engine<'c, SqliteStore>> {
        Ok(Engine::with_catalog(self.store()?, catalog)
            .settings(EngineSettings::from_config(&self.config)))
    }
}

/// Write a freshly rendered catalog file, optionally opening it in the editor
pub fn save_generated(
    ws: &Workspace,
    kind: CatalogKind,
    path: &Path,
    generated: &Generated,
    edit: bool,
    global: &GlobalOpts,
) -> Result<()> {
    if path.exists() {
        return Err(miette::miette!("{} already exists", path.display()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).into_diagnostic()?;
    }
    std::fs::write(path, &generated.yaml).into_diagnostic()?;
    log::debug!("wrote {}", path.display());

    if global.format == OutputFormat::Id {
        println!("{}", generated.id);
    } else if !global.quiet {
        println!(
            "{} Created {} {}",
            style("✓").green(),
            kind,
            style(&generated.id).cyan()
        );
        println!("   {}", style(path.display()).dim());
    }

    if edit {
        let status = ws.config.run_editor(path).into_diagnostic()?;
        if !status.success() {
            return Err(miette::miette!("editor exited with {}", status));
        }
    }
    Ok(())
}

/// Resolve a submission by full ID or unique prefix
pub fn resolve_submission(store: &impl SubmissionStore, query: &str) -> Result<Submission> {
    let submissions = store.submissions().into_diagnostic()?;
    find_by_id(&submissions, query, |s| s.id.to_string())
        .cloned()
        .ok_or_else(|| miette::miette!("No submission found matching '{}'", query))
}

/// Resolve an instance by full ID or unique prefix, across all submissions
pub fn resolve_instance(store: &impl SubmissionStore, query: &str) -> Result<EntityInstance> {
    if let Ok(id) = query.parse() {
        if let Some(instance) = store.instance(&id).into_diagnostic()? {
            return Ok(instance);
        }
    }

    let mut instances = Vec::new();
    for submission in store.submissions().into_diagnostic()? {
        instances.extend(store.instances(&submission.id).into_diagnostic()?);
    }
    find_by_id(&instances, query, |i| i.id.to_string())
        .cloned()
        .ok_or_else(|| miette::miette!("No instance found matching '{}'", query))
}

/// Format a timestamp as a local date and time
pub fn format_date_local(at: &DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Print a single record as YAML (default) or JSON
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) -> Result<()> {
    match format.or(OutputFormat::Yaml) {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(record).into_diagnostic()?);
        }
        _ => {
            print!("{}", serde_yml::to_string(record).into_diagnostic()?);
        }
    }
    Ok(())
}

/// Column layout of a list command
pub struct Listing<'a, T> {
    pub noun: &'a str,
    pub columns: &'a [&'a str],
    pub row: &'a dyn Fn(&T) -> Vec<String>,
}

impl<T: Serialize> Listing<'_, T> {
    /// Print the records in the requested format; tables get a count line
    pub fn print(&self, records: &[T], global: &GlobalOpts) -> Result<()> {
        match global.format.or(OutputFormat::Tsv) {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(records).into_diagnostic()?);
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yml::to_string(records).into_diagnostic()?);
            }
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(io::stdout());
                writer.write_record(self.columns).into_diagnostic()?;
                for record in records {
                    writer.write_record((self.row)(record)).into_diagnostic()?;
                }
                writer.flush().into_diagnostic()?;
            }
            OutputFormat::Id => {
                for record in records {
                    if let Some(id) = (self.row)(record).into_iter().next() {
                        println!("{}", id);
                    }
                }
            }
            format @ (OutputFormat::Tsv | OutputFormat::Md | OutputFormat::Auto) => {
                if records.is_empty() {
                    println!("No {}s found.", self.noun);
                    return Ok(());
                }
                println!("{}", self.table(records, format == OutputFormat::Md));
                if !global.quiet {
                    println!();
                    println!("{} {}(s) found.", style(records.len()).cyan(), self.noun);
                }
            }
        }
        Ok(())
    }

    fn table(&self, records: &[T], markdown: bool) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.columns.iter().map(|c| c.to_uppercase()));
        for record in records {
            builder.push_record((self.row)(record));
        }
        let mut table = builder.build();
        if markdown {
            table.with(Style::markdown());
        } else {
            table.with(Style::blank());
        }
        table.to_string()
    }
}
