//! `fct form` command - Form versions

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::catalog::TemplateCatalog;
use crate::cli::helpers::{print_record, save_generated, truncate_str, Listing, Workspace};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::loader::find_by_id;
use crate::core::project::{CatalogKind, FILE_SUFFIX};
use crate::entities::form::IssueLevel;
use crate::entities::FormVersion;
use crate::schema::template::{TemplateContext, TemplateGenerator};

#[derive(Subcommand, Debug)]
pub enum FormCommands {
    /// Create a new form version from the starter template
    New(NewArgs),

    /// List form versions
    List,

    /// Show a form version
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Form title (prompted for if omitted)
    #[arg(long, short = 't')]
    pub title: Option<String>,

    /// Version number of this form
    #[arg(long, default_value_t = 1)]
    pub version_number: u32,

    /// Unit of the per-asset reading (e.g. "MΩ")
    #[arg(long)]
    pub unit: Option<String>,

    /// Lowest passing reading
    #[arg(long)]
    pub pass_threshold: Option<f64>,

    /// Highest passing reading
    #[arg(long)]
    pub fail_threshold: Option<f64>,

    /// Open in editor after creation
    #[arg(long, short = 'e')]
    pub edit: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Form version ID (or unique prefix)
    pub id: String,
}

pub fn run(cmd: FormCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        FormCommands::New(args) => run_new(args, global),
        FormCommands::List => run_list(global),
        FormCommands::Show(args) => run_show(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;

    let title = match args.title {
        Some(title) => title,
        None => dialoguer::Input::<String>::new()
            .with_prompt("Form title")
            .interact_text()
            .into_diagnostic()?,
    };

    let mut ctx = TemplateContext::new(ws.config.author())
        .with_title(title)
        .with_version_number(args.version_number)
        .with_band(args.pass_threshold, args.fail_threshold);
    if let Some(unit) = args.unit {
        ctx = ctx.with_unit(unit);
    }

    let generator = TemplateGenerator::new().map_err(|e| miette::miette!("{}", e))?;
    let generated = generator
        .generate_form(&ctx)
        .map_err(|e| miette::miette!("{}", e))?;

    let path = ws
        .project
        .catalog_dir(CatalogKind::Form)
        .join(format!("{}{}", generated.id, FILE_SUFFIX));
    save_generated(&ws, CatalogKind::Form, &path, &generated, args.edit, global)
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let forms = ws.catalog().list_versions().into_diagnostic()?;

    Listing {
        noun: "form version",
        columns: &["id", "title", "version", "templates", "fields"],
        row: &|f: &FormVersion| {
            vec![
                f.id.to_string(),
                truncate_str(&f.title, 40),
                f.version_number.to_string(),
                f.templates.len().to_string(),
                f.templates
                    .iter()
                    .map(|t| t.fields.len())
                    .sum::<usize>()
                    .to_string(),
            ]
        },
    }
    .print(&forms, global)
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let forms = ws.catalog().forms();
    let form = find_by_id(&forms, &args.id, |f| f.id.to_string())
        .ok_or_else(|| miette::miette!("No form version found matching '{}'", args.id))?;

    print_record(form, global.format)?;

    let issues = form.check();
    if !issues.is_empty() && global.format.or(OutputFormat::Yaml) == OutputFormat::Yaml {
        eprintln!();
        for issue in &issues {
            let marker = match issue.level {
                IssueLevel::Error => style("✗").red(),
                IssueLevel::Warning => style("!").yellow(),
            };
            eprintln!("{} {}", marker, issue);
        }
    }
    Ok(())
}
