//! `fct job` command - Jobs (site visits)

use clap::Subcommand;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{save_generated, truncate_str, Listing, Workspace};
use crate::cli::GlobalOpts;
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::project::CatalogKind;
use crate::entities::Job;
use crate::schema::template::{TemplateContext, TemplateGenerator};

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// Create a new job
    New(NewArgs),

    /// List jobs
    List,
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Job reference as issued by the CRM (e.g. "J-1042")
    #[arg(long)]
    pub id: String,

    /// Job title
    #[arg(long, short = 't')]
    pub title: String,

    /// Site the job is carried out at
    #[arg(long, short = 's')]
    pub site: String,

    /// Restrict the job to these assets (default: every asset on the site)
    #[arg(long = "asset", short = 'a')]
    pub assets: Vec<String>,

    /// Open in editor after creation
    #[arg(long, short = 'e')]
    pub edit: bool,
}

pub fn run(cmd: JobCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        JobCommands::New(args) => run_new(args, global),
        JobCommands::List => run_list(global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;

    let assets = args
        .assets
        .iter()
        .map(|a| EntityId::parse_as(a, EntityPrefix::Ast))
        .collect::<Result<Vec<_>, _>>()
        .into_diagnostic()?;

    let ctx = TemplateContext::new(ws.config.author())
        .with_job_id(&args.id)
        .with_title(args.title)
        .with_site(args.site)
        .with_assets(assets);

    let generator = TemplateGenerator::new().map_err(|e| miette::miette!("{}", e))?;
    let generated = generator
        .generate_job(&ctx)
        .map_err(|e| miette::miette!("{}", e))?;

    if ws.catalog().jobs().iter().any(|j| j.id == args.id) {
        return Err(miette::miette!("job '{}' already exists", args.id));
    }

    let path = ws.project.job_path(&args.id);
    save_generated(&ws, CatalogKind::Job, &path, &generated, args.edit, global)
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut jobs = ws.catalog().jobs();
    jobs.sort_by(|a, b| a.id.cmp(&b.id));

    Listing {
        noun: "job",
        columns: &["id", "title", "site", "assets"],
        row: &|j: &Job| {
            vec![
                j.id.clone(),
                truncate_str(&j.title, 40),
                j.site.clone(),
                if j.assets.is_empty() {
                    "all on site".to_string()
                } else {
                    j.assets.len().to_string()
                },
            ]
        },
    }
    .print(&jobs, global)
}
