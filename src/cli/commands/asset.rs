//! `fct asset` command - Assets under test

use clap::Subcommand;
use miette::{IntoDiagnostic, Result};

use crate::catalog::AssetDirectory;
use crate::cli::helpers::{save_generated, Listing, Workspace};
use crate::cli::GlobalOpts;
use crate::core::project::{CatalogKind, FILE_SUFFIX};
use crate::entities::Asset;
use crate::schema::template::{TemplateContext, TemplateGenerator};

#[derive(Subcommand, Debug)]
pub enum AssetCommands {
    /// Register a new asset
    New(NewArgs),

    /// List assets
    List(ListArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Operator-facing label (e.g. "DB-2 Circuit 4")
    #[arg(long, short = 'l')]
    pub label: String,

    /// Site the asset is installed at
    #[arg(long, short = 's')]
    pub site: String,

    /// Where on the site the asset is
    #[arg(long)]
    pub location: Option<String>,

    /// Open in editor after creation
    #[arg(long, short = 'e')]
    pub edit: bool,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Only assets in scope for this job
    #[arg(long, short = 'j')]
    pub job: Option<String>,
}

pub fn run(cmd: AssetCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        AssetCommands::New(args) => run_new(args, global),
        AssetCommands::List(args) => run_list(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;

    let mut ctx = TemplateContext::new(ws.config.author())
        .with_title(args.label)
        .with_site(args.site);
    if let Some(location) = args.location {
        ctx = ctx.with_location(location);
    }

    let generator = TemplateGenerator::new().map_err(|e| miette::miette!("{}", e))?;
    let generated = generator
        .generate_asset(&ctx)
        .map_err(|e| miette::miette!("{}", e))?;

    let path = ws
        .project
        .catalog_dir(CatalogKind::Asset)
        .join(format!("{}{}", generated.id, FILE_SUFFIX));
    save_generated(&ws, CatalogKind::Asset, &path, &generated, args.edit, global)
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();

    let assets = match args.job {
        Some(job) => catalog.list_assets_for_job(&job).into_diagnostic()?,
        None => {
            let mut assets = catalog.assets();
            assets.sort_by(|a, b| a.site.cmp(&b.site).then(a.label.cmp(&b.label)));
            assets
        }
    };

    Listing {
        noun: "asset",
        columns: &["id", "label", "location", "site"],
        row: &|a: &Asset| {
            vec![
                a.id.to_string(),
                a.label.clone(),
                a.location.clone().unwrap_or_else(|| "-".to_string()),
                a.site.clone(),
            ]
        },
    }
    .print(&assets, global)
}
