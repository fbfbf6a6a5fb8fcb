//! `fct meter` command - Meters and their calibrations

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::{print_record, save_generated, Listing, Workspace};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::loader::find_by_id;
use crate::core::project::{CatalogKind, FILE_SUFFIX};
use crate::entities::{CalibrationState, Meter};
use crate::schema::template::{TemplateContext, TemplateGenerator};

#[derive(Subcommand, Debug)]
pub enum MeterCommands {
    /// Register a new meter with its current calibration
    New(NewArgs),

    /// List meters and calibration status
    List,

    /// Show a meter and its calibration history
    Show(ShowArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Make and model (e.g. "Megger MFT1741")
    #[arg(long, short = 'n')]
    pub name: String,

    /// Serial number
    #[arg(long, short = 's')]
    pub serial: String,

    /// Date of the current calibration (YYYY-MM-DD, default: today)
    #[arg(long)]
    pub calibrated: Option<NaiveDate>,

    /// Days the calibration is valid for
    #[arg(long, default_value_t = 365)]
    pub valid_days: i64,

    /// Calibration certificate reference
    #[arg(long, short = 'c')]
    pub certificate: Option<String>,

    /// Open in editor after creation
    #[arg(long, short = 'e')]
    pub edit: bool,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Meter ID (or unique prefix)
    pub id: String,
}

pub fn run(cmd: MeterCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        MeterCommands::New(args) => run_new(args, global),
        MeterCommands::List => run_list(global),
        MeterCommands::Show(args) => run_show(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;

    let calibrated_at = match args.calibrated {
        Some(date) => date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| miette::miette!("invalid calibration date {}", date))?,
        None => Utc::now(),
    };

    let mut ctx = TemplateContext::new(ws.config.author())
        .with_title(args.name)
        .with_serial_number(args.serial)
        .with_calibration(calibrated_at, args.valid_days);
    if let Some(certificate) = args.certificate {
        ctx = ctx.with_certificate(certificate);
    }

    let generator = TemplateGenerator::new().map_err(|e| miette::miette!("{}", e))?;
    let generated = generator
        .generate_meter(&ctx)
        .map_err(|e| miette::miette!("{}", e))?;

    let path = ws
        .project
        .catalog_dir(CatalogKind::Meter)
        .join(format!("{}{}", generated.id, FILE_SUFFIX));
    save_generated(&ws, CatalogKind::Meter, &path, &generated, args.edit, global)
}

/// Calibration state of a meter right now, for listings
fn calibration_status(meter: &Meter, horizon_days: i64) -> String {
    match meter.current_calibration() {
        None => "no calibration".to_string(),
        Some(cal) => match cal.state_at(Utc::now(), horizon_days) {
            CalibrationState::Valid => "valid".to_string(),
            CalibrationState::ExpiringSoon { days_left } => {
                format!("expires in {}d", days_left)
            }
            CalibrationState::Expired => "expired".to_string(),
        },
    }
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let mut meters = ws.catalog().meters();
    meters.sort_by(|a, b| a.name.cmp(&b.name).then(a.serial_number.cmp(&b.serial_number)));

    let horizon = ws.config.compliance.calibration_warning_days;

    Listing {
        noun: "meter",
        columns: &["id", "name", "serial", "calibration", "expires", "status"],
        row: &|m: &Meter| {
            let (cal, expires) = match m.current_calibration() {
                Some(c) => (c.id.to_string(), c.expires_at.format("%Y-%m-%d").to_string()),
                None => ("-".to_string(), "-".to_string()),
            };
            vec![
                m.id.to_string(),
                m.name.clone(),
                m.serial_number.clone(),
                cal,
                expires,
                calibration_status(m, horizon),
            ]
        },
    }
    .print(&meters, global)
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let meters = ws.catalog().meters();
    let meter = find_by_id(&meters, &args.id, |m| m.id.to_string())
        .ok_or_else(|| miette::miette!("No meter found matching '{}'", args.id))?;

    print_record(meter, global.format)?;

    if global.format.or(OutputFormat::Yaml) == OutputFormat::Yaml && !global.quiet {
        let status = calibration_status(meter, ws.config.compliance.calibration_warning_days);
        let styled = match meter.current_calibration().map(|c| c.is_expired_at(Utc::now())) {
            Some(false) => style(status).green(),
            _ => style(status).red(),
        };
        eprintln!();
        eprintln!("{} calibration: {}", meter.identity(), styled);
    }
    Ok(())
}
