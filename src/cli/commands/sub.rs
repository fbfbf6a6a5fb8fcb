//! `fct sub` command - Submissions
//!
//! Thin wrapper over the engine: every subcommand opens the project's
//! submission database, runs one engine operation and prints the outcome.

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use crate::catalog::{AssetDirectory, MeterRegistry, TemplateCatalog};
use crate::cli::helpers::{
    format_date_local, print_record, resolve_instance, resolve_submission, Listing, Workspace,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::{EntityId, EntityPrefix};
use crate::core::loader::find_by_id;
use crate::core::store::SubmissionStore;
use crate::engine::evaluate::classified_values;
use crate::engine::{ReadingCapture, Warning};
use crate::entities::{
    Answers, EntityInstance, EntityTemplate, FieldType, FormVersion, OverallResult, Reading,
    Submission, SubmissionStatus,
};

#[derive(Subcommand, Debug)]
pub enum SubCommands {
    /// Start (or resume) the submission for a job and form version
    Start(StartArgs),

    /// Create instances for every template and applicable asset
    Instantiate(SubArgs),

    /// Record answers on an instance
    Answer(AnswerArgs),

    /// Record a metered reading on an instance
    Reading(ReadingArgs),

    /// Show tally, overall result and untested assets
    Status(SubArgs),

    /// Finalise a submission
    Submit(SubArgs),

    /// List submissions
    List,

    /// Export a submission with its instances and readings
    Export(ExportArgs),

    /// Check a submitted record against its digest
    Verify(SubArgs),
}

#[derive(clap::Args, Debug)]
pub struct StartArgs {
    /// Job reference
    #[arg(long, short = 'j')]
    pub job: String,

    /// Form version ID (or unique prefix)
    #[arg(long)]
    pub form: String,
}

#[derive(clap::Args, Debug)]
pub struct SubArgs {
    /// Submission ID (or unique prefix)
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct AnswerArgs {
    /// Instance ID (or unique prefix)
    pub instance: String,

    /// Answers as field=value; values are read as JSON when they parse,
    /// otherwise as text. `field=null` clears a field.
    #[arg(value_name = "FIELD=VALUE")]
    pub answers: Vec<String>,

    /// Prompt for every field of the instance's template
    #[arg(long, short = 'i')]
    pub interactive: bool,
}

#[derive(clap::Args, Debug)]
pub struct ReadingArgs {
    /// Instance ID (or unique prefix)
    pub instance: String,

    /// Meter ID (or unique prefix)
    #[arg(long, short = 'm')]
    pub meter: String,

    /// Calibration the value was taken under (default: the meter's active calibration)
    #[arg(long, short = 'c')]
    pub calibration: Option<String>,

    /// Measured value
    #[arg(long)]
    pub value: String,

    /// Field to record against (default: the template's first number field)
    #[arg(long)]
    pub field: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Submission ID (or unique prefix)
    pub id: String,

    /// Write to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(cmd: SubCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        SubCommands::Start(args) => run_start(args, global),
        SubCommands::Instantiate(args) => run_instantiate(args, global),
        SubCommands::Answer(args) => run_answer(args, global),
        SubCommands::Reading(args) => run_reading(args, global),
        SubCommands::Status(args) => run_status(args, global),
        SubCommands::Submit(args) => run_submit(args, global),
        SubCommands::List => run_list(global),
        SubCommands::Export(args) => run_export(args, global),
        SubCommands::Verify(args) => run_verify(args, global),
    }
}

/// Parse `field=value`; the value is JSON when it parses as JSON, else text
pub fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| miette::miette!("expected FIELD=VALUE, got '{}'", raw))?;
    let field = field.trim();
    if field.is_empty() {
        return Err(miette::miette!("missing field name in '{}'", raw));
    }
    let value = value.trim();
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((field.to_string(), value))
}

fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("{} {}", style("!").yellow(), style(warning).yellow());
    }
}

fn status_styled(status: SubmissionStatus) -> console::StyledObject<String> {
    match status {
        SubmissionStatus::Draft => style(status.to_string()).dim(),
        SubmissionStatus::Active => style(status.to_string()).cyan(),
        SubmissionStatus::Submitted => style(status.to_string()).green(),
    }
}

fn run_start(args: StartArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();
    let forms = catalog.list_versions().into_diagnostic()?;
    let form = find_by_id(&forms, &args.form, |f| f.id.to_string())
        .ok_or_else(|| miette::miette!("No form version found matching '{}'", args.form))?;

    let mut engine = ws.engine(&catalog)?;
    let submission = engine.start_submission(&args.job, &form.id)?;

    match global.format {
        OutputFormat::Id => println!("{}", submission.id),
        OutputFormat::Json | OutputFormat::Yaml => print_record(&submission, global.format)?,
        _ => {
            if !global.quiet {
                println!(
                    "{} {} for job {} ({} v{}) is {}",
                    style("✓").green(),
                    style(&submission.id).cyan(),
                    style(&submission.job_id).yellow(),
                    form.title,
                    form.version_number,
                    status_styled(submission.status)
                );
                println!(
                    "   Next: {}",
                    style(format!("fct sub instantiate {}", submission.id.short())).yellow()
                );
            }
        }
    }
    Ok(())
}

/// Display name for an instance: template title plus asset label
fn instance_label(
    instance: &EntityInstance,
    form: &FormVersion,
    asset_labels: &HashMap<EntityId, String>,
) -> String {
    let template = form
        .template(&instance.template_id)
        .map(|t| t.title.as_str())
        .unwrap_or("?");
    match &instance.asset_id {
        Some(asset) => format!(
            "{} / {}",
            template,
            asset_labels
                .get(asset)
                .cloned()
                .unwrap_or_else(|| asset.to_string())
        ),
        None => template.to_string(),
    }
}

fn run_instantiate(args: SubArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();
    let mut engine = ws.engine(&catalog)?;
    let submission = resolve_submission(engine.store(), &args.id)?;

    let outcome = engine.instantiate(&submission.id)?;
    let form = engine.form_for(&outcome.submission)?;
    let labels: HashMap<EntityId, String> = outcome
        .assets
        .iter()
        .map(|a| (a.id.clone(), a.label.clone()))
        .collect();

    if matches!(global.format, OutputFormat::Json | OutputFormat::Yaml) {
        return print_record(&outcome, global.format);
    }

    if !global.quiet {
        println!(
            "{} {} new instance(s), {} in total across {} asset(s)",
            style("✓").green(),
            style(outcome.created).cyan(),
            outcome.instances.len(),
            outcome.assets.len()
        );
    }

    let rows: Vec<(EntityInstance, String)> = outcome
        .instances
        .iter()
        .map(|i| (i.clone(), instance_label(i, &form, &labels)))
        .collect();
    Listing {
        noun: "instance",
        columns: &["id", "instance", "answers"],
        row: &|(i, label): &(EntityInstance, String)| {
            vec![i.id.to_string(), label.clone(), i.answers.len().to_string()]
        },
    }
    .print(&rows, global)
}

/// Ask for a value for each field; empty input leaves the field untouched
fn prompt_answers(template: &EntityTemplate, current: &Answers) -> Result<Answers> {
    use dialoguer::{theme::ColorfulTheme, Input, Select};

    let theme = ColorfulTheme::default();
    let mut answers = Answers::new();

    for field in &template.fields {
        let existing = current.get(&field.id);
        let prompt = match (&field.unit, field.required) {
            (Some(unit), true) => format!("{} ({}) *", field.label, unit),
            (Some(unit), false) => format!("{} ({})", field.label, unit),
            (None, true) => format!("{} *", field.label),
            (None, false) => field.label.clone(),
        };

        let choices: Vec<String> = match field.field_type {
            FieldType::PassFail => vec!["pass".into(), "fail".into()],
            FieldType::Boolean => vec!["true".into(), "false".into()],
            FieldType::Select => field.options.clone(),
            FieldType::Text | FieldType::Number => Vec::new(),
        };

        if !choices.is_empty() {
            let mut items = vec!["(skip)".to_string()];
            items.extend(choices.iter().cloned());
            let current_idx = existing
                .and_then(|v| {
                    let shown = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    choices.iter().position(|c| *c == shown)
                })
                .map(|i| i + 1)
                .unwrap_or(0);
            let idx = Select::with_theme(&theme)
                .with_prompt(&prompt)
                .items(&items)
                .default(current_idx)
                .interact()
                .into_diagnostic()?;
            if idx > 0 {
                let choice = &choices[idx - 1];
                let value = match field.field_type {
                    FieldType::Boolean => Value::Bool(choice == "true"),
                    _ => Value::String(choice.clone()),
                };
                answers.insert(field.id.clone(), value);
            }
            continue;
        }

        let initial = existing
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();
        let input: String = Input::with_theme(&theme)
            .with_prompt(&prompt)
            .with_initial_text(initial)
            .allow_empty(true)
            .interact_text()
            .into_diagnostic()?;
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let value = match field.field_type {
            FieldType::Number => input
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(input.to_string())),
            _ => Value::String(input.to_string()),
        };
        answers.insert(field.id.clone(), value);
    }

    Ok(answers)
}

fn run_answer(args: AnswerArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();
    let mut engine = ws.engine(&catalog)?;
    let instance = resolve_instance(engine.store(), &args.instance)?;

    let mut answers = Answers::new();
    for raw in &args.answers {
        let (field, value) = parse_assignment(raw)?;
        answers.insert(field, value);
    }

    if args.interactive {
        let submission = engine.submission(&instance.submission_id)?;
        let form = engine.form_for(&submission)?;
        let template = form
            .template(&instance.template_id)
            .ok_or_else(|| miette::miette!("template {} not in form", instance.template_id))?;
        answers.extend(prompt_answers(template, &instance.answers)?);
    }

    if answers.is_empty() {
        return Err(miette::miette!(
            "nothing to record; pass FIELD=VALUE pairs or --interactive"
        ));
    }

    let updated = engine.save_answers(&instance.id, &answers)?;

    match global.format {
        OutputFormat::Json | OutputFormat::Yaml => print_record(&updated, global.format)?,
        _ => {
            if !global.quiet {
                println!(
                    "{} Saved {} answer(s) on {}",
                    style("✓").green(),
                    answers.len(),
                    style(updated.id.short()).cyan()
                );
            }
        }
    }
    Ok(())
}

fn run_reading(args: ReadingArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();

    let meters = catalog.meters();
    let meter = find_by_id(&meters, &args.meter, |m| m.id.to_string())
        .ok_or_else(|| miette::miette!("No meter found matching '{}'", args.meter))?;
    let calibration = match &args.calibration {
        Some(raw) => EntityId::parse_as(raw, EntityPrefix::Cal).into_diagnostic()?,
        None => catalog
            .get_meter(&meter.id)
            .into_diagnostic()?
            .current_calibration()
            .map(|c| c.id.clone())
            .ok_or_else(|| miette::miette!("{} has no active calibration", meter.identity()))?,
    };

    let mut engine = ws.engine(&catalog)?;
    let instance = resolve_instance(engine.store(), &args.instance)?;

    let (_, value) = parse_assignment(&format!("value={}", args.value))?;
    let mut capture = ReadingCapture::new(instance.id.clone(), value)
        .meter(meter.id.clone())
        .calibration(calibration);
    if let Some(field) = args.field {
        capture = capture.field(field);
    }

    let outcome = engine.save_reading(capture)?;

    match global.format {
        OutputFormat::Json | OutputFormat::Yaml => print_record(&outcome, global.format)?,
        OutputFormat::Id => println!("{}", outcome.reading.id),
        _ => {
            if !global.quiet {
                println!(
                    "{} {} = {} recorded with {}",
                    style("✓").green(),
                    outcome.reading.field_id,
                    style(&outcome.reading.value).cyan(),
                    meter.identity()
                );
            }
        }
    }
    print_warnings(&outcome.warnings);
    Ok(())
}

fn run_status(args: SubArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();
    let engine = ws.engine(&catalog)?;
    let submission = resolve_submission(engine.store(), &args.id)?;
    let summary = engine.summary(&submission.id)?;

    if matches!(global.format, OutputFormat::Json | OutputFormat::Yaml) {
        return print_record(&summary, global.format);
    }

    let sub = &summary.submission;
    println!("{}", style(format!("Submission {}", sub.id)).bold());
    println!("  Job:        {}", sub.job_id);
    println!("  Form:       {}", sub.form_version_id);
    println!("  Status:     {}", status_styled(sub.status));
    println!("  Instances:  {}", summary.instance_count);
    println!(
        "  Readings:   {} pass, {} fail, {} n/a",
        style(summary.tally.pass_count).green(),
        style(summary.tally.fail_count).red(),
        summary.tally.na_count
    );
    let overall = summary.overall_result.to_string();
    println!(
        "  Result:     {}",
        match summary.overall_result {
            OverallResult::Pass => style(overall).green().bold(),
            OverallResult::Fail => style(overall).red().bold(),
            OverallResult::Incomplete => style(overall).yellow(),
        }
    );
    if let Some(at) = &sub.submitted_at {
        println!(
            "  Submitted:  {} by {}",
            format_date_local(at),
            sub.submitted_by.as_deref().unwrap_or("unknown")
        );
    }
    if !summary.untested.is_empty() {
        println!();
        println!(
            "{} untested asset(s):",
            style(summary.untested.len()).yellow()
        );
        for asset in &summary.untested {
            println!("  - {}", asset);
        }
    }
    if !summary.warnings.is_empty() {
        println!();
    }
    print_warnings(
        &summary
            .warnings
            .iter()
            .filter(|w| !matches!(w, Warning::Untested { .. }))
            .cloned()
            .collect::<Vec<_>>(),
    );
    Ok(())
}

fn run_submit(args: SubArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();
    let mut engine = ws.engine(&catalog)?;
    let submission = resolve_submission(engine.store(), &args.id)?;

    let outcome = engine.submit(&submission.id)?;

    match global.format {
        OutputFormat::Json | OutputFormat::Yaml => print_record(&outcome, global.format)?,
        _ => {
            let sub = &outcome.submission;
            println!(
                "{} Submitted {}: {} ({} pass, {} fail, {} n/a)",
                style("✓").green(),
                style(sub.id.short()).cyan(),
                sub.overall_result
                    .map(|r| r.to_string())
                    .unwrap_or_default(),
                sub.pass_count,
                sub.fail_count,
                sub.na_count
            );
        }
    }
    print_warnings(&outcome.warnings);
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let store = ws.store()?;
    let submissions = store.submissions().into_diagnostic()?;

    Listing {
        noun: "submission",
        columns: &["id", "job", "form", "status", "result", "created"],
        row: &|s: &Submission| {
            vec![
                s.id.to_string(),
                s.job_id.clone(),
                s.form_version_id.short(),
                s.status.to_string(),
                s.overall_result
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                format_date_local(&s.created),
            ]
        },
    }
    .print(&submissions, global)
}

/// Full record of a submission
#[derive(Debug, Serialize)]
struct Export {
    submission: Submission,
    instances: Vec<EntityInstance>,
    readings: Vec<Reading>,
}

/// One classified value per CSV row
fn export_csv(
    out: &mut dyn Write,
    form: &FormVersion,
    export: &Export,
    asset_labels: &HashMap<EntityId, String>,
) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record([
            "instance", "template", "asset", "field", "value", "unit", "verdict",
        ])
        .into_diagnostic()?;

    for cv in classified_values(form, &export.instances, &export.readings) {
        let template = form
            .template(&cv.instance.template_id)
            .map(|t| t.title.clone())
            .unwrap_or_default();
        let asset = cv
            .instance
            .asset_id
            .as_ref()
            .map(|a| asset_labels.get(a).cloned().unwrap_or_else(|| a.to_string()))
            .unwrap_or_default();
        let value = match cv.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        writer
            .write_record([
                cv.instance.id.to_string(),
                template,
                asset,
                cv.field.id.clone(),
                value,
                cv.field.unit.clone().unwrap_or_default(),
                cv.verdict.to_string(),
            ])
            .into_diagnostic()?;
    }
    writer.flush().into_diagnostic()?;
    Ok(())
}

fn run_export(args: ExportArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();
    let engine = ws.engine(&catalog)?;
    let submission = resolve_submission(engine.store(), &args.id)?;

    let export = Export {
        instances: engine.store().instances(&submission.id).into_diagnostic()?,
        readings: engine.store().readings(&submission.id).into_diagnostic()?,
        submission,
    };

    let mut buffer: Vec<u8> = Vec::new();
    match global.format.or(OutputFormat::Yaml) {
        OutputFormat::Json => {
            buffer = serde_json::to_vec_pretty(&export).into_diagnostic()?;
            buffer.push(b'\n');
        }
        OutputFormat::Csv => {
            let form = engine.form_for(&export.submission)?;
            let labels: HashMap<EntityId, String> = catalog
                .list_assets_for_job(&export.submission.job_id)
                .map(|assets| assets.into_iter().map(|a| (a.id, a.label)).collect())
                .unwrap_or_default();
            export_csv(&mut buffer, &form, &export, &labels)?;
        }
        OutputFormat::Yaml => {
            buffer = serde_yml::to_string(&export).into_diagnostic()?.into_bytes();
        }
        other => {
            return Err(miette::miette!(
                "export supports yaml, json or csv (got {:?})",
                other
            ))
        }
    }

    match args.output {
        Some(path) => {
            std::fs::write(&path, &buffer).into_diagnostic()?;
            if !global.quiet {
                eprintln!(
                    "{} Exported {} to {}",
                    style("✓").green(),
                    export.submission.id.short(),
                    style(path.display()).cyan()
                );
            }
        }
        None => std::io::stdout().write_all(&buffer).into_diagnostic()?,
    }
    Ok(())
}

fn run_verify(args: SubArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let catalog = ws.catalog();
    let engine = ws.engine(&catalog)?;
    let submission = resolve_submission(engine.store(), &args.id)?;

    if engine.verify(&submission.id)? {
        if !global.quiet {
            println!(
                "{} {} matches its submitted digest",
                style("✓").green(),
                style(submission.id.short()).cyan()
            );
        }
        Ok(())
    } else {
        Err(miette::miette!(
            "{} has been modified since it was submitted",
            submission.id
        ))
    }
}
