//! `fct validate` command - Validate catalog files against schemas

use console::style;
use miette::Result;
use std::path::{Path, PathBuf};

use crate::cli::GlobalOpts;
use crate::core::project::{CatalogKind, Project, FILE_SUFFIX};
use crate::entities::form::{FormIssue, IssueLevel};
use crate::entities::FormVersion;
use crate::schema::validator::Validator;

#[derive(clap::Args, Debug)]
pub struct ValidateArgs {
    /// Files or directories to validate (default: every catalog directory)
    #[arg()]
    pub paths: Vec<PathBuf>,

    /// Strict mode - warnings become errors
    #[arg(long)]
    pub strict: bool,

    /// Continue validation after first error
    #[arg(long)]
    pub keep_going: bool,

    /// Show summary only, don't show individual errors
    #[arg(long)]
    pub summary: bool,
}

/// Validation statistics
#[derive(Default)]
struct ValidationStats {
    files_checked: usize,
    files_passed: usize,
    files_failed: usize,
    total_errors: usize,
    total_warnings: usize,
}

/// Outcome of checking one file
enum FileCheck {
    Passed,
    Warnings(Vec<FormIssue>),
    Failed { errors: usize, report: String },
}

pub fn run(args: ValidateArgs, global: &GlobalOpts) -> Result<()> {
    let project =
        Project::locate(global.project.as_deref()).map_err(|e| miette::miette!("{}", e))?;
    let validator = Validator::default();

    let files = if args.paths.is_empty() {
        catalog_files(&project)
    } else {
        expand_paths(&args.paths)
    };

    let mut stats = ValidationStats::default();
    let show = !args.summary && !global.quiet;

    if show {
        println!(
            "{} Validating {} file(s)...\n",
            style("→").blue(),
            files.len()
        );
    }

    for (path, kind) in &files {
        stats.files_checked += 1;

        match check_file(&validator, path, *kind) {
            FileCheck::Passed => {
                stats.files_passed += 1;
                if show {
                    println!("{} {}", style("✓").green(), path.display());
                }
            }
            FileCheck::Warnings(issues) => {
                stats.total_warnings += issues.len();
                if args.strict {
                    stats.files_failed += 1;
                    stats.total_errors += issues.len();
                } else {
                    stats.files_passed += 1;
                }
                if show {
                    println!(
                        "{} {} - {} warning(s)",
                        style("!").yellow(),
                        path.display(),
                        issues.len()
                    );
                    for issue in &issues {
                        println!("    {}", style(issue).yellow());
                    }
                }
                if args.strict && !args.keep_going {
                    break;
                }
            }
            FileCheck::Failed { errors, report } => {
                stats.files_failed += 1;
                stats.total_errors += errors;
                if show {
                    println!(
                        "{} {} - {} error(s)",
                        style("✗").red(),
                        path.display(),
                        errors
                    );
                    println!("{}", report);
                }
                if !args.keep_going {
                    break;
                }
            }
        }
    }

    if !global.quiet {
        println!();
        println!("{}", style("─".repeat(60)).dim());
        println!("{}", style("Validation Summary").bold());
        println!("{}", style("─".repeat(60)).dim());
        println!("  Files checked:  {}", style(stats.files_checked).cyan());
        println!("  Files passed:   {}", style(stats.files_passed).green());
        println!("  Files failed:   {}", style(stats.files_failed).red());
        println!("  Total errors:   {}", style(stats.total_errors).red());
        if stats.total_warnings > 0 {
            println!("  Total warnings: {}", style(stats.total_warnings).yellow());
        }
        println!();
    }

    match stats.files_failed {
        0 => {
            if !global.quiet {
                println!("{} All files passed validation!", style("✓").green().bold());
            }
            Ok(())
        }
        1 => Err(miette::miette!("Validation failed: 1 file has errors")),
        n => Err(miette::miette!("Validation failed: {} files have errors", n)),
    }
}

/// Schema check, then semantic checks for form versions
fn check_file(validator: &Validator, path: &Path, kind: CatalogKind) -> FileCheck {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            return FileCheck::Failed {
                errors: 1,
                report: format!("    {}", e),
            }
        }
    };
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    if let Err(e) = validator.validate(&content, &filename, kind) {
        return FileCheck::Failed {
            errors: e.violation_count(),
            report: format!("{:?}", miette::Report::new(e)),
        };
    }

    if kind != CatalogKind::Form {
        return FileCheck::Passed;
    }

    let form: FormVersion = match crate::yaml::parse_yaml_str(&content, &filename) {
        Ok(f) => f,
        Err(e) => {
            return FileCheck::Failed {
                errors: 1,
                report: format!("{:?}", miette::Report::new(e)),
            }
        }
    };
    let issues = form.check();
    let errors: Vec<String> = issues
        .iter()
        .filter(|i| i.level == IssueLevel::Error)
        .map(|i| format!("    {}", i))
        .collect();
    if !errors.is_empty() {
        return FileCheck::Failed {
            errors: errors.len(),
            report: errors.join("\n"),
        };
    }
    if issues.is_empty() {
        FileCheck::Passed
    } else {
        FileCheck::Warnings(issues)
    }
}

/// Every catalog file in the project, tagged with its kind
fn catalog_files(project: &Project) -> Vec<(PathBuf, CatalogKind)> {
    CatalogKind::all()
        .iter()
        .flat_map(|kind| project.iter_catalog_files(*kind).map(move |p| (p, *kind)))
        .collect()
}

/// Expand paths - directories are walked for catalog files
fn expand_paths(paths: &[PathBuf]) -> Vec<(PathBuf, CatalogKind)> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for entry in walkdir::WalkDir::new(path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if entry.path().to_string_lossy().ends_with(FILE_SUFFIX) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else if path.exists() {
            files.push(path.clone());
        }
    }

    files.sort();
    files
        .into_iter()
        .filter_map(|p| match CatalogKind::from_path(&p) {
            Some(kind) => Some((p, kind)),
            None => {
                log::warn!("cannot tell the kind of {}; skipped", p.display());
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FORM: &str = r#"
id: FORM-01HC2JB7SMQX7RS1Y0GFKBHPTD
title: Annual inspection
version_number: 1
templates:
  - id: TMPL-01HC2JB7SMQX7RS1Y0GFKBHPTE
    title: Circuit
    repeat_per_asset: true
    fields:
      - id: ir
        label: Insulation resistance
        type: number
        pass_threshold: 20
        fail_threshold: 10
"#;

    #[test]
    fn test_empty_band_fails_semantic_check() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("forms").join("f.fct.yaml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, FORM).unwrap();

        match check_file(&Validator::default(), &path, CatalogKind::Form) {
            FileCheck::Failed { errors, report } => {
                assert_eq!(errors, 1);
                assert!(report.contains("no value can pass"));
            }
            _ => panic!("expected failure"),
        }
    }

    #[test]
    fn test_select_without_options_is_warning() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("f.fct.yaml");
        let yaml = FORM
            .replace("type: number", "type: select")
            .replace("        pass_threshold: 20\n        fail_threshold: 10\n", "");
        std::fs::write(&path, yaml).unwrap();

        assert!(matches!(
            check_file(&Validator::default(), &path, CatalogKind::Form),
            FileCheck::Warnings(issues) if issues.len() == 1
        ));
    }

    #[test]
    fn test_expand_paths_detects_kind() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let asset = project.catalog_dir(CatalogKind::Asset).join("a.fct.yaml");
        std::fs::write(&asset, "id: x\n").unwrap();
        std::fs::write(project.root().join("loose.fct.yaml"), "id: x\n").unwrap();

        let files = expand_paths(&[project.root().to_path_buf()]);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].1, CatalogKind::Asset);
    }
}
