//! YAML error diagnostics pointing at the offending line of a catalog file

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// YAML syntax or shape error with source location
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(fct::yaml::syntax))]
pub struct YamlSyntaxError {
    #[source_code]
    src: NamedSource<String>,

    #[label("here")]
    span: SourceSpan,

    #[help]
    help: Option<String>,

    message: String,
}

impl YamlSyntaxError {
    /// Build a diagnostic from a serde_yml error
    pub fn from_serde_error(err: &serde_yml::Error, source: &str, filename: &str) -> Self {
        let (line, column) = err
            .location()
            .map(|loc| (loc.line(), loc.column()))
            .unwrap_or((1, 1));
        let message = err.to_string();
        let help = hint_for(&message);
        Self::at_location(message, source, filename, line, column, help)
    }

    /// Build a diagnostic at an explicit 1-based line/column
    pub fn at_location(
        message: impl Into<String>,
        source: &str,
        filename: &str,
        line: usize,
        column: usize,
        help: Option<String>,
    ) -> Self {
        let offset = offset_of(source, line, column);
        Self {
            src: NamedSource::new(filename, source.to_string()),
            span: SourceSpan::from(offset..offset.saturating_add(1).min(source.len().max(1))),
            help,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Error raised while reading a YAML catalog file
#[derive(Debug, Error, Diagnostic)]
pub enum YamlError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Syntax(#[from] YamlSyntaxError),

    #[error("cannot read {path}: {source}")]
    #[diagnostic(code(fct::yaml::io))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Byte offset of a 1-based line/column, clamped to the source length
pub(crate) fn offset_of(source: &str, line: usize, column: usize) -> usize {
    let line_start = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum::<usize>();

    let rest = &source[line_start.min(source.len())..];
    let line_len = rest.find('\n').unwrap_or(rest.len());
    let col_offset = rest
        .char_indices()
        .nth(column.saturating_sub(1))
        .map(|(i, _)| i)
        .unwrap_or(line_len)
        .min(line_len);

    (line_start + col_offset).min(source.len())
}

const HINTS: &[(&str, &str)] = &[
    (
        "tab",
        "YAML requires spaces for indentation, not tabs. Replace tabs with spaces.",
    ),
    (
        "duplicate key",
        "Each key can only appear once. Remove or rename the duplicate key.",
    ),
    (
        "expected block end",
        "Check your indentation - it may be inconsistent.",
    ),
    (
        "mapping values are not allowed",
        "You may be missing a space after ':' or have incorrect indentation.",
    ),
    (
        "unknown variant",
        "Field types are: text, number, boolean, select, pass_fail.",
    ),
    (
        "missing field",
        "Compare the file with one generated by `fct <kind> new`.",
    ),
    (
        "invalid ulid",
        "IDs look like FORM-01HQ3K4N5M6P7R8S9T0VWXYZAB; generate one with `fct <kind> new`.",
    ),
];

/// Suggest a fix based on the error message
fn hint_for(message: &str) -> Option<String> {
    let lower = message.to_lowercase();
    HINTS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, hint)| hint.to_string())
}
