//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::PathBuf;

use crate::core::Project;

/// Compliance policy knobs
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Warn when a calibration expires within this many days of capture (0 = off)
    pub calibration_warning_days: i64,

    /// Refuse submission while applicable assets remain untested
    pub require_complete: bool,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            calibration_warning_days: 30,
            require_complete: false,
        }
    }
}

/// Partial compliance section as read from one config layer
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ComplianceLayer {
    calibration_warning_days: Option<i64>,
    require_complete: Option<bool>,
}

/// One config file as written on disk; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    author: Option<String>,
    editor: Option<String>,
    default_format: Option<String>,
    compliance: ComplianceLayer,
}

/// FCT configuration with layered hierarchy
#[derive(Debug, Default, Clone)]
pub struct Config {
    /// Operator name recorded on submissions and readings
    pub author: Option<String>,

    /// Editor command for `fct ... edit`
    pub editor: Option<String>,

    /// Default output format
    pub default_format: Option<String>,

    pub compliance: ComplianceConfig,
}

impl Config {
    /// Load configuration from all sources, merging in priority order;
    /// the project layer is read when a project is given
    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/fct/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            config.merge_file(&global_path);
        }

        // 3. Project config (.fct/config.yaml)
        if let Some(project) = project {
            config.merge_file(&project.fct_dir().join("config.yaml"));
        }

        // 4. Environment variables
        if let Ok(author) = std::env::var("FCT_AUTHOR") {
            config.author = Some(author);
        }
        if let Ok(editor) = std::env::var("FCT_EDITOR") {
            config.editor = Some(editor);
        }

        config
    }

    /// Parse configuration from a YAML string on top of the defaults
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        let layer: ConfigLayer = serde_yml::from_str(contents)?;
        let mut config = Config::default();
        config.merge(layer);
        Ok(config)
    }

    fn merge_file(&mut self, path: &std::path::Path) {
        if !path.exists() {
            return;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yml::from_str::<ConfigLayer>(&contents) {
                Ok(layer) => self.merge(layer),
                Err(e) => log::warn!("ignoring unreadable config {}: {}", path.display(), e),
            },
            Err(e) => log::warn!("cannot read config {}: {}", path.display(), e),
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "fct")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another layer into this one (other takes precedence)
    fn merge(&mut self, other: ConfigLayer) {
        if other.author.is_some() {
            self.author = other.author;
        }
        if other.editor.is_some() {
            self.editor = other.editor;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
        if let Some(days) = other.compliance.calibration_warning_days {
            self.compliance.calibration_warning_days = days.max(0);
        }
        if let Some(require) = other.compliance.require_complete {
            self.compliance.require_complete = require;
        }
    }

    /// Get the author name, falling back to git config or username
    pub fn author(&self) -> String {
        if let Some(ref author) = self.author {
            return author.clone();
        }

        if let Ok(output) = std::process::Command::new("git")
            .args(["config", "user.name"])
            .output()
        {
            if output.status.success() {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !name.is_empty() {
                    return name;
                }
            }
        }

        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Get the editor command
    pub fn editor(&self) -> String {
        self.editor
            .clone()
            .or_else(|| std::env::var("EDITOR").ok())
            .or_else(|| std::env::var("VISUAL").ok())
            .unwrap_or_else(|| "vi".to_string())
    }

    /// Run the editor on a file, handling commands with arguments
    /// (e.g., "emacsclient -nw" or "code --wait")
    pub fn run_editor(
        &self,
        file_path: &std::path::Path,
    ) -> std::io::Result<std::process::ExitStatus> {
        let editor = self.editor();
        let parts: Vec<&str> = editor.split_whitespace().collect();

        let Some((cmd, args)) = parts.split_first() else {
            return std::process::Command::new("vi").arg(file_path).status();
        };

        std::process::Command::new(cmd)
            .args(args)
            .arg(file_path)
            .status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.compliance.calibration_warning_days, 30);
        assert!(!config.compliance.require_complete);
    }

    #[test]
    fn test_partial_compliance_section_keeps_defaults() {
        let config = Config::from_yaml("compliance:\n  require_complete: true\n").unwrap();
        assert!(config.compliance.require_complete);
        assert_eq!(config.compliance.calibration_warning_days, 30);
    }

    #[test]
    fn test_negative_horizon_is_clamped() {
        let config = Config::from_yaml(
            "author: Dana\ncompliance:\n  calibration_warning_days: -4\n",
        )
        .unwrap();
        assert_eq!(config.author.as_deref(), Some("Dana"));
        assert_eq!(config.compliance.calibration_warning_days, 0);
    }

    #[test]
    fn test_project_layer_is_read() {
        let tmp = tempfile::tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        std::fs::write(
            project.fct_dir().join("config.yaml"),
            "default_format: json\ncompliance:\n  calibration_warning_days: 7\n",
        )
        .unwrap();

        let config = Config::load_for(Some(&project));
        assert_eq!(config.default_format.as_deref(), Some("json"));
        assert_eq!(config.compliance.calibration_warning_days, 7);
    }
}
