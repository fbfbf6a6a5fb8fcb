//! Template generation for new catalog files

use chrono::{DateTime, Duration, Utc};
use rust_embed::Embed;
use tera::Tera;
use thiserror::Error;

use crate::core::identity::{EntityId, EntityPrefix};

#[derive(Embed)]
#[folder = "templates/"]
struct EmbeddedTemplates;

/// Context for template generation
#[derive(Debug, Clone)]
pub struct TemplateContext {
    pub author: String,
    pub created: DateTime<Utc>,
    pub title: Option<String>,
    // FORM fields
    pub version_number: u32,
    pub unit: Option<String>,
    pub pass_threshold: Option<f64>,
    pub fail_threshold: Option<f64>,
    // AST / JOB fields
    pub site: Option<String>,
    pub location: Option<String>,
    pub job_id: Option<String>,
    pub assets: Vec<EntityId>,
    // MTR fields
    pub serial_number: Option<String>,
    pub certificate: Option<String>,
    pub calibrated_at: Option<DateTime<Utc>>,
    pub valid_days: i64,
}

impl TemplateContext {
    pub fn new(author: String) -> Self {
        Self {
            author,
            created: Utc::now(),
            title: None,
            version_number: 1,
            unit: None,
            pass_threshold: None,
            fail_threshold: None,
            site: None,
            location: None,
            job_id: None,
            assets: Vec::new(),
            serial_number: None,
            certificate: None,
            calibrated_at: None,
            valid_days: 365,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_version_number(mut self, version_number: u32) -> Self {
        self.version_number = version_number;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_band(mut self, pass_threshold: Option<f64>, fail_threshold: Option<f64>) -> Self {
        self.pass_threshold = pass_threshold;
        self.fail_threshold = fail_threshold;
        self
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_assets(mut self, assets: Vec<EntityId>) -> Self {
        self.assets = assets;
        self
    }

    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_certificate(mut self, certificate: impl Into<String>) -> Self {
        self.certificate = Some(certificate.into());
        self
    }

    pub fn with_calibration(mut self, calibrated_at: DateTime<Utc>, valid_days: i64) -> Self {
        self.calibrated_at = Some(calibrated_at);
        self.valid_days = valid_days;
        self
    }

    fn base_context(&self) -> tera::Context {
        let mut context = tera::Context::new();
        context.insert("author", &self.author);
        context.insert("created", &self.created.to_rfc3339());
        context.insert("created_date", &self.created.format("%Y-%m-%d").to_string());
        context.insert("title", &self.title.clone().unwrap_or_default());
        context
    }
}

/// Template generator using Tera
pub struct TemplateGenerator {
    tera: Tera,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template rendering error: {0}")]
    RenderError(String),
}

/// A rendered catalog file and the ID it was given
#[derive(Debug, Clone)]
pub struct Generated {
    pub id: String,
    pub yaml: String,
}

impl TemplateGenerator {
    /// Create a new template generator with embedded templates
    pub fn new() -> Result<Self, TemplateError> {
        let mut tera = Tera::default();

        for file in EmbeddedTemplates::iter() {
            let filename = file.as_ref();
            if let Some(content) = EmbeddedTemplates::get(filename) {
                if let Ok(template_str) = std::str::from_utf8(&content.data) {
                    tera.add_raw_template(filename, template_str)
                        .map_err(|e| TemplateError::RenderError(e.to_string()))?;
                }
            }
        }

        Ok(Self { tera })
    }

    fn render(&self, name: &str, context: &tera::Context) -> Result<String, TemplateError> {
        if !self.tera.get_template_names().any(|n| n == name) {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        self.tera
            .render(name, context)
            .map_err(|e| TemplateError::RenderError(e.to_string()))
    }

    /// Generate a form version with one repeating and one general template
    pub fn generate_form(&self, ctx: &TemplateContext) -> Result<Generated, TemplateError> {
        let id = EntityId::new(EntityPrefix::Form);
        let mut context = ctx.base_context();
        context.insert("id", &id.to_string());
        context.insert("version_number", &ctx.version_number);
        context.insert(
            "asset_template_id",
            &EntityId::new(EntityPrefix::Tmpl).to_string(),
        );
        context.insert(
            "general_template_id",
            &EntityId::new(EntityPrefix::Tmpl).to_string(),
        );
        context.insert("unit", &ctx.unit.clone().unwrap_or_default());
        context.insert("pass_threshold", &ctx.pass_threshold);
        context.insert("fail_threshold", &ctx.fail_threshold);

        Ok(Generated {
            id: id.to_string(),
            yaml: self.render("form.yaml.tera", &context)?,
        })
    }

    pub fn generate_asset(&self, ctx: &TemplateContext) -> Result<Generated, TemplateError> {
        let id = EntityId::new(EntityPrefix::Ast);
        let mut context = ctx.base_context();
        context.insert("id", &id.to_string());
        context.insert("label", &ctx.title.clone().unwrap_or_default());
        context.insert("location", &ctx.location.clone().unwrap_or_default());
        context.insert("site", &ctx.site.clone().unwrap_or_default());

        Ok(Generated {
            id: id.to_string(),
            yaml: self.render("asset.yaml.tera", &context)?,
        })
    }

    /// Jobs keep the CRM's reference as their ID
    pub fn generate_job(&self, ctx: &TemplateContext) -> Result<Generated, TemplateError> {
        let job_id = ctx
            .job_id
            .clone()
            .ok_or_else(|| TemplateError::RenderError("a job needs a reference".to_string()))?;
        let mut context = ctx.base_context();
        context.insert("job_id", &job_id);
        context.insert("site", &ctx.site.clone().unwrap_or_default());
        let assets: Vec<String> = ctx.assets.iter().map(|a| a.to_string()).collect();
        context.insert("assets", &assets);

        Ok(Generated {
            id: job_id,
            yaml: self.render("job.yaml.tera", &context)?,
        })
    }

    /// Generate a meter with a single active calibration
    pub fn generate_meter(&self, ctx: &TemplateContext) -> Result<Generated, TemplateError> {
        let id = EntityId::new(EntityPrefix::Mtr);
        let calibrated_at = ctx.calibrated_at.unwrap_or(ctx.created);
        let mut context = ctx.base_context();
        context.insert("id", &id.to_string());
        context.insert("name", &ctx.title.clone().unwrap_or_default());
        context.insert(
            "serial_number",
            &ctx.serial_number.clone().unwrap_or_default(),
        );
        context.insert(
            "calibration_id",
            &EntityId::new(EntityPrefix::Cal).to_string(),
        );
        context.insert("calibrated_at", &calibrated_at.to_rfc3339());
        context.insert(
            "expires_at",
            &(calibrated_at + Duration::days(ctx.valid_days)).to_rfc3339(),
        );
        context.insert("certificate", &ctx.certificate.clone().unwrap_or_default());

        Ok(Generated {
            id: id.to_string(),
            yaml: self.render("meter.yaml.tera", &context)?,
        })
    }
}
