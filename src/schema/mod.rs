//! Schema system - validation and template generation for catalog files

pub mod registry;
pub mod template;
pub mod validator;

pub use registry::SchemaRegistry;
pub use template::{Generated, TemplateContext, TemplateError, TemplateGenerator};
pub use validator::{ValidationError, Validator};
