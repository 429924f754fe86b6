//! StackFlow template loading
//!
//! Reads stack templates from disk. YAML templates may use the short
//! CloudFormation intrinsic-function syntax (`!Ref`, `!Sub`, `!GetAtt`, ...),
//! which is expanded into the long JSON form before the template is
//! staged or compared.

pub mod error;
pub mod intrinsic;
pub mod loader;
pub mod yaml;

pub use error::{Result, TemplateError};
pub use intrinsic::Intrinsic;
pub use loader::{TemplateFormat, load_template};
pub use yaml::{parse_yaml, to_json};
