pub(crate) mod blocks;
pub mod engine;
pub mod error;
pub mod format;
pub mod scope;
pub mod script;
pub mod value;

pub use engine::{Engine, ProcessingMode, Report};
pub use error::{DiagnosticError, ExpandError};
pub use format::{FormatContext, Formatter, Formatters};
pub use value::{ModelObject, Value};
