#![doc = include_str!("../README.md")]

mod collaborators;
mod defaults;
mod key;
mod service;
mod values;

pub use collaborators::{ThemeManager, TranslationService};
pub use defaults::ConfigurationDefaults;
pub use key::{keys, Key};
pub use service::{ConfigurationError, ConfigurationService};
pub use values::ConfigurationValues;
