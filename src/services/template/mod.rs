//! Template engine for the `%var%` output language
//!
//! - `parser` - tokenizes bodies into literals and variable references
//! - `settings` - `%!` directive header
//! - `engine` - renderer with nested path resolution and cycle detection
//! - `translator` - variable lookup against controller state snapshots
//! - `strftime` - time formatting for `time`-family variables

pub mod engine;
pub mod parser;
pub mod settings;
pub mod strftime;
pub mod translator;

pub use engine::{render, validate, Resolution, Translator, MAX_RECURSION};
pub use settings::{parse_settings, TemplateSettings};
pub use translator::TranslatorContext;
