//! Renderer for the `%var%` language
//!
//! Variables are looked up through a [`Translator`]. A translator may answer
//! with a plain value or with raw template text that must itself be rendered
//! (the output path variables do this). Nested rendering keeps an explicit
//! stack of the variables being expanded so that a chain which revisits a
//! name fails with [`TemplateError::Cycle`] instead of recursing forever.

use crate::domain::error::TemplateError;
use crate::services::template::parser::{parse, Segment};

/// Maximum nesting of variables that expand to further template text
pub const MAX_RECURSION: usize = 10;

/// Result of looking up one variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Value(String),
    /// Raw template text that needs rendering in turn
    Nested(String),
}

/// Lookup capability bound to a read-only view of controller state
pub trait Translator {
    /// Resolve `var`, which may carry a `:arg` suffix
    fn translate(&self, var: &str) -> Result<Resolution, TemplateError>;
}

impl<T: Translator + ?Sized> Translator for &T {
    fn translate(&self, var: &str) -> Result<Resolution, TemplateError> {
        (**self).translate(var)
    }
}

/// Render `body` against `translator`
pub fn render(body: &str, translator: &dyn Translator) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(body.len() * 2);
    let mut stack = Vec::new();
    render_into(body, translator, &mut stack, &mut out)?;
    Ok(out)
}

/// Dry-run render; reports the first parse or resolution failure
pub fn validate(body: &str, translator: &dyn Translator) -> Result<(), TemplateError> {
    render(body, translator).map(|_| ())
}

fn render_into(
    body: &str,
    translator: &dyn Translator,
    stack: &mut Vec<String>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for segment in parse(body)? {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Percent => out.push('%'),
            Segment::Variable { name, .. } => match translator.translate(name)? {
                Resolution::Value(value) => out.push_str(&value),
                Resolution::Nested(raw) => {
                    if stack.iter().any(|v| v == name) || stack.len() >= MAX_RECURSION {
                        let mut chain = stack.join(" -> ");
                        chain.push_str(" -> ");
                        chain.push_str(name);
                        return Err(TemplateError::Cycle(chain));
                    }
                    stack.push(name.to_string());
                    render_into(&raw, translator, stack, out)?;
                    stack.pop();
                }
            },
        }
    }
    Ok(())
}
