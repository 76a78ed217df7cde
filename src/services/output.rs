//! Output dispatcher - renders registered templates when events fire
//!
//! Templates are loaded once at startup. On every emitted event the
//! dispatcher renders each template whose event filter matches, writes the
//! result to its output path and hands it to the publish sink. A template
//! that fails to render is logged and skipped; the others still run.
//! Per-event external commands are rendered through the same engine and
//! spawned after the templates.

use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::error::TemplateError;
use crate::infra::metrics::Metrics;
use crate::io::command::CommandRunner;
use crate::io::output_writer::OutputWriter;
use crate::io::publish_channel::PublishSender;
use crate::services::template::engine::{render, Resolution, Translator};
use crate::services::template::parser::split_argument;
use crate::services::template::settings::{parse_settings, TemplateSettings};

/// A loaded output template
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    /// Default output filename pattern, taken from the load target
    pub target: String,
    pub settings: TemplateSettings,
    pub body: String,
    /// Path produced by the most recent generate pass
    pub generated_path: Option<String>,
}

impl Template {
    pub fn topic(&self) -> &str {
        self.settings.topic.as_deref().unwrap_or(&self.name)
    }
}

/// Result of rendering one template for an event
#[derive(Debug, Clone)]
pub struct RenderedOutput {
    pub template: String,
    pub path: PathBuf,
    pub body: String,
    pub written: bool,
    pub published: bool,
}

/// Split an optional leading `[name]` marker off a target argument.
///
/// The marker may precede the whole argument or the final path component.
pub fn split_template_name(spec: &str) -> (Option<String>, String) {
    fn strip(s: &str) -> Option<(&str, &str)> {
        let (name, rest) = s.strip_prefix('[')?.split_once(']')?;
        (!name.is_empty()).then_some((name, rest))
    }

    if let Some((name, rest)) = strip(spec) {
        return (Some(name.to_string()), rest.to_string());
    }
    if let Some(idx) = spec.rfind('/') {
        let (dir, base) = spec.split_at(idx + 1);
        if let Some((name, rest)) = strip(base) {
            return (Some(name.to_string()), format!("{dir}{rest}"));
        }
    }
    (None, spec.to_string())
}

/// Whitespace and `:` are not safe in generated filenames
fn sanitize_filename(name: &str) -> String {
    name.chars().map(|c| if c.is_whitespace() || c == ':' { '_' } else { c }).collect()
}

/// Adds `template_path[:name]` on top of a state translator
struct DispatchTranslator<'a> {
    inner: &'a dyn Translator,
    templates: &'a [Template],
}

impl Translator for DispatchTranslator<'_> {
    fn translate(&self, var: &str) -> Result<Resolution, TemplateError> {
        let (name, arg) = split_argument(var);
        if name != "template_path" {
            return self.inner.translate(var);
        }

        let template = match arg {
            Some(wanted) => self.templates.iter().find(|t| t.name == wanted),
            None => self.templates.first(),
        };
        match template {
            Some(t) => match &t.generated_path {
                Some(path) => Ok(Resolution::Value(path.clone())),
                None => Err(TemplateError::unresolved(
                    var,
                    format!("template \"{}\" has not been generated", t.name),
                )),
            },
            None => Err(TemplateError::unresolved(var, "no such template")),
        }
    }
}

pub struct OutputDispatcher {
    templates: Vec<Template>,
    commands: FxHashMap<String, String>,
    writer: OutputWriter,
    publisher: Option<PublishSender>,
    runner: Option<CommandRunner>,
    metrics: Option<Arc<Metrics>>,
}

impl OutputDispatcher {
    pub fn new(writer: OutputWriter) -> Self {
        Self {
            templates: Vec::new(),
            commands: FxHashMap::default(),
            writer,
            publisher: None,
            runner: None,
            metrics: None,
        }
    }

    pub fn with_publisher(mut self, publisher: PublishSender) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Register `event name -> command line` pairs run after each event
    pub fn with_commands(mut self, commands: FxHashMap<String, String>, runner: CommandRunner) -> Self {
        self.commands = commands;
        self.runner = Some(runner);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn writer(&self) -> &OutputWriter {
        &self.writer
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// True if a template or command would react to `event`
    pub fn wants(&self, event: &str) -> bool {
        self.commands.contains_key(event)
            || self.templates.iter().any(|t| !t.settings.nop && t.settings.matches_event(event))
    }

    /// Load a template file, `[name]path/to/file` naming it explicitly
    pub fn load(&mut self, spec: &str) -> Result<&Template, TemplateError> {
        let (name, path) = split_template_name(spec);
        let text = std::fs::read_to_string(&path)
            .map_err(|source| TemplateError::Io { path: PathBuf::from(&path), source })?;
        let target = Path::new(&path)
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());
        self.register(&text, target, name)
    }

    /// Register an inline template; `target` is its output filename pattern,
    /// optionally prefixed by `[name]`
    pub fn add_template(&mut self, text: &str, target: &str) -> Result<&Template, TemplateError> {
        let (name, target) = split_template_name(target);
        self.register(text, target, name)
    }

    fn register(
        &mut self,
        text: &str,
        target: String,
        name: Option<String>,
    ) -> Result<&Template, TemplateError> {
        let (settings, body) = parse_settings(text)?;
        let name = name.unwrap_or_else(|| self.templates.len().to_string());

        if let Some(existing) = self.templates.iter().find(|t| t.name == name) {
            warn!(name = %existing.name, "template_name_duplicate");
        }

        info!(
            name = %name,
            target = %settings.filename.as_deref().unwrap_or(&target),
            events = ?settings.events,
            nop = settings.nop,
            "template_loaded"
        );

        self.templates.push(Template {
            name,
            target,
            settings,
            body: body.to_string(),
            generated_path: None,
        });
        Ok(&self.templates[self.templates.len() - 1])
    }

    /// Render arbitrary template text with `template_path` support
    pub fn render_with(&self, raw: &str, ctx: &dyn Translator) -> Result<String, TemplateError> {
        let translator = DispatchTranslator { inner: ctx, templates: &self.templates };
        render(raw, &translator)
    }

    /// Dry-run render of `body`, reporting the failure if any
    pub fn check(&self, body: &str, ctx: &dyn Translator) -> Result<(), TemplateError> {
        let (_, body) = parse_settings(body)?;
        self.render_with(body, ctx).map(|_| ())
    }

    pub fn validate(&self, body: &str, ctx: &dyn Translator) -> bool {
        match self.check(body, ctx) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "template_invalid");
                false
            }
        }
    }

    fn output_path(&self, idx: usize, ctx: &dyn Translator) -> Result<PathBuf, TemplateError> {
        let template = &self.templates[idx];
        let dir = self.render_with("%template_output_path%", ctx)?;
        let pattern = template.settings.filename.as_deref().unwrap_or(&template.target);
        let filename = sanitize_filename(&self.render_with(pattern, ctx)?);
        Ok(Path::new(&dir).join(filename))
    }

    /// Render every template subscribed to `event`
    pub fn generate(&mut self, event: &str, ctx: &dyn Translator) -> Vec<RenderedOutput> {
        let mut outputs = Vec::new();

        for t in &mut self.templates {
            t.generated_path = None;
        }

        for idx in 0..self.templates.len() {
            {
                let t = &self.templates[idx];
                if t.settings.nop || !t.settings.matches_event(event) {
                    continue;
                }
            }

            let path = match self.output_path(idx, ctx) {
                Ok(path) => path,
                Err(e) => {
                    self.report_failure(idx, event, &e);
                    continue;
                }
            };

            // Set before rendering so the body can refer to its own path
            self.templates[idx].generated_path = Some(path.to_string_lossy().into_owned());

            let body = match self.render_with(&self.templates[idx].body, ctx) {
                Ok(body) => body,
                Err(e) => {
                    self.templates[idx].generated_path = None;
                    self.report_failure(idx, event, &e);
                    continue;
                }
            };

            let t = &self.templates[idx];
            let written = !t.settings.nofile && self.writer.write(&path, body.as_bytes());
            let published = match (&self.publisher, t.settings.nozmq) {
                (Some(publisher), false) => {
                    let ok = publisher.publish(t.topic(), body.clone());
                    if !ok {
                        if let Some(m) = &self.metrics {
                            m.record_publish_dropped();
                        }
                    }
                    ok
                }
                _ => false,
            };

            if let Some(m) = &self.metrics {
                m.record_template(true);
            }
            debug!(
                template = %t.name,
                event = %event,
                path = %path.display(),
                written = written,
                published = published,
                "template_generated"
            );

            outputs.push(RenderedOutput {
                template: t.name.clone(),
                path,
                body,
                written,
                published,
            });
        }

        self.run_command(event, ctx);
        outputs
    }

    fn report_failure(&self, idx: usize, event: &str, error: &TemplateError) {
        warn!(
            template = %self.templates[idx].name,
            event = %event,
            error = %error,
            "template_render_failed"
        );
        if let Some(m) = &self.metrics {
            m.record_template(false);
        }
    }

    fn run_command(&self, event: &str, ctx: &dyn Translator) {
        let (Some(runner), Some(cmd)) = (&self.runner, self.commands.get(event)) else {
            return;
        };
        match self.render_with(cmd, ctx) {
            Ok(cmdline) => {
                if runner.spawn(event, cmdline) {
                    if let Some(m) = &self.metrics {
                        m.record_command_spawned();
                    }
                }
            }
            Err(e) => warn!(event = %event, error = %e, "command_render_failed"),
        }
    }
}
