//! Template check tool
//!
//! Loads output templates and renders them against a sample finished session
//! so mistakes show up before the controller is deployed. Exits non-zero if
//! any template fails to load or render.

use catflap_gate::infra::Config;
use catflap_gate::io::OutputWriter;
use catflap_gate::services::template::TranslatorContext;
use catflap_gate::services::{AdmissionSettings, OutputDispatcher};
use chrono::Local;
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "catflap-template-check", about = "Validate output templates against a sample session")]
struct Args {
    /// Template files, optionally prefixed with `[name]`
    templates: Vec<String>,

    /// Configuration to take output paths and templates from
    #[arg(short, long)]
    config: Option<String>,

    /// Print each rendered body
    #[arg(long)]
    print: bool,

    /// Render as if this event fired, writing nothing
    #[arg(long)]
    event: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("config: {e:#}");
                return ExitCode::from(1);
            }
        },
        None => Config::default(),
    };

    let mut specs: Vec<String> = config.templates().to_vec();
    specs.extend(args.templates.iter().cloned());
    if specs.is_empty() {
        eprintln!("no templates given");
        return ExitCode::from(2);
    }

    let mut output = OutputDispatcher::new(OutputWriter::dry_run());
    let mut failures = 0;
    for spec in &specs {
        if let Err(e) = output.load(spec) {
            println!("FAIL  {spec}: {e}");
            failures += 1;
        }
    }

    let settings = Arc::new(AdmissionSettings::from_config(&config));
    let ctx = TranslatorContext::sample(settings, Local::now());

    for template in output.templates() {
        let events = if template.settings.events.is_empty() {
            String::from("all")
        } else {
            template.settings.events.join(",")
        };
        match output.render_with(&template.body, &ctx) {
            Ok(body) => {
                println!("OK    {} -> {} [{}]", template.name, template.target, events);
                if args.print {
                    println!("{body}");
                }
            }
            Err(e) => {
                println!("FAIL  {}: {e}", template.name);
                failures += 1;
            }
        }
    }

    if let Some(event) = &args.event {
        let rendered = output.generate(event, &ctx);
        println!("{} output(s) for event {event}", rendered.len());
        for r in &rendered {
            println!("  {} -> {}", r.template, r.path.display());
        }
    }

    if failures > 0 {
        println!("{failures} template(s) failed");
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
