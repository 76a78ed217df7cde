//! Variable lookup against a snapshot of controller state.

use bytes::Bytes;
use chrono::{DateTime, Local};
use std::path::Path;
use std::sync::Arc;

use crate::domain::error::TemplateError;
use crate::domain::match_group::{ContentId, MatchGroup, MatchGroupTracker, MatchState, MATCH_MAX_COUNT};
use crate::domain::types::{MatchDirection, MatchResult, MatchStep, RfidRead, RfidReader, StateName, MAX_STEPS};
use crate::services::admission::AdmissionSettings;
use crate::services::rfid_check::RfidCheck;
use crate::services::template::engine::{Resolution, Translator};
use crate::services::template::parser::split_argument;
use crate::services::template::strftime::format_time;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const GIT_HASH_SHORT: &str = env!("GIT_HASH_SHORT");
pub const GIT_TAINTED: &str = env!("GIT_TAINTED");

/// Read-only view handed to the output dispatcher for one event
#[derive(Debug, Clone)]
pub struct TranslatorContext {
    pub state: StateName,
    pub prev_state: StateName,
    pub group: MatchGroup,
    pub rfid: RfidCheck,
    pub settings: Arc<AdmissionSettings>,
    pub now: DateTime<Local>,
}

fn value(s: impl Into<String>) -> Result<Resolution, TemplateError> {
    Ok(Resolution::Value(s.into()))
}

fn flag(b: bool) -> Result<Resolution, TemplateError> {
    value(if b { "1" } else { "0" })
}

fn absolute(path: &str) -> String {
    let p = Path::new(path);
    if p.is_absolute() {
        return path.to_string();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(p).to_string_lossy().into_owned(),
        Err(_) => path.to_string(),
    }
}

/// Parse a `:N` id length; N must be at least 1, large values clamp
fn short_id(var: &str, id: &ContentId, arg: Option<&str>) -> Result<Resolution, TemplateError> {
    let Some(arg) = arg else {
        return value(id.to_hex());
    };
    match arg.trim().parse::<i64>() {
        Ok(n) if n >= 1 => value(id.truncated(n as usize)),
        Ok(n) => Err(TemplateError::unresolved(var, format!("id length {n} must be at least 1"))),
        Err(_) => Err(TemplateError::unresolved(var, format!("invalid id length \"{arg}\""))),
    }
}

/// Split `<digits>_<rest>` as used by `match<N>_` and `step<M>_`
fn indexed(s: &str) -> Option<(usize, &str)> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    let idx = s[..digits].parse().ok()?;
    let rest = s[digits..].strip_prefix('_')?;
    Some((idx, rest))
}

impl TranslatorContext {
    /// A finished four-attempt session with one step per match and a valid
    /// inner tag, for checking templates without a running controller
    pub fn sample(settings: Arc<AdmissionSettings>, now: DateTime<Local>) -> Self {
        let start = now - chrono::Duration::seconds(2);
        let mut tracker = MatchGroupTracker::new();
        tracker.start_session(&settings.output_path, Bytes::from_static(b"obstruct"), start);
        for (i, score) in [0.92, 0.41, 0.88, 0.95].into_iter().enumerate() {
            let time = start + chrono::Duration::milliseconds(250 * (i as i64 + 1));
            let mut result = MatchResult::new(score, score >= settings.match_threshold, MatchDirection::In)
                .with_description(if score >= settings.match_threshold { "Match" } else { "No match" });
            // One step always fits
            let _ = result.push_step(MatchStep::new("threshold", "Thresholded frame"));
            let mut state = MatchState::new(time, Bytes::from_static(b"match"), result);
            state.path = settings.output_path.clone();
            state.filename = format!("match_{}__{}.png", time.format("%Y-%m-%d_%H_%M_%S%.6f"), i + 1);
            state.full_path = format!("{}/{}", state.path, state.filename);
            if tracker.record(state).is_err() {
                break;
            }
        }
        tracker.finalize(settings.ok_matches_needed, now);

        let mut rfid = RfidCheck::new(true, false, vec![String::from("999_000000001007")]);
        rfid.on_read(&RfidRead { reader: RfidReader::Inner, tag: String::from("999_000000001007"), complete: true });

        Self {
            state: StateName::KeepOpen,
            prev_state: StateName::Matching,
            group: tracker.group().clone(),
            rfid,
            settings,
            now,
        }
    }

    fn time_var(
        &self,
        var: &str,
        time: Option<DateTime<Local>>,
        arg: Option<&str>,
    ) -> Result<Resolution, TemplateError> {
        match time {
            Some(t) => value(format_time(var, &t, arg)?),
            None => Err(TemplateError::unresolved(var, "time not set")),
        }
    }

    fn output_path(&self, name: &str) -> Option<&str> {
        let s = &self.settings;
        match name {
            "output_path" => Some(&s.output_path),
            "match_output_path" => Some(&s.match_output_path),
            "steps_output_path" => Some(&s.steps_output_path),
            "obstruct_output_path" => Some(&s.obstruct_output_path),
            "template_output_path" => Some(&s.template_output_path),
            _ => None,
        }
    }

    fn settings_var(&self, name: &str) -> Option<String> {
        let s = &self.settings;
        let v = match name {
            "matcher" => s.matcher.clone(),
            "match_threshold" => format!("{:.6}", s.match_threshold),
            "ok_matches_needed" => s.ok_matches_needed.to_string(),
            "matchtime" => format!("{}", s.match_time),
            "lockout_method" => s.lockout_method.as_number().to_string(),
            "lockout_time" => format!("{}", s.lockout_time),
            "lockout_error" => s.max_consecutive.to_string(),
            "lockout_error_delay" => format!("{:.2}", s.consecutive_delay),
            _ => return None,
        };
        Some(v)
    }

    fn group_var(&self, var: &str, name: &str, arg: Option<&str>) -> Option<Result<Resolution, TemplateError>> {
        let g = &self.group;
        let res = match name {
            "match_group_id" => short_id(var, &g.id, arg),
            "match_group_start_time" => self.time_var(var, g.start_time, arg),
            "match_group_end_time" => self.time_var(var, g.end_time, arg),
            "match_group_success" | "match_success" => flag(g.success),
            "match_group_success_count" => value(g.success_count.to_string()),
            "match_group_final_decision" => flag(g.final_decision),
            "match_group_direction" => value(g.direction.as_str()),
            "match_group_description" | "match_group_desc" => value(g.description.clone()),
            "match_group_count" | "match_count" => value(g.count().to_string()),
            "match_group_max_count" => value(MATCH_MAX_COUNT.to_string()),
            "obstruct_filename" => value(g.obstruct.filename.clone()),
            "obstruct_path" => value(g.obstruct.path.clone()),
            "abs_obstruct_path" => value(absolute(&g.obstruct.path)),
            "obstruct_full_path" => value(g.obstruct.full_path.clone()),
            "abs_obstruct_full_path" => value(absolute(&g.obstruct.full_path)),
            "obstruct_time" => self.time_var(var, g.obstruct.time, arg),
            _ => return None,
        };
        Some(res)
    }

    fn rfid_var(&self, name: &str) -> Option<Result<Resolution, TemplateError>> {
        let r = &self.rfid;
        let res = match name {
            "rfid_direction" => value(r.direction().as_str()),
            "rfid_inner_tag" => value(r.reader(RfidReader::Inner).tag.clone()),
            "rfid_outer_tag" => value(r.reader(RfidReader::Outer).tag.clone()),
            "rfid_inner_valid" => flag(r.reader(RfidReader::Inner).allowed),
            "rfid_outer_valid" => flag(r.reader(RfidReader::Outer).allowed),
            _ => return None,
        };
        Some(res)
    }

    /// `matchcur_<field>` or `match<N>_<field>`
    fn match_var(&self, var: &str, name: &str, arg: Option<&str>) -> Option<Result<Resolution, TemplateError>> {
        let count = self.group.count();
        let (m, field) = if let Some(field) = name.strip_prefix("matchcur_") {
            match self.group.last() {
                Some(m) => (m, field),
                None => return Some(Err(TemplateError::unresolved(var, "no match recorded yet"))),
            }
        } else {
            let (idx, field) = indexed(name.strip_prefix("match")?)?;
            if idx < 1 || idx > MATCH_MAX_COUNT {
                return Some(Err(TemplateError::unresolved(
                    var,
                    format!("match index {idx} outside 1..={MATCH_MAX_COUNT}"),
                )));
            }
            if idx > count {
                return Some(Err(TemplateError::unresolved(
                    var,
                    format!("match {idx} not recorded ({count} so far)"),
                )));
            }
            (&self.group.matches()[idx - 1], field)
        };
        Some(self.match_field(var, m, field, arg))
    }

    fn match_field(
        &self,
        var: &str,
        m: &MatchState,
        field: &str,
        arg: Option<&str>,
    ) -> Result<Resolution, TemplateError> {
        match field {
            "path" => value(m.path.clone()),
            "abs_path" => value(absolute(&m.path)),
            "full_path" => value(m.full_path.clone()),
            "abs_full_path" => value(absolute(&m.full_path)),
            "filename" => value(m.filename.clone()),
            "id" => short_id(var, &m.id, arg),
            "success" => flag(m.result.success),
            "direction" => value(m.result.direction.as_str()),
            "desc" | "description" => value(m.result.description.clone()),
            "result" => value(format!("{:.6}", m.result.score)),
            "time" => self.time_var(var, Some(m.time), arg),
            "step_count" => value(m.result.steps().len().to_string()),
            _ => {
                let Some((idx, step_field)) = field.strip_prefix("step").and_then(indexed) else {
                    return Err(TemplateError::unresolved(var, format!("unknown match field \"{field}\"")));
                };
                if idx < 1 || idx > MAX_STEPS {
                    return Err(TemplateError::unresolved(
                        var,
                        format!("step index {idx} outside 1..={MAX_STEPS}"),
                    ));
                }
                let empty = MatchStep::default();
                let step = m.result.steps().get(idx - 1).unwrap_or(&empty);
                step_field_value(var, step, step_field)
            }
        }
    }
}

fn step_field_value(var: &str, step: &MatchStep, field: &str) -> Result<Resolution, TemplateError> {
    match field {
        "path" => value(step.path.clone()),
        "abs_path" => value(absolute(&step.path)),
        "full_path" => value(step.full_path.clone()),
        "abs_full_path" => value(absolute(&step.full_path)),
        "filename" => value(step.filename.clone()),
        "name" => value(step.name.clone()),
        "desc" | "description" => value(step.description.clone()),
        "active" => flag(step.image.is_some()),
        _ => Err(TemplateError::unresolved(var, format!("unknown step field \"{field}\""))),
    }
}

impl Translator for TranslatorContext {
    fn translate(&self, var: &str) -> Result<Resolution, TemplateError> {
        let (name, arg) = split_argument(var);

        if let Some(raw) = self.output_path(name) {
            return Ok(Resolution::Nested(raw.to_string()));
        }

        match name {
            "time" => return value(format_time(var, &self.now, arg)?),
            "state" => return value(self.state.as_str()),
            "prev_state" => return value(self.prev_state.as_str()),
            "git_commit" | "git_hash" => return value(GIT_HASH),
            "git_commit_short" | "git_hash_short" => return value(GIT_HASH_SHORT),
            "git_tainted" => return value(GIT_TAINTED),
            "version" => return value(VERSION),
            "cwd" => {
                return std::env::current_dir()
                    .map(|p| Resolution::Value(p.to_string_lossy().into_owned()))
                    .map_err(|e| TemplateError::unresolved(var, e.to_string()))
            }
            _ => {}
        }

        if let Some(v) = self.settings_var(name) {
            return value(v);
        }
        if let Some(res) = self.group_var(var, name, arg) {
            return res;
        }
        if let Some(res) = self.rfid_var(name) {
            return res;
        }
        if let Some(res) = self.match_var(var, name, arg) {
            return res;
        }

        Err(TemplateError::unresolved(var, "unknown variable"))
    }
}
