//! `%!` directive header of a template file.

use crate::domain::error::TemplateError;

/// Per-template output settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateSettings {
    /// Events this template renders for; empty means every event
    pub events: Vec<String>,
    /// Output filename pattern, rendered through the engine
    pub filename: Option<String>,
    pub topic: Option<String>,
    pub nop: bool,
    pub nofile: bool,
    pub nozmq: bool,
}

impl TemplateSettings {
    pub fn matches_event(&self, event: &str) -> bool {
        self.events.is_empty()
            || self.events.iter().any(|e| e == event || e == "all" || e == "*")
    }
}

/// Split leading directive lines from the body.
///
/// Directives are read until the first line that does not start with `%!`
/// (leading whitespace allowed). Returns the settings and the remaining body.
pub fn parse_settings(text: &str) -> Result<(TemplateSettings, &str), TemplateError> {
    let mut settings = TemplateSettings::default();
    let mut rest = text;
    let mut line = 0;

    loop {
        let trimmed = rest.trim_start_matches([' ', '\t']);
        let Some(directive) = trimmed.strip_prefix("%!") else {
            break;
        };
        line += 1;

        let (row, next) = match directive.split_once('\n') {
            Some((row, next)) => (row, next),
            None => (directive, ""),
        };
        let row = row.trim_end_matches('\r').trim();
        let (name, args) = match row.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (row, ""),
        };

        match name {
            "event" => {
                settings.events = args
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(String::from)
                    .collect();
                if settings.events.is_empty() {
                    return Err(TemplateError::Parse {
                        line,
                        message: String::from("event directive without event names"),
                    });
                }
            }
            "filename" => {
                if args.is_empty() {
                    return Err(TemplateError::Parse {
                        line,
                        message: String::from("filename directive without a pattern"),
                    });
                }
                settings.filename = Some(args.to_string());
            }
            "topic" => {
                if args.is_empty() {
                    return Err(TemplateError::Parse {
                        line,
                        message: String::from("empty topic specified"),
                    });
                }
                settings.topic = Some(args.to_string());
            }
            "nop" => settings.nop = true,
            "nofile" => settings.nofile = true,
            "nozmq" => settings.nozmq = true,
            _ => return Err(TemplateError::Settings(row.to_string())),
        }

        rest = next;
    }

    Ok((settings, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_directives() {
        let (settings, body) = parse_settings("hello %state%").unwrap();
        assert_eq!(settings, TemplateSettings::default());
        assert_eq!(body, "hello %state%");
        assert!(settings.matches_event("match_done"));
    }

    #[test]
    fn test_directives_any_order() {
        let text = "%!nofile\n%!event match_done, locked_out\n  %!topic door\n%!filename out_%time%.json\nbody\n%!event ignored";
        let (settings, body) = parse_settings(text).unwrap();
        assert_eq!(settings.events, vec!["match_done", "locked_out"]);
        assert_eq!(settings.topic.as_deref(), Some("door"));
        assert_eq!(settings.filename.as_deref(), Some("out_%time%.json"));
        assert!(settings.nofile);
        assert!(!settings.nozmq);
        assert_eq!(body, "body\n%!event ignored");
    }

    #[test]
    fn test_event_filter() {
        let (settings, _) = parse_settings("%!event match_done\n").unwrap();
        assert!(settings.matches_event("match_done"));
        assert!(!settings.matches_event("locked_out"));

        let (settings, _) = parse_settings("%!event *\n").unwrap();
        assert!(settings.matches_event("locked_out"));

        let (settings, _) = parse_settings("%!event all\n").unwrap();
        assert!(settings.matches_event("state_change"));
    }

    #[test]
    fn test_unknown_directive() {
        let err = parse_settings("%!bogus 1\nbody").unwrap_err();
        assert!(matches!(err, TemplateError::Settings(s) if s == "bogus 1"));
    }

    #[test]
    fn test_empty_topic() {
        assert!(matches!(
            parse_settings("%!topic\nbody"),
            Err(TemplateError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_nop_only_file() {
        let (settings, body) = parse_settings("%!nop").unwrap();
        assert!(settings.nop);
        assert_eq!(body, "");
    }
}
