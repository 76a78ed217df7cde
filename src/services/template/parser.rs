//! Tokenizer for the `%var%` substitution language.

use crate::domain::error::TemplateError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    /// `%%`
    Percent,
    Variable { name: &'a str, line: usize },
}

/// Split a template body into literal text and variable references.
///
/// Variables must close on the line they open; a missing closing `%` is a
/// parse error for the whole body. Line numbers are 1-based.
pub fn parse(body: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let bytes = body.as_bytes();
    let mut line = 1;
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                line += 1;
                i += 1;
            }
            b'%' => {
                if literal_start < i {
                    segments.push(Segment::Literal(&body[literal_start..i]));
                }

                if bytes.get(i + 1) == Some(&b'%') {
                    segments.push(Segment::Percent);
                    i += 2;
                    literal_start = i;
                    continue;
                }

                let start = i + 1;
                let end = body[start..]
                    .find(['%', '\n'])
                    .map(|off| start + off)
                    .filter(|&end| bytes[end] == b'%');

                let Some(end) = end else {
                    let rest = &body[start..];
                    let name = rest.split('\n').next().unwrap_or(rest);
                    return Err(TemplateError::Parse {
                        line,
                        message: format!("variable \"{name}\" not terminated"),
                    });
                };

                segments.push(Segment::Variable { name: &body[start..end], line });
                i = end + 1;
                literal_start = i;
            }
            _ => i += 1,
        }
    }

    if literal_start < bytes.len() {
        segments.push(Segment::Literal(&body[literal_start..]));
    }

    Ok(segments)
}

/// Split `name:arg` at the first colon
pub fn split_argument(var: &str) -> (&str, Option<&str>) {
    match var.split_once(':') {
        Some((name, arg)) => (name, Some(arg)),
        None => (var, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_percent() {
        let segs = parse("abc%%def").unwrap();
        assert_eq!(
            segs,
            vec![Segment::Literal("abc"), Segment::Percent, Segment::Literal("def")]
        );
    }

    #[test]
    fn test_variables_and_lines() {
        let segs = parse("state: %state%\nid %match_group_id:4%!").unwrap();
        assert_eq!(
            segs,
            vec![
                Segment::Literal("state: "),
                Segment::Variable { name: "state", line: 1 },
                Segment::Literal("\nid "),
                Segment::Variable { name: "match_group_id:4", line: 2 },
                Segment::Literal("!"),
            ]
        );
    }

    #[test]
    fn test_unterminated_at_newline() {
        let err = parse("ok\n%state\n%").unwrap_err();
        match err {
            TemplateError::Parse { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("\"state\""));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unterminated_at_end() {
        assert!(matches!(parse("abc %time"), Err(TemplateError::Parse { line: 1, .. })));
    }

    #[test]
    fn test_split_argument() {
        assert_eq!(split_argument("time:@H:@M"), ("time", Some("@H:@M")));
        assert_eq!(split_argument("state"), ("state", None));
    }
}
