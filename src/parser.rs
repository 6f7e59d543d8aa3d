//! Host command-line parser and dispatcher.
//!
//! The top-level entry points are [`parse_line`] and [`dispatch`]. Lines are
//! split into words the way the host interpreter splits them: on whitespace,
//! with `"..."` and `{...}` grouping a word.

use crate::command::{HostCommand, HostContext};
use crate::commands::{Channel, Play, Poll, Submit, Version};
use anyhow::{Result, anyhow};
use tracing::debug;

type ParseFn = fn(&[String]) -> Result<Box<dyn HostCommand>>;

static REGISTRY: &[(&str, &str, ParseFn)] = &[
    (Submit::NAME, Submit::USAGE, Submit::parse_boxed),
    (Channel::NAME, Channel::USAGE, Channel::parse_boxed),
    (Play::NAME, Play::USAGE, Play::parse_boxed),
    (Poll::NAME, Poll::USAGE, Poll::parse_boxed),
    (Version::NAME, Version::USAGE, Version::parse_boxed),
];

/// Names and usage lines of every host command, for registering them with
/// the host's scripting surface.
///
/// ```
/// let names: Vec<_> = linepacer::registered_commands().map(|(name, _)| name).collect();
/// assert_eq!(names, ["ex", "chan", "play", "poll", "version"]);
/// ```
pub fn registered_commands() -> impl Iterator<Item = (&'static str, &'static str)> {
    REGISTRY.iter().map(|(name, usage, _)| (*name, *usage))
}

/// Parse one host command line. A leading `/` on the command name is
/// accepted.
///
/// # Errors
///
/// Returns an error for an empty line, an unknown command, arguments the
/// command does not accept, or an unclosed quote or brace.
pub fn parse_line(line: &str) -> Result<Box<dyn HostCommand>> {
    let words = split_words(line)?;
    let (name, args) = words
        .split_first()
        .ok_or_else(|| anyhow!("Empty command line"))?;
    let &(_, _, parse) = lookup(name)?;
    parse(args)
}

/// Parse and run one host command line.
///
/// Arguments that do not parse echo the command's usage line to the host
/// instead of failing, as the host's own commands do.
pub async fn dispatch(line: &str, ctx: &mut HostContext<'_>) -> Result<Option<String>> {
    let words = split_words(line)?;
    let Some((name, args)) = words.split_first() else {
        return Ok(None);
    };
    let &(name, usage, parse) = lookup(name)?;
    match parse(args) {
        Ok(command) => command.execute(ctx).await,
        Err(err) => {
            debug!(command = name, error = %err, "bad arguments");
            ctx.echo(usage)?;
            Ok(None)
        }
    }
}

fn lookup(name: &str) -> Result<&'static (&'static str, &'static str, ParseFn)> {
    let name = name.strip_prefix('/').unwrap_or(name);
    REGISTRY
        .iter()
        .find(|(cmd_name, _, _)| cmd_name.eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow!("Unknown command: {}", name))
}

/// Split a command line into words.
///
/// Inside `"..."` the escapes `\"`, `\\`, `\n` and `\t` are processed; `{...}`
/// is taken literally and may nest.
pub(crate) fn split_words(line: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut chars = line.trim().chars().peekable();

    while let Some(&ch) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }
        let mut word = String::new();
        match ch {
            '"' => {
                chars.next();
                let mut closed = false;
                while let Some(ch) = chars.next() {
                    match ch {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some('n') => word.push('\n'),
                            Some('t') => word.push('\t'),
                            Some(other) => word.push(other),
                            None => word.push('\\'),
                        },
                        _ => word.push(ch),
                    }
                }
                if !closed {
                    return Err(anyhow!("Expected string to end with '\"'"));
                }
            }
            '{' => {
                chars.next();
                let mut depth = 1;
                for ch in chars.by_ref() {
                    match ch {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    word.push(ch);
                }
                if depth != 0 {
                    return Err(anyhow!("Expected word to end with '}}'"));
                }
            }
            _ => {
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() {
                        break;
                    }
                    word.push(ch);
                    chars.next();
                }
            }
        }
        words.push(word);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_plain_words() {
        assert_eq!(
            split_words("  play #chan  song.txt 200 ").unwrap(),
            vec!["play", "#chan", "song.txt", "200"]
        );
    }

    #[test]
    fn test_split_quoted_words() {
        assert_eq!(
            split_words(r#"ex "hello \"world\"\n""#).unwrap(),
            vec!["ex", "hello \"world\"\n"]
        );
        assert_eq!(split_words(r#"ex """#).unwrap(), vec!["ex", ""]);
    }

    #[test]
    fn test_split_braced_words() {
        assert_eq!(
            split_words("ex {a {nested} b} c").unwrap(),
            vec!["ex", "a {nested} b", "c"]
        );
    }

    #[test]
    fn test_split_unclosed() {
        assert!(split_words(r#"ex "unclosed"#).is_err());
        assert!(split_words("ex {unclosed").is_err());
    }

    #[test]
    fn test_parse_all_commands() {
        let names: Vec<_> = ["ex hi", "chan #a", "play stop", "poll", "version"]
            .iter()
            .map(|line| parse_line(line).unwrap().name())
            .collect();
        assert_eq!(names, vec!["ex", "chan", "play", "poll", "version"]);
    }

    #[test]
    fn test_parse_accepts_slash_and_case() {
        assert_eq!(parse_line("/PLAY stop").unwrap().name(), "play");
    }

    #[test]
    fn test_parse_invalid_command() {
        let err = parse_line("unknown_command \"test\"")
            .err()
            .unwrap()
            .to_string();
        assert!(err.contains("Unknown command"), "got: {err}");
    }

    #[test]
    fn test_parse_bad_arity() {
        assert!(parse_line("chan").is_err());
        assert!(parse_line("ex a b").is_err());
        assert!(parse_line("play a b c d").is_err());
    }

    #[test]
    fn test_registered_commands_have_usage() {
        let registered: Vec<_> = registered_commands().collect();
        assert_eq!(registered.len(), 5);
        assert!(registered.contains(&("chan", "Usage: /chan <channel>")));
    }
}
