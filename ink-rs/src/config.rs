//! `inkrc` player configuration parser.
//!
//! The file is line oriented:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `set <name>=<value>` or `set <name> <value>` | assign a setting |
//! | Lines starting with `;` | comment, ignored |
//! | Any other command | silently skipped |
//!
//! Recognised settings:
//!
//! | Name         | Meaning                                            |
//! |--------------|----------------------------------------------------|
//! | `seed`       | integer seed for shuffles and `random()`           |
//! | `save`       | default save file for the `save` command           |
//! | `log`        | tracing filter used when `INK_LOG` is unset        |
//! | `width`      | wrap column for story text, `0` disables wrapping  |
//! | `var.<name>` | story variable assigned after the story loads      |

use std::path::{Path, PathBuf};

use crate::script::value::{Number, Value};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Player settings read from `inkrc`.
#[derive(Debug, Default)]
pub struct Config {
    pub seed: Option<u64>,
    pub save: Option<PathBuf>,
    pub log: Option<String>,
    pub width: usize,
    /// `var.<name>` overrides in file order, values unparsed.
    pub vars: Vec<(String, String)>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `inkrc` string.
    ///
    /// Returns the config and a list of any errors on recognised lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let (cmd, args_str) = line
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((line, ""));

            if cmd == "set" {
                let tokens = split_args(args_str.trim());
                if let Err(msg) = config.parse_set(&tokens) {
                    errors.push(ConfigError { line: lineno, message: msg });
                }
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Parse `set <name>=<value>` or `set <name> <value>`.
    fn parse_set(&mut self, tokens: &[String]) -> Result<(), String> {
        if tokens.is_empty() {
            return Err("set: requires an argument".into());
        }

        let (name, value) = if let Some(eq) = tokens[0].find('=') {
            let mut value = tokens[0][eq + 1..].to_owned();
            if tokens.len() > 1 {
                value = std::iter::once(value)
                    .chain(tokens[1..].iter().cloned())
                    .collect::<Vec<_>>()
                    .join(" ");
            }
            (tokens[0][..eq].to_owned(), value)
        } else if tokens.len() >= 2 {
            (tokens[0].clone(), tokens[1..].join(" "))
        } else {
            return Err(format!("set: missing value for '{}'", tokens[0]));
        };

        match name.as_str() {
            "" => return Err("set: setting name cannot be empty".into()),
            "seed" => {
                let seed = value
                    .parse()
                    .map_err(|_| format!("set: seed must be an integer, got '{value}'"))?;
                self.seed = Some(seed);
            }
            "save" => self.save = Some(PathBuf::from(value)),
            "log" => self.log = Some(value),
            "width" => {
                self.width = value
                    .parse()
                    .map_err(|_| format!("set: width must be a number, got '{value}'"))?;
            }
            _ => match name.strip_prefix("var.") {
                Some("") => return Err("set: variable name cannot be empty".into()),
                Some(var) => self.vars.push((var.to_owned(), value)),
                None => return Err(format!("set: unknown setting '{name}'")),
            },
        }
        Ok(())
    }
}

/// Interpret a `var.<name>` value: `true`/`false`, a number, else a string.
pub fn story_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => match Number::parse(raw) {
            Some(n) => Value::Number(n),
            None => Value::Str(raw.to_owned()),
        },
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- split_args -----------------------------------------------------------

    #[test]
    fn split_simple() {
        assert_eq!(split_args("foo bar baz"), ["foo", "bar", "baz"]);
    }

    #[test]
    fn split_quoted_spaces() {
        assert_eq!(split_args(r#"var.name "Ann Lee""#), ["var.name", "Ann Lee"]);
    }

    #[test]
    fn split_escaped_quote_inside_quotes() {
        assert_eq!(split_args(r#""say \"hi\"""#), [r#"say "hi""#]);
    }

    // -- set ------------------------------------------------------------------

    #[test]
    fn set_equals_syntax() {
        let (cfg, errs) = Config::load_str("set seed=42");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.seed, Some(42));
    }

    #[test]
    fn set_space_syntax() {
        let (cfg, errs) = Config::load_str("set width 72");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.width, 72);
    }

    #[test]
    fn set_value_with_spaces() {
        let (cfg, errs) = Config::load_str("set var.greeting hello world");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.vars, [("greeting".to_owned(), "hello world".to_owned())]);
    }

    #[test]
    fn bad_numbers_are_reported_with_line() {
        let (cfg, errs) = Config::load_str("set save=game.json\nset seed=abc\nset width=wide");
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].line, 2);
        assert!(errs[1].to_string().starts_with("line 3:"));
        assert_eq!(cfg.save, Some(PathBuf::from("game.json")));
    }

    #[test]
    fn unknown_setting_is_an_error() {
        let (_, errs) = Config::load_str("set colour=red");
        assert!(errs[0].message.contains("colour"));
    }

    #[test]
    fn missing_value_is_an_error() {
        let (_, errs) = Config::load_str("set seed");
        assert_eq!(errs.len(), 1);
    }

    // -- Comments & skipping --------------------------------------------------

    #[test]
    fn semicolon_comments_ignored() {
        let (cfg, errs) = Config::load_str(
            ";; This is a comment\n\
             ; Also a comment\n\
             set log=ink=debug",
        );
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.log.as_deref(), Some("ink=debug"));
    }

    #[test]
    fn unknown_commands_silently_skipped() {
        let (cfg, errs) = Config::load_str("bind ^A quit\n\nset var.gold=10");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.vars.len(), 1);
    }

    #[test]
    fn story_values_are_typed() {
        assert_eq!(story_value("true"), Value::Bool(true));
        assert_eq!(story_value("2.5"), Value::Number(Number::parse("2.5").unwrap()));
        assert_eq!(story_value("Ann"), Value::from("Ann"));
    }

    #[test]
    fn realistic_inkrc() {
        let src = "\
;; player settings\n\
set seed=7\n\
set save ~/stories/save.json\n\
set width=80\n\
set var.name=\"Ann\"\n\
set var.gold 10\n\
";
        let (cfg, errs) = Config::load_str(src);
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(cfg.seed, Some(7));
        assert_eq!(cfg.width, 80);
        assert_eq!(cfg.vars[0], ("name".to_owned(), "Ann".to_owned()));
        assert_eq!(cfg.vars[1], ("gold".to_owned(), "10".to_owned()));
    }
}
