//! Command-line argument parsing.
//!
//! Usage:
//!   ink [-f[<file>]] [-s<seed>] [-l<save>] [-w<save>] [-qd] <story.ink>

use std::path::PathBuf;

use directories::ProjectDirs;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Which player config file to read.
    pub config: ConfigFile,
    /// Random seed (`-s<seed>`).
    pub seed: Option<u64>,
    /// Saved state to restore before playing (`-l<save>`).
    pub load: Option<PathBuf>,
    /// Where the `save` command writes (`-w<save>`).
    pub save: Option<PathBuf>,
    /// Plain output without banner or prompt decoration (`-q`).
    pub quiet: bool,
    /// Debug logging (`-d`).
    pub debug: bool,
    /// The story file to play.
    pub story: PathBuf,
}

/// How to choose the user config file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search the platform config directory, then `./inkrc` (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip user config.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or(&[]))
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'q' => args.quiet = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else {
                        // A separate argument would be the story itself.
                        args.config = ConfigFile::Skip;
                    }
                }

                // -s<seed>, -l<save>, -w<save>
                flag @ ('s' | 'l' | 'w') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{flag} requires an argument"));
                    };
                    match flag {
                        's' => {
                            let seed = value
                                .parse()
                                .map_err(|_| format!("invalid seed: {value}"))?;
                            args.seed = Some(seed);
                        }
                        'l' => args.load = Some(PathBuf::from(value)),
                        _ => args.save = Some(PathBuf::from(value)),
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    match positional.len() {
        0 => return Err("usage: ink [-f[<file>]] [-s<seed>] [-l<save>] [-w<save>] [-qd] <story.ink>".to_owned()),
        1 => args.story = PathBuf::from(positional.remove(0)),
        n => return Err(format!("too many arguments ({n})")),
    }

    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the user config file: `<config dir>/inkrc`, then `./inkrc`.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let platform = ProjectDirs::from("", "", "ink").map(|d| d.config_dir().join("inkrc"));
    platform
        .into_iter()
        .chain(std::iter::once(PathBuf::from("./inkrc")))
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn story_positional() {
        let a = parse_argv(&argv(&["tale.ink"])).unwrap();
        assert_eq!(a.story, PathBuf::from("tale.ink"));
        assert!(matches!(a.config, ConfigFile::Search));
        assert!(!a.quiet && !a.debug);
    }

    #[test]
    fn story_is_required() {
        assert!(parse_argv(&argv(&["-q"])).unwrap_err().starts_with("usage:"));
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-qd", "tale.ink"])).unwrap();
        assert!(a.quiet && a.debug);
    }

    #[test]
    fn seed_embedded_and_separate() {
        let a = parse_argv(&argv(&["-s42", "tale.ink"])).unwrap();
        assert_eq!(a.seed, Some(42));
        let a = parse_argv(&argv(&["-s", "7", "tale.ink"])).unwrap();
        assert_eq!(a.seed, Some(7));
    }

    #[test]
    fn bad_seed() {
        assert!(parse_argv(&argv(&["-sx", "tale.ink"])).is_err());
    }

    #[test]
    fn save_paths() {
        let a = parse_argv(&argv(&["-lold.json", "-w", "new.json", "tale.ink"])).unwrap();
        assert_eq!(a.load, Some(PathBuf::from("old.json")));
        assert_eq!(a.save, Some(PathBuf::from("new.json")));
    }

    #[test]
    fn flag_missing_argument() {
        assert!(parse_argv(&argv(&["tale.ink", "-w"])).is_err());
    }

    #[test]
    fn config_skip() {
        let a = parse_argv(&argv(&["-f", "tale.ink"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
        assert_eq!(a.story, PathBuf::from("tale.ink"));
    }

    #[test]
    fn config_explicit_embedded() {
        let a = parse_argv(&argv(&["-fmy.inkrc", "tale.ink"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("my.inkrc")));
    }

    #[test]
    fn too_many_positional() {
        assert!(parse_argv(&argv(&["a.ink", "b.ink"])).is_err());
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z", "tale.ink"])).is_err());
    }

    #[test]
    fn double_dash_ends_flags() {
        let a = parse_argv(&argv(&["--", "-odd.ink"])).unwrap();
        assert_eq!(a.story, PathBuf::from("-odd.ink"));
    }
}
