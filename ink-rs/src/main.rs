use std::error::Error;
use std::io::{self, BufRead, IsTerminal};
use std::path::{Path, PathBuf};

use tracing::debug;

use ink::cli::{self, CliArgs, ConfigFile};
use ink::config::{story_value, Config};
use ink::host::FsHost;
use ink::logging::{init_tracing, DEBUG_FILTER, DEFAULT_FILTER};
use ink::story::Story;
use ink::terminal::Console;

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("ink: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("ink: {e}");
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<(), Box<dyn Error>> {
    // ── Player config ─────────────────────────────────────────────────────────
    let config_path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };
    let config = match &config_path {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    let filter = if args.debug {
        DEBUG_FILTER
    } else {
        config.log.as_deref().unwrap_or(DEFAULT_FILTER)
    };
    init_tracing(filter);
    if let Some(path) = &config_path {
        debug!(path = %path.display(), "loaded player config");
    }

    // ── Story ─────────────────────────────────────────────────────────────────
    let base = args
        .story
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_id = args
        .story
        .file_name()
        .and_then(|f| f.to_str())
        .ok_or_else(|| format!("invalid story path: {}", args.story.display()))?
        .to_owned();
    let host = Box::new(FsHost::new(base));
    let mut story = match args.seed.or(config.seed) {
        Some(seed) => Story::load_seeded(host, &file_id, seed)?,
        None => Story::load(host, &file_id)?,
    };
    for (name, raw) in &config.vars {
        story.set_variable(name, story_value(raw));
    }
    if let Some(path) = &args.load {
        story.load_from_path(path)?;
        debug!(path = %path.display(), "restored saved state");
    }
    let save_path: Option<PathBuf> = args.save.clone().or(config.save.clone());

    // ── Play loop ─────────────────────────────────────────────────────────────
    let stdout = io::stdout();
    let styled = stdout.is_terminal() && !args.quiet;
    let mut console = Console::new(stdout.lock(), config.width, styled, args.quiet);
    console.banner(&file_id)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        let units = story.advance_all()?;
        for text in &units {
            console.text(text)?;
        }
        if !units.is_empty() {
            if let Some(comment) = story.current_comment() {
                console.note(&comment)?;
            }
        }

        let choices = story.pending_choices();
        if choices.is_empty() {
            break;
        }
        console.choices(&choices)?;

        // Read until a usable command; end of input quits.
        let choice = loop {
            console.prompt()?;
            let Some(line) = lines.next() else {
                return Ok(());
            };
            let line = line?;
            match line.trim() {
                "quit" => return Ok(()),
                "save" => match &save_path {
                    Some(path) => {
                        story.save_to_path(path)?;
                        console.note(&format!("Saved to {}.", path.display()))?;
                    }
                    None => console.note("No save file; start with -w<file>.")?,
                },
                input => match input.parse::<usize>() {
                    Ok(n) if (1..=choices.len()).contains(&n) => break n - 1,
                    _ => console.note(&format!("Choose a number from 1 to {}.", choices.len()))?,
                },
            }
        };
        story.choose(choice)?;
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<Config, Box<dyn Error>> {
    let (config, errors) = Config::load_file(path)
        .map_err(|e| format!("cannot read config {}: {e}", path.display()))?;
    for e in errors {
        eprintln!("ink: warning: {}: {e}", path.display());
    }
    Ok(config)
}
