/// Player tests: run stories through the `ink` binary with piped stdin and
/// check what reaches stdout and stderr.
///
/// Every run passes `-q` so the banner and prompt stay out of the output, and
/// `-f` (no file) so a user `inkrc` on the test machine cannot interfere.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn ink_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_ink"))
}

const TWO_WAYS: &str = "\
== start
Hello.
* Go left
  You went left.
* Go right
  You went right.
";

/// Write `src` as `tale.ink` in a fresh directory.
fn story_dir(src: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tale.ink");
    std::fs::write(&path, src).expect("write story");
    (dir, path)
}

fn run_ink(args: &[&str], story: &Path, input: &str) -> Output {
    let mut child = Command::new(ink_binary())
        .args(args)
        .arg(story)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn ink binary");
    child
        .stdin
        .as_mut()
        .expect("stdin not open")
        .write_all(input.as_bytes())
        .expect("write to stdin");
    child.wait_with_output().expect("wait failed")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn plays_through_a_choice() {
    let (_dir, path) = story_dir(TWO_WAYS);
    let out = run_ink(&["-q", "-f"], &path, "1\n");
    assert!(out.status.success(), "{out:?}");
    assert_eq!(
        stdout(&out),
        "Hello.\n\n1. Go left\n2. Go right\nGo left\nYou went left.\n"
    );
}

#[test]
fn quit_and_end_of_input_stop_cleanly() {
    let (_dir, path) = story_dir(TWO_WAYS);
    for input in ["quit\n", ""] {
        let out = run_ink(&["-q", "-f"], &path, input);
        assert!(out.status.success(), "{out:?}");
        assert_eq!(stdout(&out), "Hello.\n\n1. Go left\n2. Go right\n");
    }
}

#[test]
fn bad_input_asks_again() {
    let (_dir, path) = story_dir(TWO_WAYS);
    let out = run_ink(&["-q", "-f"], &path, "7\nleft\n2\n");
    let text = stdout(&out);
    assert_eq!(text.matches("Choose a number from 1 to 2.").count(), 2);
    assert!(text.ends_with("Go right\nYou went right.\n"), "{text}");
}

#[test]
fn missing_story_fails_with_prefix() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = run_ink(&["-q", "-f"], &dir.path().join("absent.ink"), "");
    assert_eq!(out.status.code(), Some(1));
    let err = String::from_utf8_lossy(&out.stderr);
    assert!(err.starts_with("ink: "), "{err}");
    assert!(err.contains("absent.ink"), "{err}");
}

#[test]
fn missing_story_argument_prints_usage() {
    let out = Command::new(ink_binary())
        .arg("-q")
        .output()
        .expect("failed to run ink binary");
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).starts_with("ink: usage:"));
}

#[test]
fn save_then_resume() {
    let (dir, path) = story_dir(TWO_WAYS);
    let save = dir.path().join("save.json");
    let save_arg = save.to_string_lossy().into_owned();

    let out = run_ink(&["-q", "-f", "-w", &save_arg], &path, "save\nquit\n");
    assert!(out.status.success(), "{out:?}");
    assert!(stdout(&out).contains("Saved to"));
    assert!(save.exists());

    let out = run_ink(&["-q", "-f", "-l", &save_arg], &path, "2\n");
    assert!(out.status.success(), "{out:?}");
    assert!(stdout(&out).ends_with("Go right\nYou went right.\n"));
}

#[test]
fn save_without_file_is_a_note() {
    let (_dir, path) = story_dir(TWO_WAYS);
    let out = run_ink(&["-q", "-f"], &path, "save\nquit\n");
    assert!(out.status.success(), "{out:?}");
    assert!(stdout(&out).contains("No save file"));
}

#[test]
fn config_file_sets_story_variables() {
    let (dir, path) = story_dir("== start\nHi {name}, you have {gold} coins.\n");
    let rc = dir.path().join("inkrc");
    std::fs::write(&rc, "; player settings\nset var.name=Ann\nset var.gold 12\n").expect("write inkrc");
    let config_arg = format!("-f{}", rc.display());
    let out = run_ink(&["-q", &config_arg], &path, "");
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out), "Hi Ann, you have 12 coins.\n");
}

#[test]
fn config_errors_are_warnings() {
    let (dir, path) = story_dir("== start\nStill plays.\n");
    let rc = dir.path().join("inkrc");
    std::fs::write(&rc, "set seed=lots\n").expect("write inkrc");
    let config_arg = format!("-f{}", rc.display());
    let out = run_ink(&["-q", &config_arg], &path, "");
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out), "Still plays.\n");
    assert!(String::from_utf8_lossy(&out.stderr).contains("warning"));
}

#[test]
fn includes_resolve_next_to_the_story() {
    let (dir, path) = story_dir("INCLUDE more.ink\n== start\nOff we go -> elsewhere\n");
    std::fs::write(dir.path().join("more.ink"), "== elsewhere\nto the hills.\n").expect("write include");
    let out = run_ink(&["-q", "-f"], &path, "");
    assert!(out.status.success(), "{out:?}");
    assert_eq!(stdout(&out), "Off we go to the hills.\n");
}
