use anyhow::{bail, Context, Result};
use kestrel_stage::animation_validation::{
    AnimationValidationEvent, AnimationValidationSeverity, AnimationValidator,
};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

const USAGE: &str = "Usage: animation_check [--fail-on-warn] [--json] <path>...

Validates animation clip files (.json, .clip). Directories are searched recursively.
Exits with 2 when any clip has errors, or warnings under --fail-on-warn.";

fn main() {
    kestrel_stage::config::init_logging("warn");
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match CheckOptions::parse(&args) {
        Ok(options) => options,
        Err(err) => {
            eprintln!("animation_check: {err}\n\n{USAGE}");
            process::exit(1);
        }
    };
    if options.help {
        println!("{USAGE}");
        return;
    }
    match check(&options) {
        Ok(tally) if tally.failed(options.fail_on_warn) => process::exit(2),
        Ok(_) => {}
        Err(err) => {
            eprintln!("animation_check: {err:#}");
            process::exit(1);
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct CheckOptions {
    fail_on_warn: bool,
    json: bool,
    help: bool,
    paths: Vec<PathBuf>,
}

impl CheckOptions {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = CheckOptions::default();
        for arg in args {
            match arg.as_str() {
                "--fail-on-warn" => options.fail_on_warn = true,
                "--json" => options.json = true,
                "--help" | "-h" => options.help = true,
                flag if flag.starts_with('-') => bail!("unknown flag '{flag}'"),
                path => options.paths.push(PathBuf::from(path)),
            }
        }
        if options.paths.is_empty() && !options.help {
            bail!("no clip paths given");
        }
        Ok(options)
    }
}

#[derive(Debug, Default, Serialize)]
struct Tally {
    clips: usize,
    warnings: usize,
    errors: usize,
}

impl Tally {
    fn record(&mut self, event: &AnimationValidationEvent) {
        match event.severity {
            AnimationValidationSeverity::Warning => self.warnings += 1,
            AnimationValidationSeverity::Error => self.errors += 1,
            AnimationValidationSeverity::Info => {}
        }
    }

    fn failed(&self, fail_on_warn: bool) -> bool {
        self.errors > 0 || (fail_on_warn && self.warnings > 0)
    }
}

fn check(options: &CheckOptions) -> Result<Tally> {
    let clips = gather_clips(&options.paths)?;
    if clips.is_empty() {
        bail!("no clip files found");
    }
    let mut tally = Tally::default();
    for path in &clips {
        tally.clips += 1;
        for event in AnimationValidator::validate_path(path) {
            tally.record(&event);
            if options.json {
                println!(
                    "{}",
                    json!({ "severity": event.severity.to_string(), "path": event.path, "message": event.message })
                );
            } else {
                println!("{:<7} {}: {}", event.severity.to_string(), event.path.display(), event.message);
            }
        }
    }
    if options.json {
        println!("{}", json!({ "summary": tally }));
    } else {
        println!("{} clips checked, {} warnings, {} errors", tally.clips, tally.warnings, tally.errors);
    }
    Ok(tally)
}

/// Clip files named directly or found under the given directories, sorted and deduplicated.
fn gather_clips(paths: &[PathBuf]) -> Result<BTreeSet<PathBuf>> {
    let mut found = BTreeSet::new();
    for path in paths {
        if path.is_dir() {
            walk(path, &mut found).with_context(|| format!("Listing {}", path.display()))?;
        } else if path.is_file() {
            if is_clip_file(path) {
                found.insert(path.clone());
            } else {
                log::warn!("skipping {} (not a clip file)", path.display());
            }
        } else {
            bail!("{} does not exist", path.display());
        }
    }
    Ok(found)
}

fn walk(dir: &Path, found: &mut BTreeSet<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if is_clip_file(&path) {
            found.insert(path);
        }
    }
    Ok(())
}

fn is_clip_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json") || ext.eq_ignore_ascii_case("clip"))
        .unwrap_or(false)
}
