use anyhow::{Context, Result};
use ignore::WalkBuilder;
use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::classpath::Classpath;
use crate::cli::Cli;

pub const CLASSPATH_ENV: &str = "CLASS_SCAN_CLASSPATH";
pub const JAVA_CLASSPATH_ENV: &str = "CLASSPATH";

/// `--classpath`, then `CLASS_SCAN_CLASSPATH`, then `CLASSPATH`, then the
/// current directory.
pub fn resolve_classpath_value(cli: &Cli) -> OsString {
    if let Some(cp) = cli.classpath.clone() {
        return cp;
    }
    [CLASSPATH_ENV, JAVA_CLASSPATH_ENV]
        .into_iter()
        .filter_map(env::var_os)
        .find(|v| !v.is_empty())
        .unwrap_or_else(|| OsString::from("."))
}

pub fn resolve_classpath(cli: &Cli) -> Result<Classpath> {
    parse_classpath(&resolve_classpath_value(cli))
}

pub fn parse_classpath(value: &OsStr) -> Result<Classpath> {
    let mut classpath = Classpath::new();

    for entry in env::split_paths(value) {
        if entry.as_os_str().is_empty() {
            continue;
        }
        let entry = expand_home(entry);

        if entry.file_name().is_some_and(|n| n == "*") {
            let dir = entry.parent().unwrap_or_else(|| Path::new("."));
            for jar in jars_in_directory(dir)? {
                classpath.add_archive(jar);
            }
            continue;
        }

        classpath.add_entry(&entry);
    }

    log::debug!("resolved classpath: {classpath:?}");
    Ok(classpath)
}

fn expand_home(path: PathBuf) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path;
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path,
    }
}

/// `.jar` files directly inside `dir`, sorted, like a `dir/*` classpath entry.
pub fn jars_in_directory(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        log::warn!("classpath wildcard directory does not exist: {}", dir.display());
        return Ok(Vec::new());
    }

    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .max_depth(Some(1))
        .build();

    let mut jars = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("failed to list {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_some_and(|t| t.is_file())
            && path
                .extension()
                .is_some_and(|e| e.eq_ignore_ascii_case("jar"))
        {
            jars.push(path.to_path_buf());
        }
    }
    jars.sort();
    Ok(jars)
}
