//! Language-neutral link checker
//!
//! Finds URLs carrying the `en-us/` locale segment in tracked text files and
//! optionally rewrites them without it.

use crate::error::Result;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

const URL_PATTERN: &str = r#"https?://[^\s<>"']+?en-us/[^\s<>"']+"#;
const LOCALE_SEGMENT: &str = "en-us/";
const SKIP_DIRS: [&str; 4] = [".git", "target", "node_modules", ".terraform"];

#[derive(Debug, Clone, clap::Args)]
pub struct LinkLangArgs {
    /// Rewrite URLs by removing "en-us/" instead of reporting them
    #[arg(short, long)]
    pub fix: bool,
    /// Repository root to scan
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocaleLink {
    pub file: String,
    pub line_number: usize,
    pub original_url: String,
    #[serde(skip)]
    pub fixed_url: String,
}

/// Text files tracked by git (`git grep -I` skips binaries); walks the tree
/// when `root` is not a git checkout
pub fn text_files(root: &Path) -> Vec<PathBuf> {
    let output = Command::new("git")
        .args(["grep", "-I", "--name-only", "-e", ""])
        .current_dir(root)
        .output();

    match output {
        // git grep exits 1 when nothing matches
        Ok(out) if out.status.code().map_or(false, |c| c <= 1) => {
            String::from_utf8_lossy(&out.stdout)
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| root.join(l))
                .collect()
        }
        Ok(out) => {
            tracing::debug!(
                stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                "git grep unavailable, walking directory tree"
            );
            walk_text_files(root)
        }
        Err(e) => {
            tracing::debug!(error = %e, "git not found, walking directory tree");
            walk_text_files(root)
        }
    }
}

fn walk_text_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && SKIP_DIRS.iter().any(|d| e.file_name() == *d))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect()
}

/// バイナリ・非UTF-8のファイルは None
fn read_text(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

pub fn find_links(file: &str, content: &str, pattern: &Regex) -> Vec<LocaleLink> {
    content
        .lines()
        .enumerate()
        .flat_map(|(i, line)| {
            pattern.find_iter(line).map(move |m| LocaleLink {
                file: file.to_string(),
                line_number: i + 1,
                original_url: m.as_str().to_string(),
                fixed_url: m.as_str().replace(LOCALE_SEGMENT, ""),
            })
        })
        .collect()
}

pub fn scan(files: &[PathBuf]) -> Result<Vec<LocaleLink>> {
    let pattern = Regex::new(URL_PATTERN)?;
    let mut links = Vec::new();
    for path in files {
        if !path.is_file() {
            tracing::debug!(path = %path.display(), "Skipping: not a regular file");
            continue;
        }
        let Some(content) = read_text(path) else {
            tracing::debug!(path = %path.display(), "Skipping unreadable or binary file");
            continue;
        };
        links.extend(find_links(&path.to_string_lossy(), &content, &pattern));
    }
    Ok(links)
}

/// Rewrite every affected file; returns the number of files changed
pub fn fix_links(links: &[LocaleLink]) -> usize {
    let mut by_file: BTreeMap<&str, Vec<&LocaleLink>> = BTreeMap::new();
    for link in links {
        by_file.entry(link.file.as_str()).or_default().push(link);
    }

    let mut modified = 0;
    for (file, file_links) in by_file {
        tracing::debug!(file = %file, "Fixing links");
        let Some(content) = read_text(Path::new(file)) else {
            tracing::warn!(file = %file, "Could not read file");
            continue;
        };
        let updated = file_links
            .iter()
            .fold(content.clone(), |acc, l| acc.replace(&l.original_url, &l.fixed_url));
        if updated == content {
            continue;
        }
        match std::fs::write(file, updated) {
            Ok(()) => modified += 1,
            Err(e) => tracing::warn!(file = %file, error = %e, "Could not write file"),
        }
    }
    modified
}

pub fn run(args: &LinkLangArgs) -> Result<i32> {
    let files = text_files(&args.root);
    tracing::debug!(count = files.len(), "Collected text files");
    let links = scan(&files)?;

    if !args.fix {
        println!("{}", serde_json::to_string_pretty(&links)?);
        return Ok(0);
    }
    if links.is_empty() {
        println!("No URLs containing 'en-us' were found.");
        return Ok(0);
    }

    for link in &links {
        tracing::debug!(
            file = %link.file,
            line = link.line_number,
            original = %link.original_url,
            fixed = %link.fixed_url,
            "Fixing URL"
        );
    }
    let files_modified = fix_links(&links);
    println!("Fixed {} URLs in {} files.", links.len(), files_modified);
    Ok(0)
}
