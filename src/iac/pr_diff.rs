//! Git diff parsing for PR reference documents
//!
//! Extracts the `<full_diff>` block from a PR reference XML file (or takes a
//! raw diff), summarises per-file changes, and pages raw hunks so large diffs
//! can be reviewed in chunks.

use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Delete,
    Rename,
    Copy,
    Modify,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Delete => "delete",
            Self::Rename => "rename",
            Self::Copy => "copy",
            Self::Modify => "modify",
        }
    }
}

/// Per-file diff summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffEntry {
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub change_type: ChangeType,
    pub additions: usize,
    pub deletions: usize,
    pub hunks: Vec<Hunk>,
}

impl DiffEntry {
    pub fn display_path(&self) -> &str {
        self.new_path
            .as_deref()
            .or(self.old_path.as_deref())
            .unwrap_or("(unknown)")
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct PrDiffArgs {
    /// PR reference XML file (e.g. pr-reference.xml)
    pub reference_file: PathBuf,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Only include entries whose path contains this substring (case-insensitive)
    #[arg(long)]
    pub filter: Option<String>,
    /// Include hunk ranges in table output
    #[arg(long = "include-hunks")]
    pub include_hunks: bool,
    /// Limit the number of table rows
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print raw hunks for an inclusive 1-indexed range, e.g. 1-100
    #[arg(long = "hunk-range")]
    pub hunk_range: Option<String>,
    /// Write hunk-XXX.txt pages to this directory
    #[arg(long = "hunk-pages-dir")]
    pub hunk_pages_dir: Option<PathBuf>,
    /// Soft maximum lines per page for --hunk-pages-dir
    #[arg(long = "hunk-page-size")]
    pub hunk_page_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

/// `<full_diff>` の中身を取り出す（無ければ入力全体が diff かを確認）
pub fn extract_full_diff(text: &str) -> Result<String> {
    let re = Regex::new(r"(?s)<full_diff>\s*(.*?)\s*</full_diff>")?;
    if let Some(caps) = re.captures(text) {
        return Ok(caps[1].trim().to_string());
    }
    if text.lines().any(|l| l.starts_with("diff --git ")) {
        return Ok(text.trim().to_string());
    }
    Err(Error::Validation(
        "The reference file does not contain a <full_diff> section.".to_string(),
    ))
}

pub fn read_full_diff(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::NotFound(format!("Reference file not found: {}", path.display())));
    }
    extract_full_diff(&std::fs::read_to_string(path)?)
}

fn split_blocks(diff: &str) -> Vec<Vec<&str>> {
    let mut blocks: Vec<Vec<&str>> = Vec::new();
    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            blocks.push(vec![line]);
        } else if let Some(current) = blocks.last_mut() {
            current.push(line);
        }
    }
    blocks
}

fn change_type(lines: &[&str]) -> ChangeType {
    for line in lines {
        if line.starts_with("new file mode") {
            return ChangeType::Add;
        }
        if line.starts_with("deleted file mode") {
            return ChangeType::Delete;
        }
        if line.starts_with("rename from") {
            return ChangeType::Rename;
        }
        if line.starts_with("copy from") {
            return ChangeType::Copy;
        }
    }
    ChangeType::Modify
}

fn parse_hunks(lines: &[&str], header: &Regex) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<Hunk> = None;

    for line in lines {
        if line.starts_with("@@ ") {
            hunks.extend(current.take());
            current = header.captures(line).map(|caps| {
                let num = |i: usize, default: u32| {
                    caps.get(i)
                        .and_then(|m| m.as_str().parse().ok())
                        .unwrap_or(default)
                };
                Hunk {
                    old_start: num(1, 0),
                    old_lines: num(2, 1),
                    new_start: num(3, 0),
                    new_lines: num(4, 1),
                    lines: vec![line.to_string()],
                }
            });
        } else if let Some(hunk) = current.as_mut() {
            hunk.lines.push(line.to_string());
        }
    }
    hunks.extend(current);
    hunks
}

fn count_changes(lines: &[&str]) -> (usize, usize) {
    let mut additions = 0;
    let mut deletions = 0;
    for line in lines {
        if line.starts_with("+++") || line.starts_with("---") {
            continue;
        }
        if line.starts_with('+') {
            additions += 1;
        } else if line.starts_with('-') {
            deletions += 1;
        }
    }
    (additions, deletions)
}

fn parse_block(lines: &[&str], header: &Regex) -> Option<DiffEntry> {
    let first = lines.first()?;
    let parts: Vec<&str> = first.split_whitespace().collect();
    let strip = |p: &str| p.get(2..).unwrap_or(p).to_string();
    let mut old_path = parts.get(2).copied().map(strip);
    let mut new_path = parts.get(3).copied().map(strip);

    for line in lines {
        if let Some(p) = line.strip_prefix("rename to ") {
            new_path = Some(p.to_string());
        }
        if let Some(p) = line.strip_prefix("rename from ") {
            old_path = Some(p.to_string());
        }
    }

    let (additions, deletions) = count_changes(lines);
    Some(DiffEntry {
        old_path,
        new_path,
        change_type: change_type(lines),
        additions,
        deletions,
        hunks: parse_hunks(lines, header),
    })
}

pub fn parse_diff(diff: &str) -> Result<Vec<DiffEntry>> {
    let header = Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@")?;
    Ok(split_blocks(diff)
        .iter()
        .filter(|block| block.iter().any(|l| !l.trim().is_empty()))
        .filter_map(|block| parse_block(block, &header))
        .collect())
}

pub fn filter_entries(entries: Vec<DiffEntry>, substring: Option<&str>) -> Vec<DiffEntry> {
    let Some(needle) = substring.filter(|s| !s.is_empty()).map(str::to_lowercase) else {
        return entries;
    };
    entries
        .into_iter()
        .filter(|e| {
            let path = e.new_path.as_deref().or(e.old_path.as_deref()).unwrap_or("");
            path.to_lowercase().contains(&needle)
        })
        .collect()
}

pub fn render_table(entries: &[DiffEntry], include_hunks: bool, limit: Option<usize>) -> String {
    let shown = match limit {
        Some(n) if n > 0 => &entries[..n.min(entries.len())],
        _ => entries,
    };
    if shown.is_empty() {
        return "No diff entries found.".to_string();
    }

    let header = format!("{:<10}{:>6}{:>6}  File", "Change", "Adds", "Dels");
    let mut out = vec![header.clone(), "-".repeat(header.len())];
    for entry in shown {
        out.push(format!(
            "{:<10}{:>6}{:>6}  {}",
            entry.change_type.as_str(),
            entry.additions,
            entry.deletions,
            entry.display_path()
        ));
        if include_hunks {
            for h in &entry.hunks {
                out.push(format!(
                    "{:<10}{:>6}{:>6}  @@ -{},{} +{},{}",
                    "", "", "", h.old_start, h.old_lines, h.new_start, h.new_lines
                ));
            }
        }
    }
    out.join("\n")
}

/// `START-END`, 1-indexed and inclusive
pub fn parse_hunk_range(value: &str) -> Result<(usize, usize)> {
    let invalid = || Error::Validation("--hunk-range must follow START-END format.".to_string());
    let (start, end) = value.trim().split_once('-').ok_or_else(invalid)?;
    let start: usize = start.parse().map_err(|_| invalid())?;
    let end: usize = end.parse().map_err(|_| invalid())?;
    if start < 1 || end < start {
        return Err(Error::Validation(
            "--hunk-range must have START >= 1 and END >= START.".to_string(),
        ));
    }
    Ok((start, end))
}

/// Hunks numbered globally across files, starting at 1
pub fn flatten_hunks(entries: &[DiffEntry]) -> Vec<(usize, &DiffEntry, &Hunk)> {
    entries
        .iter()
        .flat_map(|e| e.hunks.iter().map(move |h| (e, h)))
        .enumerate()
        .map(|(i, (e, h))| (i + 1, e, h))
        .collect()
}

pub fn render_hunks(items: &[(usize, &DiffEntry, &Hunk)]) -> String {
    let mut out = Vec::new();
    for (index, entry, hunk) in items {
        out.push(format!(
            "# Hunk {}: {} {}",
            index,
            entry.change_type.as_str(),
            entry.display_path()
        ));
        out.push(hunk.lines.join("\n"));
        out.push(String::new());
    }
    out.join("\n").trim_end().to_string()
}

pub fn render_hunk_page(flat: &[(usize, &DiffEntry, &Hunk)], start: usize, end: usize) -> String {
    let selection: Vec<_> = flat
        .iter()
        .filter(|(i, _, _)| (start..=end).contains(i))
        .cloned()
        .collect();
    if selection.is_empty() {
        return "No hunks in requested range.".to_string();
    }
    render_hunks(&selection)
}

/// Group hunks into pages of at most `max_lines` (a single oversized hunk
/// still gets its own page) and write `hunk-001.txt`, ... Returns page count.
pub fn write_hunk_pages(flat: &[(usize, &DiffEntry, &Hunk)], dir: &Path, max_lines: usize) -> Result<usize> {
    if max_lines == 0 {
        return Err(Error::Validation(
            "--hunk-page-size must be a positive line count.".to_string(),
        ));
    }
    std::fs::create_dir_all(dir)?;

    let mut pages: Vec<Vec<(usize, &DiffEntry, &Hunk)>> = Vec::new();
    let mut current_lines = 0;
    for item in flat {
        let lines = render_hunks(std::slice::from_ref(item)).lines().count();
        match pages.last_mut() {
            Some(page) if current_lines + 1 + lines <= max_lines => {
                page.push(*item);
                current_lines += 1 + lines;
            }
            _ => {
                pages.push(vec![*item]);
                current_lines = lines;
            }
        }
    }

    for (n, page) in pages.iter().enumerate() {
        let path = dir.join(format!("hunk-{:03}.txt", n + 1));
        std::fs::write(&path, render_hunks(page) + "\n")?;
    }
    Ok(pages.len())
}

pub fn run(args: &PrDiffArgs) -> Result<i32> {
    let diff = read_full_diff(&args.reference_file)?;
    let entries = filter_entries(parse_diff(&diff)?, args.filter.as_deref());
    if entries.is_empty() {
        tracing::warn!("No diff entries matched the provided criteria");
        return Ok(0);
    }

    let flat = flatten_hunks(&entries);
    if args.hunk_pages_dir.is_some() || args.hunk_page_size.is_some() {
        let (Some(dir), Some(size)) = (&args.hunk_pages_dir, args.hunk_page_size) else {
            return Err(Error::Validation(
                "--hunk-pages-dir and --hunk-page-size must be provided together.".to_string(),
            ));
        };
        if flat.is_empty() {
            tracing::warn!("Skipping hunk page export because no hunks were found");
        } else {
            let pages = write_hunk_pages(&flat, dir, size)?;
            tracing::info!(pages = pages, hunks = flat.len(), dir = %dir.display(), "Wrote hunk pages");
        }
    }

    if let Some(range) = &args.hunk_range {
        let (start, end) = parse_hunk_range(range)?;
        tracing::info!(total = flat.len(), "Total hunks available");
        println!("{}", render_hunk_page(&flat, start, end));
        return Ok(0);
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Table => {
            println!("{}", render_table(&entries, args.include_hunks, args.limit));
            tracing::info!(entries = entries.len(), "Parsed diff entries");
        }
    }
    Ok(0)
}
