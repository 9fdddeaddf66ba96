//! Terraform variable consistency check
//!
//! Every module directory under the given roots is scanned for `variable`
//! blocks. A variable name that carries more than one distinct description
//! across modules is reported.

use super::hcl;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;
use walkdir::WalkDir;

const SKIP_DIRS: [&str; 2] = ["tests", ".terraform"];

#[derive(Debug, Clone, clap::Args)]
pub struct TfVarsArgs {
    /// Directories searched for Terraform modules
    #[arg(default_values = ["src", "blueprints"])]
    pub roots: Vec<PathBuf>,
    /// Read inputs through `terraform-docs json` instead of the built-in parser
    #[arg(long = "terraform-docs")]
    pub terraform_docs: bool,
    /// Exit with status 1 when inconsistencies are found
    #[arg(long = "error-on-inconsistency")]
    pub error_on_inconsistency: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inconsistency {
    pub variable: String,
    pub differences: Vec<String>,
    pub folders: Vec<String>,
}

/// Directories holding at least one `.tf` file
pub fn terraform_dirs(roots: &[PathBuf]) -> BTreeSet<PathBuf> {
    let mut dirs = BTreeSet::new();
    for root in roots {
        let walker = WalkDir::new(root).into_iter().filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && SKIP_DIRS.iter().any(|d| e.file_name() == *d))
        });
        for entry in walker.filter_map(|e| e.ok()) {
            let is_tf = entry.file_type().is_file()
                && entry.path().extension().map_or(false, |ext| ext == "tf");
            if let (true, Some(parent)) = (is_tf, entry.path().parent()) {
                dirs.insert(parent.to_path_buf());
            }
        }
    }
    dirs
}

/// (name, description) for every variable declared directly in `folder`
pub fn native_inputs(folder: &Path) -> Result<Vec<(String, String)>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(folder)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map_or(false, |ext| ext == "tf"))
        .collect();
    files.sort();

    let mut inputs = Vec::new();
    for file in files {
        let content = std::fs::read_to_string(&file)?;
        let body = hcl::parse(&content)
            .map_err(|e| Error::Parse(format!("{}: {}", file.display(), e)))?;
        inputs.extend(
            hcl::variables(&body)
                .into_iter()
                .map(|v| (v.name, v.description.unwrap_or_default())),
        );
    }
    Ok(inputs)
}

pub fn terraform_docs_inputs(folder: &Path) -> Result<Vec<(String, String)>> {
    let output = Command::new("terraform-docs")
        .args(["json", "--output-template", "{{ .Content }}"])
        .args(["--hide", "header", "--hide", "footer", "--hide", "providers"])
        .args(["--hide", "resources", "--hide", "requirements"])
        .arg(folder)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::Validation(
                "terraform-docs could not be found. Install it from \
                 https://terraform-docs.io/user-guide/installation/ and ensure it is in your PATH."
                    .to_string(),
            ),
            _ => Error::Io(e),
        })?;

    if !output.status.success() {
        return Err(Error::Internal(format!(
            "terraform-docs at {} failed with {}: {}",
            folder.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    parse_terraform_docs(&output.stdout)
}

fn parse_terraform_docs(stdout: &[u8]) -> Result<Vec<(String, String)>> {
    let docs: serde_json::Value = serde_json::from_slice(stdout)?;
    let inputs = docs["inputs"].as_array().cloned().unwrap_or_default();
    Ok(inputs
        .iter()
        .filter_map(|input| {
            let name = input["name"].as_str()?.to_string();
            let description = input["description"].as_str().unwrap_or_default().to_string();
            Some((name, description))
        })
        .collect())
}

/// Descriptions and folders seen per variable name
#[derive(Debug, Default)]
pub struct VariableIndex {
    folders: BTreeMap<String, Vec<String>>,
    descriptions: BTreeMap<String, BTreeSet<String>>,
}

impl VariableIndex {
    pub fn record(&mut self, folder: &str, name: &str, description: &str) {
        self.folders
            .entry(name.to_string())
            .or_default()
            .push(folder.to_string());
        self.descriptions
            .entry(name.to_string())
            .or_default()
            .insert(description.to_string());
    }

    pub fn inconsistencies(&self) -> Vec<Inconsistency> {
        self.descriptions
            .iter()
            .filter(|(_, descriptions)| descriptions.len() > 1)
            .map(|(name, descriptions)| Inconsistency {
                variable: name.clone(),
                differences: descriptions.iter().cloned().collect(),
                folders: self.folders.get(name).cloned().unwrap_or_default(),
            })
            .collect()
    }
}

pub fn check(roots: &[PathBuf], use_terraform_docs: bool) -> Result<Vec<Inconsistency>> {
    let mut index = VariableIndex::default();
    for folder in terraform_dirs(roots) {
        let inputs = if use_terraform_docs {
            terraform_docs_inputs(&folder)?
        } else {
            native_inputs(&folder)?
        };
        tracing::debug!(folder = %folder.display(), inputs = inputs.len(), "Scanned module");
        let folder = folder.to_string_lossy();
        for (name, description) in &inputs {
            index.record(&folder, name, description);
        }
    }
    Ok(index.inconsistencies())
}

pub fn run(args: &TfVarsArgs) -> Result<i32> {
    let issues = check(&args.roots, args.terraform_docs)?;
    if issues.is_empty() {
        return Ok(0);
    }
    println!("{}", serde_json::to_string_pretty(&issues)?);
    tracing::warn!(count = issues.len(), "Inconsistent variable descriptions found");
    Ok(if args.error_on_inconsistency { 1 } else { 0 })
}
