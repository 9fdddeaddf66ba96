//! Markdown documentation for compiled Bicep (ARM JSON) modules
//!
//! ## Responsibilities
//!
//! - Extract metadata, parameters, resources, nested deployments,
//!   user-defined types and outputs from an ARM template
//! - Render them as Markdown tables between `BEGIN_BICEP_DOCS` markers
//! - Write to a file, stdout, or inject into an existing README

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::fmt::Write as _;
use std::path::PathBuf;

pub const BEGIN_MARKER: &str = "<!-- BEGIN_BICEP_DOCS -->";
pub const END_MARKER: &str = "<!-- END_BICEP_DOCS -->";
const HEADER: &str = "<!-- BEGIN_BICEP_DOCS -->\n<!-- markdown-table-prettify-ignore-start -->\n<!-- markdownlint-disable MD033 -->\n";
const FOOTER: &str = "<!-- markdown-table-prettify-ignore-end -->\n<!-- END_BICEP_DOCS -->\n";
const DEPLOYMENT_TYPE: &str = "Microsoft.Resources/deployments";
const DEFAULT_TITLE: &str = "Bicep Module";

#[derive(Debug, Clone, clap::Args)]
pub struct BicepDocsArgs {
    /// Compiled ARM JSON file (e.g. main.json)
    pub arm_json_file: PathBuf,
    /// Markdown output file; stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Number of nested module levels to document
    #[arg(short = 'n', long = "modules-nesting-level", default_value_t = 1)]
    pub modules_nesting_level: usize,
    /// Replace the marked block in the existing output file instead of overwriting it
    #[arg(long, requires = "output")]
    pub inject: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub description: String,
    pub type_name: String,
    pub default: Option<String>,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub name: String,
    pub type_name: String,
    pub api_version: String,
    pub condition: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub name: String,
    pub type_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub resources: Vec<Resource>,
    pub outputs: Vec<Output>,
    pub level: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeProperty {
    pub name: String,
    pub type_name: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserType {
    pub name: String,
    pub description: String,
    pub properties: Vec<TypeProperty>,
}

/// Everything rendered for one template
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDoc {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<Parameter>,
    pub resources: Vec<Resource>,
    pub modules: Vec<Module>,
    pub types: Vec<UserType>,
    pub outputs: Vec<Output>,
}

fn text(value: &Value) -> String {
    value.as_str().unwrap_or_default().to_string()
}

fn description_of(value: &Value) -> String {
    text(&value["metadata"]["description"])
}

/// `$ref` becomes a link to the user-defined types section
fn type_of(value: &Value) -> String {
    match value["$ref"].as_str() {
        Some(reference) => {
            let name = reference.rsplit('/').next().unwrap_or(reference);
            format!("[{}](#user-defined-types)", name)
        }
        None => text(&value["type"]),
    }
}

/// Symbolic-name objects and classic resource arrays alike
fn named_entries(value: &Value) -> Vec<(String, &Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (v["name"].as_str().map_or_else(|| i.to_string(), String::from), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn parameters(template: &Value) -> Vec<Parameter> {
    named_entries(&template["parameters"])
        .into_iter()
        .map(|(name, info)| {
            let default = info.get("defaultValue").map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            let nullable = info["nullable"].as_bool().unwrap_or(false);
            Parameter {
                name,
                description: description_of(info),
                type_name: type_of(info),
                required: default.is_none() && !nullable,
                default,
            }
        })
        .collect()
}

fn resources(template: &Value) -> Vec<Resource> {
    named_entries(&template["resources"])
        .into_iter()
        .map(|(name, info)| Resource {
            name,
            type_name: text(&info["type"]),
            api_version: text(&info["apiVersion"]),
            condition: match &info["condition"] {
                Value::Null => "true".to_string(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        })
        .collect()
}

fn outputs(template: &Value) -> Vec<Output> {
    named_entries(&template["outputs"])
        .into_iter()
        .map(|(name, info)| Output {
            name,
            type_name: text(&info["type"]),
            description: description_of(info),
        })
        .collect()
}

/// Nested deployments up to `max_level` (0 = top-level modules only)
fn modules(template: &Value, max_level: usize, level: usize) -> Vec<Module> {
    let mut found = Vec::new();
    for (name, info) in named_entries(&template["resources"]) {
        if info["type"].as_str() != Some(DEPLOYMENT_TYPE) {
            continue;
        }
        let inner = &info["properties"]["template"];
        found.push(Module {
            name: name.clone(),
            description: description_of(inner),
            parameters: parameters(inner),
            resources: resources(inner),
            outputs: outputs(inner),
            level,
        });
        if level < max_level {
            found.extend(modules(inner, max_level, level + 1).into_iter().map(|mut nested| {
                nested.name = format!("{}/{}", name, nested.name);
                nested
            }));
        }
    }
    found
}

fn user_types(template: &Value) -> Vec<UserType> {
    named_entries(&template["definitions"])
        .into_iter()
        .map(|(name, info)| UserType {
            name,
            description: description_of(info),
            properties: named_entries(&info["properties"])
                .into_iter()
                .map(|(prop, prop_info)| TypeProperty {
                    name: prop,
                    type_name: type_of(prop_info),
                    description: description_of(prop_info),
                })
                .collect(),
        })
        .collect()
}

impl ModuleDoc {
    /// `nesting_level` counts from 1 like the CLI flag
    pub fn from_arm(template: &Value, nesting_level: usize) -> Self {
        let name = template["metadata"]["name"]
            .as_str()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_TITLE)
            .to_string();
        Self {
            name,
            description: template["metadata"]["description"].as_str().map(String::from),
            parameters: parameters(template),
            resources: resources(template),
            modules: modules(template, nesting_level.saturating_sub(1), 0),
            types: user_types(template),
            outputs: outputs(template),
        }
    }

    pub fn render(&self) -> String {
        let mut md = String::from(HEADER);
        let _ = writeln!(md, "\n# {}\n", self.name);
        if let Some(description) = &self.description {
            let _ = writeln!(md, "{}\n", description);
        }

        if !self.parameters.is_empty() {
            md.push_str("## Parameters\n\n");
            parameter_table(&mut md, &self.parameters);
        }

        if !self.resources.is_empty() {
            md.push_str("## Resources\n\n");
            let rows: Vec<Vec<String>> = self
                .resources
                .iter()
                .filter(|r| r.condition != "false")
                .map(|r| vec![r.name.clone(), r.type_name.clone(), r.api_version.clone()])
                .collect();
            if !rows.is_empty() {
                table(&mut md, &["Name", "Type", "API Version"], &rows);
            }
        }

        if !self.modules.is_empty() {
            md.push_str("## Modules\n\n");
            let rows: Vec<Vec<String>> = self
                .modules
                .iter()
                .map(|m| vec![m.name.clone(), format_description(&m.description)])
                .collect();
            table(&mut md, &["Name", "Description"], &rows);

            md.push_str("## Module Details\n\n");
            for module in &self.modules {
                render_module(&mut md, module);
            }
        }

        if !self.types.is_empty() {
            md.push_str("## User Defined Types\n\n");
            for user_type in &self.types {
                let _ = writeln!(md, "### `{}`\n", user_type.name);
                if !user_type.description.is_empty() {
                    let _ = writeln!(md, "{}\n", user_type.description);
                }
                if !user_type.properties.is_empty() {
                    let rows: Vec<Vec<String>> = user_type
                        .properties
                        .iter()
                        .map(|p| vec![p.name.clone(), p.type_name.clone(), format_description(&p.description)])
                        .collect();
                    table(&mut md, &["Property", "Type", "Description"], &rows);
                }
            }
        }

        if !self.outputs.is_empty() {
            md.push_str("## Outputs\n\n");
            output_table(&mut md, &self.outputs);
        }

        md.push_str(FOOTER);
        md
    }
}

fn render_module(md: &mut String, module: &Module) {
    let _ = writeln!(md, "### {}\n", module.name);
    if !module.description.is_empty() {
        let _ = writeln!(md, "{}\n", module.description);
    }
    if !module.parameters.is_empty() {
        let _ = writeln!(md, "#### Parameters for {}\n", module.name);
        parameter_table(md, &module.parameters);
    }
    if !module.resources.is_empty() {
        let _ = writeln!(md, "#### Resources for {}\n", module.name);
        let rows: Vec<Vec<String>> = module
            .resources
            .iter()
            .map(|r| vec![r.name.clone(), r.type_name.clone(), r.api_version.clone()])
            .collect();
        table(md, &["Name", "Type", "API Version"], &rows);
    }
    if !module.outputs.is_empty() {
        let _ = writeln!(md, "#### Outputs for {}\n", module.name);
        output_table(md, &module.outputs);
    }
}

fn parameter_table(md: &mut String, parameters: &[Parameter]) {
    let rows: Vec<Vec<String>> = parameters
        .iter()
        .map(|p| {
            vec![
                p.name.clone(),
                format_description(&p.description),
                p.type_name.clone(),
                p.default.clone().unwrap_or_else(|| "n/a".to_string()),
                if p.required { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    table(md, &["Name", "Description", "Type", "Default", "Required"], &rows);
}

fn output_table(md: &mut String, outputs: &[Output]) {
    let rows: Vec<Vec<String>> = outputs
        .iter()
        .map(|o| vec![o.name.clone(), o.type_name.clone(), format_description(&o.description)])
        .collect();
    table(md, &["Name", "Type", "Description"], &rows);
}

fn table(md: &mut String, headers: &[&str], rows: &[Vec<String>]) {
    let _ = writeln!(md, "| {} |", headers.join(" | "));
    let _ = writeln!(md, "|{}", " :--- |".repeat(headers.len()));
    for row in rows {
        let cells: Vec<String> = row.iter().map(|c| c.replace('|', "\\|")).collect();
        let _ = writeln!(md, "| {} |", cells.join(" | "));
    }
    md.push('\n');
}

/// Fenced code blocks to `<pre><code>`, newlines to `<br>` so the text fits a table cell
pub fn format_description(description: &str) -> String {
    if description.is_empty() {
        return String::new();
    }
    let code_block = match Regex::new(r"(?s)```(\w*)\n(.*?)```") {
        Ok(re) => re,
        Err(_) => return description.replace('\n', "<br>"),
    };
    code_block
        .replace_all(description, r#"<pre><code class="language-$1">$2</code></pre>"#)
        .replace('\n', "<br>")
}

/// Replace the marked block in `existing`, or append the docs when no markers exist
pub fn inject(existing: &str, generated: &str) -> String {
    let start = existing.find(BEGIN_MARKER);
    let end = existing.find(END_MARKER).map(|i| i + END_MARKER.len());
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            let rest = existing[end..].strip_prefix('\n').unwrap_or(&existing[end..]);
            format!("{}{}{}", &existing[..start], generated, rest)
        }
        _ => {
            let mut out = existing.to_string();
            if !out.is_empty() && !out.ends_with("\n\n") {
                out.push_str(if out.ends_with('\n') { "\n" } else { "\n\n" });
            }
            out.push_str(generated);
            out
        }
    }
}

pub fn run(args: &BicepDocsArgs) -> Result<i32> {
    let raw = std::fs::read_to_string(&args.arm_json_file).map_err(|e| {
        Error::NotFound(format!("{}: {}", args.arm_json_file.display(), e))
    })?;
    let template: Value = serde_json::from_str(&raw).map_err(|e| {
        Error::Parse(format!("Invalid JSON in {}: {}", args.arm_json_file.display(), e))
    })?;

    let doc = ModuleDoc::from_arm(&template, args.modules_nesting_level);
    tracing::debug!(
        name = %doc.name,
        parameters = doc.parameters.len(),
        resources = doc.resources.len(),
        modules = doc.modules.len(),
        "Parsed ARM template"
    );
    let rendered = doc.render();

    let Some(output) = &args.output else {
        print!("{}", rendered);
        return Ok(0);
    };

    let content = if args.inject && output.exists() {
        inject(&std::fs::read_to_string(output)?, &rendered)
    } else {
        rendered
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, content)?;
    println!("Documentation successfully written to {}", output.display());
    Ok(0)
}
