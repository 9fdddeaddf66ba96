//! IaC repository tooling
//!
//! ## Responsibilities
//!
//! - `version_check`: AIO component versions vs published release manifests
//! - `pr_diff`: PR reference diff summaries and hunk paging
//! - `link_lang`: locale-pinned (`en-us/`) documentation links
//! - `tf_vars`: Terraform variable description consistency
//! - `bicep_docs`: Markdown docs from compiled Bicep
//!
//! Tools return an exit code: 0 on success, 1 when the check fails.

pub mod bicep_docs;
pub mod hcl;
pub mod link_lang;
pub mod pr_diff;
pub mod tf_vars;
pub mod version_check;

pub use bicep_docs::BicepDocsArgs;
pub use link_lang::LinkLangArgs;
pub use pr_diff::PrDiffArgs;
pub use tf_vars::TfVarsArgs;
pub use version_check::VersionCheckArgs;
