//! Azure IoT Operations component version check
//!
//! ## Responsibilities
//!
//! - Resolve the enablement/instance manifest URLs from GitHub releases
//!   (release assets first, release branch second, legacy `main` last)
//! - Read local component versions from Terraform variable defaults and
//!   Bicep `var` blocks
//! - Report version/train mismatches as JSON

use super::hcl;
use crate::error::{Error, Result};
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const LEGACY_ENABLEMENT_URL: &str = "https://raw.githubusercontent.com/Azure/azure-iot-operations/main/release/azure-iot-operations-enablement.json";
pub const LEGACY_INSTANCE_URL: &str = "https://raw.githubusercontent.com/Azure/azure-iot-operations/main/release/azure-iot-operations-instance.json";
pub const GITHUB_API_BASE: &str = "https://api.github.com/repos/Azure/azure-iot-operations";
const RAW_REPO_BASE: &str = "https://raw.githubusercontent.com/Azure/azure-iot-operations";
const ENABLEMENT_ASSET: &str = "azure-iot-operations-enablement.json";
const INSTANCE_ASSET: &str = "azure-iot-operations-instance.json";

pub const TERRAFORM_VARS_FILE: &str = "src/100-edge/110-iot-ops/terraform/variables.init.tf";
pub const TERRAFORM_VARS_INSTANCE_FILE: &str =
    "src/100-edge/110-iot-ops/terraform/variables.instance.tf";
pub const BICEP_VARS_FILE: &str = "src/100-edge/110-iot-ops/bicep/types.bicep";

/// Terraform local name -> manifest key
pub const TERRAFORM_COMPONENTS: [(&str, &str); 4] = [
    ("platform", "platform"),
    ("secret_sync_controller", "secretStore"),
    ("edge_storage_accelerator", "containerStorage"),
    ("azure-iot-operations", "iotOperations"),
];

/// Bicep variable name -> manifest key
pub const BICEP_COMPONENTS: [(&str, &str); 4] = [
    ("aioPlatformExtensionDefaults", "platform"),
    ("secretStoreExtensionDefaults", "secretStore"),
    ("containerStorageExtensionDefaults", "containerStorage"),
    ("aioExtensionDefaults", "iotOperations"),
];

const INSTANCE_COMPONENT: &str = "azure-iot-operations";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum IacType {
    Terraform,
    Bicep,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Channel {
    Stable,
    Preview,
}

#[derive(Debug, Clone, clap::Args)]
pub struct VersionCheckArgs {
    /// Exit with status 1 when versions don't match
    #[arg(long = "error-on-mismatch")]
    pub error_on_mismatch: bool,
    #[arg(short = 't', long = "iac-type", value_enum, default_value_t = IacType::All)]
    pub iac_type: IacType,
    /// Fail instead of falling back to legacy URLs when the GitHub API is unavailable
    #[arg(long = "strict-latest")]
    pub strict_latest: bool,
    /// Require the manifests as release assets (no release-branch fallback)
    #[arg(long = "require-asset-files")]
    pub require_asset_files: bool,
    /// Print the resolved manifest URLs as JSON and exit
    #[arg(long = "print-manifest-urls")]
    pub print_manifest_urls: bool,
    /// Release tag to resolve (e.g. v1.2.36); overrides --channel
    #[arg(long = "release-tag")]
    pub release_tag: Option<String>,
    #[arg(long, value_enum, default_value_t = Channel::Stable)]
    pub channel: Channel,
    /// Repository root the IaC paths are relative to
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestSource {
    Legacy,
    Assets,
    Branch,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestMeta {
    pub source: ManifestSource,
    pub tag_name: String,
    pub target_commitish: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManifestUrls {
    pub enablement_url: String,
    pub instance_url: String,
    pub meta: ManifestMeta,
}

impl ManifestUrls {
    pub fn legacy() -> Self {
        Self {
            enablement_url: LEGACY_ENABLEMENT_URL.to_string(),
            instance_url: LEGACY_INSTANCE_URL.to_string(),
            meta: ManifestMeta {
                source: ManifestSource::Legacy,
                tag_name: String::new(),
                target_commitish: String::new(),
            },
        }
    }

    /// Manifest a component's remote version is read from
    pub fn url_for(&self, component: &str) -> &str {
        if component == INSTANCE_COMPONENT {
            &self.instance_url
        } else {
            &self.enablement_url
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub version: String,
    pub train: String,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteVersion {
    pub version: String,
    pub train: String,
}

#[derive(Debug, Clone)]
pub struct Manifests {
    pub enablement: Value,
    pub instance: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mismatch {
    pub iac_type: String,
    pub name: String,
    pub local_file: String,
    pub remote_url: String,
    pub local_version: String,
    pub remote_version: String,
    pub local_train: String,
    pub remote_train: String,
}

/// Pick manifest URLs out of a GitHub release object
pub fn urls_from_release(release: &Value, require_asset_files: bool) -> Result<ManifestUrls> {
    let tag_name = release["tag_name"].as_str().unwrap_or_default().to_string();
    let target_commitish = release["target_commitish"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    let assets = release["assets"].as_array().cloned().unwrap_or_default();
    tracing::debug!(
        tag = %tag_name,
        target_commitish = %target_commitish,
        assets = assets.len(),
        "Resolved release"
    );

    let asset_url = |name: &str| {
        assets
            .iter()
            .find(|a| a["name"].as_str() == Some(name))
            .and_then(|a| a["browser_download_url"].as_str())
            .filter(|u| !u.is_empty())
            .map(String::from)
    };
    let meta = |source: ManifestSource| ManifestMeta {
        source,
        tag_name: tag_name.clone(),
        target_commitish: target_commitish.clone(),
    };

    if let (Some(enablement_url), Some(instance_url)) =
        (asset_url(ENABLEMENT_ASSET), asset_url(INSTANCE_ASSET))
    {
        tracing::debug!("Resolved manifest URLs from release assets");
        return Ok(ManifestUrls {
            enablement_url,
            instance_url,
            meta: meta(ManifestSource::Assets),
        });
    }

    if require_asset_files {
        return Err(Error::NotFound(
            "Required manifest JSON files not found in release assets.".to_string(),
        ));
    }
    if target_commitish.is_empty() && tag_name.is_empty() {
        return Err(Error::Validation(
            "Cannot construct fallback URL: both target_commitish and tag_name are empty."
                .to_string(),
        ));
    }

    let reference = if target_commitish.is_empty() {
        format!("release/{}", tag_name)
    } else {
        target_commitish.clone()
    };
    let urls = ManifestUrls {
        enablement_url: format!("{}/{}/release/{}", RAW_REPO_BASE, reference, ENABLEMENT_ASSET),
        instance_url: format!("{}/{}/release/{}", RAW_REPO_BASE, reference, INSTANCE_ASSET),
        meta: meta(ManifestSource::Branch),
    };
    tracing::debug!(
        enablement = %urls.enablement_url,
        instance = %urls.instance_url,
        "Assets not found, falling back to branch URLs"
    );
    Ok(urls)
}

/// GitHub releases API + manifest download
pub struct ManifestResolver {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl ManifestResolver {
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: GITHUB_API_BASE.to_string(),
            token,
        }
    }

    /// `GITHUB_TOKEN`, then `GH_TOKEN`
    pub fn from_env() -> Self {
        let token = crate::config::env_opt("GITHUB_TOKEN").or_else(|| crate::config::env_opt("GH_TOKEN"));
        Self::new(token)
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn release_api_url(&self, release_tag: Option<&str>, channel: Channel) -> String {
        match (release_tag, channel) {
            (Some(tag), _) => format!("{}/releases/tags/{}", self.api_base, tag),
            (None, Channel::Preview) => format!("{}/releases", self.api_base),
            (None, Channel::Stable) => format!("{}/releases/latest", self.api_base),
        }
    }

    async fn get_json(&self, url: &str, timeout: Duration) -> Result<Value> {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, concat!("edgekit/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json")
            .timeout(timeout);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if response.status() == StatusCode::FORBIDDEN {
            tracing::warn!("GitHub API rate limited. Set GITHUB_TOKEN to increase limits.");
        }
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn resolve(
        &self,
        release_tag: Option<&str>,
        channel: Channel,
        require_asset_files: bool,
        strict_latest: bool,
    ) -> Result<ManifestUrls> {
        let url = self.release_api_url(release_tag, channel);
        tracing::debug!(url = %url, "Querying GitHub releases API");

        let data = match self.get_json(&url, Duration::from_secs(10)).await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "Failed to query release from GitHub API");
                if strict_latest {
                    return Err(e);
                }
                return Ok(ManifestUrls::legacy());
            }
        };

        let release = if release_tag.is_none() && channel == Channel::Preview {
            let releases = data.as_array().ok_or_else(|| {
                Error::Parse("Unexpected response for releases list.".to_string())
            })?;
            releases
                .iter()
                .find(|r| r["prerelease"].as_bool().unwrap_or(false))
                .cloned()
                .ok_or_else(|| Error::NotFound("No preview releases found.".to_string()))?
        } else {
            data
        };
        urls_from_release(&release, require_asset_files)
    }

    pub async fn download(&self, urls: &ManifestUrls) -> Result<Manifests> {
        let timeout = Duration::from_secs(15);
        let enablement = self.get_json(&urls.enablement_url, timeout).await.map_err(|e| {
            Error::Network(format!("Failed to download enablement manifest: {}", e))
        })?;
        let instance = self.get_json(&urls.instance_url, timeout).await.map_err(|e| {
            Error::Network(format!("Failed to download instance manifest: {}", e))
        })?;
        tracing::debug!(
            enablement_keys = ?manifest_keys(&enablement),
            instance_keys = ?manifest_keys(&instance),
            "Downloaded manifests"
        );
        Ok(Manifests {
            enablement,
            instance,
        })
    }
}

fn manifest_keys(manifest: &Value) -> Vec<String> {
    manifest["variables"]["VERSIONS"]
        .as_object()
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default()
}

fn object_component(name: &str, default: &hcl::Value) -> Option<Component> {
    let version = default.get_str("version");
    let train = default.get_str("train");
    (!version.is_empty() || !train.is_empty()).then(|| Component {
        name: name.to_string(),
        version,
        train,
        namespace: None,
    })
}

/// `variable "X" { default = { version, train } }` in the init file plus
/// `operations_config` in the instance file
pub fn terraform_components(init_src: &str, instance_src: &str) -> Result<Vec<Component>> {
    let mut components: Vec<Component> = hcl::variables(&hcl::parse(init_src)?)
        .iter()
        .filter_map(|v| object_component(&v.name, v.default.as_ref()?))
        .collect();

    let instance_vars = hcl::variables(&hcl::parse(instance_src)?);
    let operations = instance_vars
        .iter()
        .find(|v| v.name == "operations_config")
        .and_then(|v| v.default.as_ref());
    if let Some(default) = operations {
        if let Some(mut component) = object_component(INSTANCE_COMPONENT, default) {
            component.namespace = Some(default.get_str("namespace"));
            components.push(component);
        }
    }
    Ok(components)
}

/// Terraform-side name for a manifest key
fn local_name_for(remote: &str) -> &str {
    TERRAFORM_COMPONENTS
        .iter()
        .find(|(_, r)| *r == remote)
        .map(|(local, _)| *local)
        .unwrap_or(remote)
}

pub fn bicep_components(src: &str) -> Result<Vec<Component>> {
    let version_re = Regex::new(r#"version: ['"]?([^'",\s]+)['"]?"#)?;
    let train_re = Regex::new(r#"train: ['"]?([^'",\s]+)['"]?"#)?;

    let mut components = Vec::new();
    for (bicep_name, remote) in BICEP_COMPONENTS {
        let block_re = Regex::new(&format!(r"var {} = \{{[\s\S]*?\}}", regex::escape(bicep_name)))?;
        let Some(block) = block_re.find(src) else {
            continue;
        };
        let capture = |re: &Regex| {
            re.captures(block.as_str())
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        };
        let version = capture(&version_re);
        let train = capture(&train_re);
        if version.is_empty() && train.is_empty() {
            continue;
        }
        components.push(Component {
            name: local_name_for(remote).to_string(),
            version,
            train,
            namespace: None,
        });
    }
    Ok(components)
}

/// Remote version/train keyed by Terraform component name
pub fn extract_remote_versions(manifests: &Manifests) -> BTreeMap<String, RemoteVersion> {
    TERRAFORM_COMPONENTS
        .iter()
        .map(|(local, remote)| {
            let manifest = if *remote == "iotOperations" {
                &manifests.instance
            } else {
                &manifests.enablement
            };
            let variables = &manifest["variables"];
            let remote_version = RemoteVersion {
                version: variables["VERSIONS"][*remote].as_str().unwrap_or_default().to_string(),
                train: variables["TRAINS"][*remote].as_str().unwrap_or_default().to_string(),
            };
            tracing::debug!(
                component = %local,
                remote = %remote,
                version = %remote_version.version,
                train = %remote_version.train,
                "Remote component"
            );
            (local.to_string(), remote_version)
        })
        .collect()
}

fn differs(local: &str, remote: &str) -> bool {
    !local.is_empty() && !remote.is_empty() && local != remote
}

pub fn compare_versions(
    iac_type: &str,
    local: &[Component],
    remote: &BTreeMap<String, RemoteVersion>,
    local_file: &str,
    urls: &ManifestUrls,
) -> Vec<Mismatch> {
    local
        .iter()
        .filter_map(|component| {
            let remote_version = remote.get(&component.name)?;
            let mismatch = differs(&component.version, &remote_version.version)
                || differs(&component.train, &remote_version.train);
            mismatch.then(|| Mismatch {
                iac_type: iac_type.to_string(),
                name: component.name.clone(),
                local_file: local_file.to_string(),
                remote_url: urls.url_for(&component.name).to_string(),
                local_version: component.version.clone(),
                remote_version: remote_version.version.clone(),
                local_train: component.train.clone(),
                remote_train: remote_version.train.clone(),
            })
        })
        .collect()
}

fn read(root: &Path, relative: &str) -> Result<String> {
    std::fs::read_to_string(root.join(relative)).map_err(|e| {
        Error::Io(std::io::Error::new(e.kind(), format!("{}: {}", relative, e)))
    })
}

/// Mismatches for the selected IaC flavours
pub fn check_local(
    args: &VersionCheckArgs,
    manifests: &Manifests,
    urls: &ManifestUrls,
) -> Result<Vec<Mismatch>> {
    let remote = extract_remote_versions(manifests);
    let mut mismatches = Vec::new();

    if matches!(args.iac_type, IacType::Terraform | IacType::All) {
        tracing::debug!("Checking Terraform files");
        let components = terraform_components(
            &read(&args.root, TERRAFORM_VARS_FILE)?,
            &read(&args.root, TERRAFORM_VARS_INSTANCE_FILE)?,
        )?;
        mismatches.extend(compare_versions("terraform", &components, &remote, TERRAFORM_VARS_FILE, urls));
    }
    if matches!(args.iac_type, IacType::Bicep | IacType::All) {
        tracing::debug!("Checking Bicep files");
        let components = bicep_components(&read(&args.root, BICEP_VARS_FILE)?)?;
        mismatches.extend(compare_versions("bicep", &components, &remote, BICEP_VARS_FILE, urls));
    }
    Ok(mismatches)
}

pub async fn run(args: &VersionCheckArgs) -> Result<i32> {
    run_with(&ManifestResolver::from_env(), args).await
}

pub async fn run_with(resolver: &ManifestResolver, args: &VersionCheckArgs) -> Result<i32> {
    let resolved = resolver
        .resolve(
            args.release_tag.as_deref(),
            args.channel,
            args.require_asset_files,
            args.strict_latest,
        )
        .await;
    let urls = match resolved {
        Ok(urls) => urls,
        Err(e) => {
            tracing::error!(error = %e, "Failed to resolve manifest URLs");
            return Ok(1);
        }
    };

    if args.print_manifest_urls {
        println!("{}", serde_json::to_string_pretty(&urls)?);
        return Ok(0);
    }

    tracing::debug!(
        source = ?urls.meta.source,
        tag = %urls.meta.tag_name,
        reference = %urls.meta.target_commitish,
        "Manifest resolution"
    );
    let manifests = match resolver.download(&urls).await {
        Ok(m) => m,
        Err(e) => {
            tracing::error!(error = %e, "Failed to download manifests");
            return Ok(1);
        }
    };

    let mismatches = check_local(args, &manifests, &urls)?;
    println!("{}", serde_json::to_string_pretty(&mismatches)?);
    if !mismatches.is_empty() && args.error_on_mismatch {
        tracing::debug!(count = mismatches.len(), "Exiting with error due to version mismatches");
        return Ok(1);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, routing::get, Json, Router};
    use serde_json::json;

    const INIT_TF: &str = r#"
variable "platform" {
  type = object({ version = string, train = string })
  default = {
    version = "0.7.6"
    train   = "preview"
  }
}

variable "secret_sync_controller" {
  default = {
    version = "0.6.7"
    train   = "preview"
  }
}

variable "edge_storage_accelerator" {
  default = {
    name    = "esa"
    version = "2.2.2"
    train   = "stable"
  }
}

variable "unrelated" {
  default = "x"
}
"#;

    const INSTANCE_TF: &str = r#"
variable "operations_config" {
  description = "AIO instance settings"
  default = {
    namespace = "azure-iot-operations"
    version   = "1.0.9"
    train     = "stable"
  }
}
"#;

    const TYPES_BICEP: &str = r#"
@export()
var aioPlatformExtensionDefaults = {
  name: 'azure-iot-operations-platform'
  release: {
    version: '0.7.6'
    train: 'preview'
  }
}

var secretStoreExtensionDefaults = {
  release: {
    version: '0.6.7'
    train: 'preview'
  }
}

var aioExtensionDefaults = {
  release: {
    version: "1.1.19"
    train: "stable"
  }
}
"#;

    fn manifests() -> Manifests {
        Manifests {
            enablement: json!({"variables": {
                "VERSIONS": {"platform": "0.7.6", "secretStore": "0.8.1", "containerStorage": ""},
                "TRAINS": {"platform": "preview", "secretStore": "stable", "containerStorage": "stable"}
            }}),
            instance: json!({"variables": {
                "VERSIONS": {"iotOperations": "1.1.19"},
                "TRAINS": {"iotOperations": "stable"}
            }}),
        }
    }

    #[test]
    fn test_terraform_components() {
        let components = terraform_components(INIT_TF, INSTANCE_TF).unwrap();
        let names: Vec<&str> = components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["platform", "secret_sync_controller", "edge_storage_accelerator", "azure-iot-operations"]
        );
        assert_eq!(components[3].version, "1.0.9");
        assert_eq!(components[3].namespace.as_deref(), Some("azure-iot-operations"));
    }

    #[test]
    fn test_bicep_components() {
        let components = bicep_components(TYPES_BICEP).unwrap();
        assert_eq!(components.len(), 3);
        assert_eq!(components[0].name, "platform");
        assert_eq!(components[0].version, "0.7.6");
        assert_eq!(components[1].name, "secret_sync_controller");
        assert_eq!(components[2].name, "azure-iot-operations");
        assert_eq!(components[2].version, "1.1.19");
        assert_eq!(components[2].train, "stable");
    }

    #[test]
    fn test_compare_versions() {
        let remote = extract_remote_versions(&manifests());
        assert_eq!(remote["azure-iot-operations"].version, "1.1.19");

        let urls = ManifestUrls::legacy();
        let local = terraform_components(INIT_TF, INSTANCE_TF).unwrap();
        let mismatches = compare_versions("terraform", &local, &remote, TERRAFORM_VARS_FILE, &urls);
        let names: Vec<&str> = mismatches.iter().map(|m| m.name.as_str()).collect();
        // empty remote containerStorage version is not a mismatch
        assert_eq!(names, vec!["secret_sync_controller", "azure-iot-operations"]);
        assert_eq!(mismatches[0].remote_url, LEGACY_ENABLEMENT_URL);
        assert_eq!(mismatches[1].remote_url, LEGACY_INSTANCE_URL);
        assert_eq!(mismatches[1].local_version, "1.0.9");

        let value = serde_json::to_value(&mismatches[0]).unwrap();
        assert_eq!(value["iac_type"], "terraform");
        assert_eq!(value["remote_train"], "stable");
    }

    #[test]
    fn test_urls_from_release() {
        let with_assets = json!({
            "tag_name": "v1.2.36",
            "target_commitish": "release/v1.2.36",
            "assets": [
                {"name": ENABLEMENT_ASSET, "browser_download_url": "https://dl/e.json"},
                {"name": INSTANCE_ASSET, "browser_download_url": "https://dl/i.json"}
            ]
        });
        let urls = urls_from_release(&with_assets, true).unwrap();
        assert_eq!(urls.meta.source, ManifestSource::Assets);
        assert_eq!(urls.instance_url, "https://dl/i.json");

        let no_assets = json!({"tag_name": "v1.2.36", "target_commitish": "", "assets": []});
        let urls = urls_from_release(&no_assets, false).unwrap();
        assert_eq!(urls.meta.source, ManifestSource::Branch);
        assert_eq!(
            urls.enablement_url,
            "https://raw.githubusercontent.com/Azure/azure-iot-operations/release/v1.2.36/release/azure-iot-operations-enablement.json"
        );
        assert!(matches!(urls_from_release(&no_assets, true), Err(Error::NotFound(_))));
        assert!(matches!(urls_from_release(&json!({}), false), Err(Error::Validation(_))));
    }

    async fn fake_github() -> String {
        async fn latest(State(base): State<String>) -> Json<Value> {
            Json(json!({
                "tag_name": "v1.2.36",
                "target_commitish": "main",
                "assets": [
                    {"name": ENABLEMENT_ASSET, "browser_download_url": format!("{}/files/enablement.json", base)},
                    {"name": INSTANCE_ASSET, "browser_download_url": format!("{}/files/instance.json", base)}
                ]
            }))
        }
        async fn releases() -> Json<Value> {
            Json(json!([
                {"tag_name": "v1.2.36", "prerelease": false, "target_commitish": "main"},
                {"tag_name": "v1.3.0-preview", "prerelease": true, "target_commitish": "release/v1.3.0"}
            ]))
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let m = manifests();
        let (enablement, instance) = (m.enablement, m.instance);
        let app = Router::new()
            .route("/releases/latest", get(latest))
            .route("/releases", get(releases))
            .route("/files/enablement.json", get(move || async move { Json(enablement) }))
            .route("/files/instance.json", get(move || async move { Json(instance) }))
            .with_state(base.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    #[tokio::test]
    async fn test_resolve_and_download() {
        let base = fake_github().await;
        let resolver = ManifestResolver::new(Some("token".into())).with_api_base(&base);

        let urls = resolver.resolve(None, Channel::Stable, true, true).await.unwrap();
        assert_eq!(urls.meta.source, ManifestSource::Assets);
        let downloaded = resolver.download(&urls).await.unwrap();
        assert_eq!(downloaded.instance["variables"]["VERSIONS"]["iotOperations"], "1.1.19");

        let preview = resolver.resolve(None, Channel::Preview, false, true).await.unwrap();
        assert_eq!(preview.meta.source, ManifestSource::Branch);
        assert_eq!(preview.meta.tag_name, "v1.3.0-preview");
        assert!(preview.enablement_url.contains("/release/v1.3.0/release/"));

        // unknown tag -> 404
        let fallback = resolver.resolve(Some("v0.0.1"), Channel::Stable, false, false).await.unwrap();
        assert_eq!(fallback, ManifestUrls::legacy());
        assert!(resolver.resolve(Some("v0.0.1"), Channel::Stable, false, true).await.is_err());
    }

    #[tokio::test]
    async fn test_run_against_local_tree() {
        let base = fake_github().await;
        let resolver = ManifestResolver::new(None).with_api_base(&base);
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in [
            (TERRAFORM_VARS_FILE, INIT_TF),
            (TERRAFORM_VARS_INSTANCE_FILE, INSTANCE_TF),
            (BICEP_VARS_FILE, TYPES_BICEP),
        ] {
            let path = dir.path().join(path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }

        let mut args = VersionCheckArgs {
            error_on_mismatch: false,
            iac_type: IacType::All,
            strict_latest: true,
            require_asset_files: false,
            print_manifest_urls: false,
            release_tag: None,
            channel: Channel::Stable,
            root: dir.path().to_path_buf(),
        };
        assert_eq!(run_with(&resolver, &args).await.unwrap(), 0);
        args.error_on_mismatch = true;
        assert_eq!(run_with(&resolver, &args).await.unwrap(), 1);

        // bicep alone: only secretStore differs
        let urls = resolver.resolve(None, Channel::Stable, false, true).await.unwrap();
        let manifests = resolver.download(&urls).await.unwrap();
        args.iac_type = IacType::Bicep;
        let mismatches = check_local(&args, &manifests, &urls).unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].name, "secret_sync_controller");
        assert_eq!(mismatches[0].iac_type, "bicep");
    }
}
