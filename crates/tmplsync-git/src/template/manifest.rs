//! Repository manifest `.tmplsync/repository.json`.

use std::cmp::Ordering;

use semver::Version;
use serde::{Deserialize, Serialize};
use tmplsync_core::Filesystem;
use tmplsync_core::fs::join;

use crate::error::RepositoryError;

/// Directory with repository metadata.
pub const MANIFEST_DIR: &str = ".tmplsync";

/// Path of the manifest file.
pub const MANIFEST_PATH: &str = ".tmplsync/repository.json";

/// Directory shared by all templates of a repository.
pub const COMMON_DIR: &str = "_common";

/// Highest supported manifest format version.
pub const MAX_MANIFEST_VERSION: u32 = 2;

/// List of templates published by a repository.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub author: Author,
    #[serde(default)]
    pub templates: Vec<TemplateRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

/// One template and its published versions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Directory of the template, relative to the repository root.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    #[serde(default)]
    pub versions: Vec<VersionRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stable: bool,
    #[serde(default)]
    pub components: Vec<String>,
    /// Directory of the version, relative to the template directory.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

impl Manifest {
    /// Reads and validates the manifest of a repository.
    pub fn read(fs: &dyn Filesystem) -> Result<Self, RepositoryError> {
        if !fs.is_file(MANIFEST_PATH) {
            return Err(RepositoryError::ManifestNotFound(MANIFEST_PATH.to_string()));
        }
        let content = fs.read_to_string(MANIFEST_PATH)?;
        Self::parse(&content)
    }

    /// Parses and validates manifest JSON.
    pub fn parse(content: &str) -> Result<Self, RepositoryError> {
        let manifest: Self = serde_json::from_str(content).map_err(|e| RepositoryError::InvalidManifest {
            path: MANIFEST_PATH.to_string(),
            reason: e.to_string(),
        })?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks required fields and version numbers, reporting all problems.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        let mut problems = Vec::new();

        if self.version == 0 {
            problems.push("\"version\" is a required field".to_string());
        } else if self.version > MAX_MANIFEST_VERSION {
            problems.push(format!("\"version\" must be {MAX_MANIFEST_VERSION} or less"));
        }
        if self.author.name.is_empty() {
            problems.push("\"author.name\" is a required field".to_string());
        }
        if self.author.url.is_empty() {
            problems.push("\"author.url\" is a required field".to_string());
        }

        for (i, template) in self.templates.iter().enumerate() {
            if template.id.is_empty() {
                problems.push(format!("\"templates[{i}].id\" is a required field"));
            }
            check_path(&mut problems, &format!("templates[{i}].path"), &template.path, template.deprecated);
            for (j, version) in template.versions.iter().enumerate() {
                if parse_version(&version.version).is_none() {
                    problems.push(format!(
                        "\"templates[{i}].versions[{j}].version\" \"{}\" is not a valid semantic version",
                        version.version
                    ));
                }
                check_path(
                    &mut problems,
                    &format!("templates[{i}].versions[{j}].path"),
                    &version.path,
                    template.deprecated,
                );
            }
        }

        if problems.is_empty() {
            return Ok(());
        }
        Err(RepositoryError::InvalidManifest {
            path: MANIFEST_PATH.to_string(),
            reason: format!("repository manifest is not valid:\n- {}", problems.join("\n- ")),
        })
    }

    pub fn template(&self, id: &str) -> Option<&TemplateRecord> {
        self.templates.iter().find(|t| t.id == id)
    }
}

/// Deprecated templates are not present in the repository.
fn check_path(problems: &mut Vec<String>, field: &str, path: &str, deprecated: bool) {
    match (deprecated, path.is_empty()) {
        (false, true) => problems.push(format!("\"{field}\" is a required field")),
        (true, false) => problems.push(format!("\"{field}\" must be empty for a deprecated template")),
        _ => {},
    }
}

impl TemplateRecord {
    /// Selects a version.
    ///
    /// A requested version must match exactly, so `1.2` selects `1.2.0`.
    /// Without a request the highest stable version wins, or the highest
    /// version if none is stable.
    pub fn select_version(&self, requested: Option<&str>) -> Result<&VersionRecord, RepositoryError> {
        let not_found = |version: &str| RepositoryError::VersionNotFound {
            template: self.id.clone(),
            version: version.to_string(),
        };

        let mut parsed: Vec<(Version, &VersionRecord)> = self
            .versions
            .iter()
            .filter_map(|v| parse_version(&v.version).map(|p| (p, v)))
            .collect();
        parsed.sort_by(|a, b| compare(&a.0, &b.0));

        match requested {
            Some(requested) => {
                let wanted = parse_version(requested).ok_or_else(|| not_found(requested))?;
                parsed
                    .into_iter()
                    .find(|(v, _)| compare(v, &wanted) == Ordering::Equal)
                    .map(|(_, record)| record)
                    .ok_or_else(|| not_found(requested))
            },
            None => parsed
                .iter()
                .rev()
                .find(|(_, record)| record.stable)
                .or_else(|| parsed.last())
                .map(|(_, record)| *record)
                .ok_or_else(|| not_found("default")),
        }
    }

    /// Directory of `version`, relative to the repository root.
    pub fn version_path(&self, version: &VersionRecord) -> String {
        join(&self.path, &version.path)
    }
}

/// Parses `1`, `1.2`, `v1.2.3` and full semantic versions.
pub fn parse_version(value: &str) -> Option<Version> {
    let value = value.trim().trim_start_matches('v');
    let core_len = value.find(['-', '+']).unwrap_or(value.len());
    let dots = value[..core_len].matches('.').count();
    let padded = match dots {
        0 => format!("{}.0.0{}", &value[..core_len], &value[core_len..]),
        1 => format!("{}.0{}", &value[..core_len], &value[core_len..]),
        _ => value.to_string(),
    };
    Version::parse(&padded).ok()
}

/// Semver precedence, build metadata ignored.
fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp_precedence(b)
}
