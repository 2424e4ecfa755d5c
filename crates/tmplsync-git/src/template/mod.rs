//! Template lookup on top of repository snapshots.

mod manifest;
mod resolver;

pub use manifest::{
    Author, COMMON_DIR, MANIFEST_DIR, MANIFEST_PATH, MAX_MANIFEST_VERSION, Manifest, TemplateRecord, VersionRecord,
    parse_version,
};
pub use resolver::{ResolvedTemplate, TemplateFsResolver};
