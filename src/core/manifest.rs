//! Package and destructive-change manifests.
//!
//! Both manifests are built incrementally as in-memory ordered mappings and
//! serialized exactly once at the end of package generation. Incremental text
//! patching of the serialized format is what produced duplicate grouping
//! elements when several deletions shared a metadata type; the ordered
//! mapping makes that state unrepresentable.

use std::path::Path;

use serde::Serialize;

use crate::core::error::{Error, Result};
use crate::core::git::{ChangedFile, Presence};

pub const MANIFEST_XMLNS: &str = "http://soap.sforce.com/2006/04/metadata";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub metadata_type: String,
    pub members: Vec<String>,
}

/// Ordered mapping of metadata type to member names. Each type appears at
/// most once; each member at most once within its type.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member under a metadata type. Re-adding an existing member
    /// is a no-op; returns whether the member was newly inserted.
    pub fn add(&mut self, metadata_type: &str, member: &str) -> bool {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.metadata_type == metadata_type)
        {
            if entry.members.iter().any(|m| m == member) {
                return false;
            }
            entry.members.push(member.to_string());
            return true;
        }

        self.entries.push(ManifestEntry {
            metadata_type: metadata_type.to_string(),
            members: vec![member.to_string()],
        });
        true
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn member_count(&self) -> usize {
        self.entries.iter().map(|e| e.members.len()).sum()
    }

    /// Serialize to the platform manifest format: a root element carrying
    /// the API version token and one grouping element per metadata type,
    /// members in insertion order.
    pub fn to_xml(&self, api_version: &str) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str(&format!("<Package xmlns=\"{}\">\n", MANIFEST_XMLNS));
        for entry in &self.entries {
            xml.push_str("    <types>\n");
            for member in &entry.members {
                xml.push_str(&format!("        <members>{}</members>\n", escape(member)));
            }
            xml.push_str(&format!("        <name>{}</name>\n", escape(&entry.metadata_type)));
            xml.push_str("    </types>\n");
        }
        xml.push_str(&format!("    <version>{}</version>\n", api_version));
        xml.push_str("</Package>\n");
        xml
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// The two manifests produced from one commit diff.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSet {
    pub package: Manifest,
    pub destructive: Manifest,
}

/// Accumulates changed files into package and destructive manifests.
pub struct ManifestBuilder {
    source_root: String,
    package: Manifest,
    destructive: Manifest,
}

impl ManifestBuilder {
    pub fn new(source_root: &str) -> Self {
        Self {
            source_root: source_root.to_string(),
            package: Manifest::new(),
            destructive: Manifest::new(),
        }
    }

    /// Route one changed file: present files join the package manifest,
    /// deleted files the destructive manifest. Files without a metadata-type
    /// segment under the source root are ignored.
    pub fn record(&mut self, file: &ChangedFile) {
        let Some((metadata_type, member)) = derive_member(&self.source_root, &file.path) else {
            return;
        };
        match file.presence {
            Presence::Present => self.package.add(&metadata_type, &member),
            Presence::Deleted => self.destructive.add(&metadata_type, &member),
        };
    }

    /// Finalize after the full diff has been processed.
    ///
    /// A diff that produced no manifest members at all (every change under an
    /// ignored path) is not deployable. A package-empty set with destructive
    /// members still deploys: destructive changes ship alongside an empty
    /// package manifest.
    pub fn finish(self) -> Result<ManifestSet> {
        if self.package.is_empty() && self.destructive.is_empty() {
            return Err(Error::package_no_deployable_metadata());
        }
        Ok(ManifestSet {
            package: self.package,
            destructive: self.destructive,
        })
    }
}

/// Derive (metadataType, memberName) from a changed path: the metadata type
/// is the path segment immediately following the managed source root, the
/// member is the file's base name without extension. Sidecar `-meta.xml`
/// companions collapse onto their artifact's member name.
fn derive_member(source_root: &str, path: &Path) -> Option<(String, String)> {
    let relative = path.strip_prefix(source_root).ok()?;
    let mut components = relative.components();

    let metadata_type = components.next()?.as_os_str().to_str()?.to_string();
    let file_name = relative.file_name()?.to_str()?;
    if components.next().is_none() {
        // The type segment itself was the file name; nothing deployable.
        return None;
    }

    let base = file_name.strip_suffix("-meta.xml").unwrap_or(file_name);
    let member = Path::new(base).file_stem()?.to_str()?.to_string();
    if member.is_empty() {
        return None;
    }

    Some((metadata_type, member))
}
