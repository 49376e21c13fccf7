//! `maven-metadata.xml` codec.
//!
//! Parsing is lenient about element order and whitespace; writing is
//! deterministic so that regenerating an unchanged tree produces
//! byte-identical documents.

use crate::error::{ErrorKind, Result};
use crate::model::{Metadata, Plugin, Snapshot, SnapshotVersion, Versioning};
use exn::{OptionExt, ResultExt};
use std::fmt::Write;

fn child_element<'a, 'i>(node: &roxmltree::Node<'a, 'i>, name: &str) -> Option<roxmltree::Node<'a, 'i>> {
    node.children().find(|n| n.is_element() && n.tag_name().name() == name)
}

fn child_elements<'a, 'i>(
    node: roxmltree::Node<'a, 'i>,
    name: &'static str,
) -> impl Iterator<Item = roxmltree::Node<'a, 'i>> {
    node.children().filter(move |n| n.is_element() && n.tag_name().name() == name)
}

fn child_text(node: &roxmltree::Node<'_, '_>, name: &str) -> Option<String> {
    child_element(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn parse_snapshot(node: &roxmltree::Node<'_, '_>) -> Result<Snapshot> {
    let build_number = match child_text(node, "buildNumber") {
        Some(text) => Some(text.parse::<u32>().or_raise(|| ErrorKind::Malformed(format!("buildNumber {text:?}")))?),
        None => None,
    };
    Ok(Snapshot {
        timestamp: child_text(node, "timestamp"),
        build_number,
        local_copy: child_text(node, "localCopy").is_some_and(|text| text.eq_ignore_ascii_case("true")),
    })
}

fn parse_snapshot_version(node: &roxmltree::Node<'_, '_>) -> Result<SnapshotVersion> {
    let missing = |field: &str| ErrorKind::Malformed(format!("snapshotVersion without {field}"));
    Ok(SnapshotVersion {
        classifier: child_text(node, "classifier"),
        extension: child_text(node, "extension").ok_or_raise(|| missing("extension"))?,
        value: child_text(node, "value").ok_or_raise(|| missing("value"))?,
        updated: child_text(node, "updated"),
    })
}

fn parse_versioning(node: &roxmltree::Node<'_, '_>) -> Result<Versioning> {
    let versions = match child_element(node, "versions") {
        Some(versions) => {
            child_elements(versions, "version").filter_map(|n| n.text()).map(|t| t.trim().to_string()).collect()
        },
        None => Vec::new(),
    };
    let snapshot = child_element(node, "snapshot").map(|n| parse_snapshot(&n)).transpose()?;
    let snapshot_versions = match child_element(node, "snapshotVersions") {
        Some(list) => {
            child_elements(list, "snapshotVersion").map(|n| parse_snapshot_version(&n)).collect::<Result<_>>()?
        },
        None => Vec::new(),
    };
    Ok(Versioning {
        latest: child_text(node, "latest"),
        release: child_text(node, "release"),
        versions,
        last_updated: child_text(node, "lastUpdated"),
        snapshot,
        snapshot_versions,
    })
}

fn parse_plugin(node: &roxmltree::Node<'_, '_>) -> Result<Plugin> {
    let missing = |field: &str| ErrorKind::Malformed(format!("plugin without {field}"));
    Ok(Plugin {
        name: child_text(node, "name"),
        prefix: child_text(node, "prefix").ok_or_raise(|| missing("prefix"))?,
        artifact_id: child_text(node, "artifactId").ok_or_raise(|| missing("artifactId"))?,
    })
}

/// Parse a metadata document.
pub fn parse(bytes: &[u8]) -> Result<Metadata> {
    let text = std::str::from_utf8(bytes).or_raise(|| ErrorKind::Malformed("not UTF-8".to_string()))?;
    let document =
        roxmltree::Document::parse(text).or_raise(|| ErrorKind::Malformed("not well-formed XML".to_string()))?;
    let root = document.root_element();
    if root.tag_name().name() != "metadata" {
        exn::bail!(ErrorKind::Malformed(format!("unexpected root element <{}>", root.tag_name().name())));
    }
    let versioning = child_element(&root, "versioning").map(|n| parse_versioning(&n)).transpose()?;
    let plugins = match child_element(&root, "plugins") {
        Some(list) => child_elements(list, "plugin").map(|n| parse_plugin(&n)).collect::<Result<_>>()?,
        None => Vec::new(),
    };
    Ok(Metadata {
        group_id: child_text(&root, "groupId"),
        artifact_id: child_text(&root, "artifactId"),
        version: child_text(&root, "version"),
        versioning,
        plugins,
    })
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn open(&mut self, tag: &str) {
        self.indent();
        let _ = writeln!(self.out, "<{tag}>");
        self.depth += 1;
    }

    fn close(&mut self, tag: &str) {
        self.depth -= 1;
        self.indent();
        let _ = writeln!(self.out, "</{tag}>");
    }

    fn empty(&mut self, tag: &str) {
        self.indent();
        let _ = writeln!(self.out, "<{tag}/>");
    }

    fn text(&mut self, tag: &str, value: &str) {
        self.indent();
        let _ = writeln!(self.out, "<{tag}>{}</{tag}>", escape(value));
    }

    fn optional(&mut self, tag: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.text(tag, value);
        }
    }
}

/// Serialise a metadata document.
pub fn to_xml(metadata: &Metadata) -> String {
    let mut w = XmlWriter {
        out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<metadata modelVersion=\"1.1.0\">\n"),
        depth: 1,
    };
    w.optional("groupId", metadata.group_id.as_deref());
    w.optional("artifactId", metadata.artifact_id.as_deref());
    w.optional("version", metadata.version.as_deref());
    if let Some(versioning) = &metadata.versioning {
        w.open("versioning");
        w.optional("latest", versioning.latest.as_deref());
        w.optional("release", versioning.release.as_deref());
        if let Some(snapshot) = &versioning.snapshot {
            w.open("snapshot");
            w.optional("timestamp", snapshot.timestamp.as_deref());
            if let Some(build_number) = snapshot.build_number {
                w.text("buildNumber", &build_number.to_string());
            }
            if snapshot.local_copy {
                w.text("localCopy", "true");
            }
            w.close("snapshot");
        }
        if !versioning.versions.is_empty() {
            w.open("versions");
            for version in &versioning.versions {
                w.text("version", version);
            }
            w.close("versions");
        } else if versioning.snapshot.is_none() && versioning.snapshot_versions.is_empty() {
            w.empty("versions");
        }
        w.optional("lastUpdated", versioning.last_updated.as_deref());
        if !versioning.snapshot_versions.is_empty() {
            w.open("snapshotVersions");
            for snapshot_version in &versioning.snapshot_versions {
                w.open("snapshotVersion");
                w.optional("classifier", snapshot_version.classifier.as_deref());
                w.text("extension", &snapshot_version.extension);
                w.text("value", &snapshot_version.value);
                w.optional("updated", snapshot_version.updated.as_deref());
                w.close("snapshotVersion");
            }
            w.close("snapshotVersions");
        }
        w.close("versioning");
    }
    if !metadata.plugins.is_empty() {
        w.open("plugins");
        for plugin in &metadata.plugins {
            w.open("plugin");
            w.optional("name", plugin.name.as_deref());
            w.text("prefix", &plugin.prefix);
            w.text("artifactId", &plugin.artifact_id);
            w.close("plugin");
        }
        w.close("plugins");
    }
    w.out.push_str("</metadata>\n");
    w.out
}
