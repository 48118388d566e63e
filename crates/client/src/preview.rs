//! Preview sandbox payload
//!
//! The preview provider accepts a flat file map and the path of the main
//! plugin file to activate. The main file is the shallowest `.php` file
//! carrying a WordPress plugin header comment.

use std::collections::BTreeMap;

use pressdock_protocol::FileKind;

use crate::files::FileMap;

/// Payload handed to the external preview sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewPayload {
    pub files: BTreeMap<String, String>,
    pub plugin_entry: Option<String>,
}

/// Build the sandbox payload from the live file map.
pub fn build_payload(files: &FileMap) -> PreviewPayload {
    PreviewPayload {
        files: files.to_content_map(),
        plugin_entry: find_plugin_entry(files),
    }
}

/// Scan `.php` files for a recognizable plugin header comment and pick the
/// most likely main file: the shallowest match, ties broken by path order.
pub fn find_plugin_entry(files: &FileMap) -> Option<String> {
    files
        .entries()
        .filter(|entry| entry.kind == FileKind::File && entry.path.ends_with(".php"))
        .filter(|entry| {
            entry
                .content
                .as_deref()
                .map(has_plugin_header)
                .unwrap_or(false)
        })
        .min_by_key(|entry| (entry.path.matches('/').count(), entry.path.clone()))
        .map(|entry| entry.path.clone())
}

/// WordPress recognizes a plugin by a `Plugin Name:` line in the first
/// comment block of the file. Only the head of the file is scanned.
fn has_plugin_header(content: &str) -> bool {
    content
        .lines()
        .take(40)
        .any(|line| line.trim_start().trim_start_matches(['/', '*', '#', ' ']).starts_with("Plugin Name:"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pressdock_protocol::{FileKind, FileStatus};

    fn files_with(entries: &[(&str, &str)]) -> FileMap {
        let mut files = FileMap::new();
        for (path, content) in entries {
            files.upsert(
                path,
                FileKind::File,
                Some(content.to_string()),
                FileStatus::Created,
                1,
            );
        }
        files
    }

    #[test]
    fn finds_plugin_header_in_comment_block() {
        let files = files_with(&[
            (
                "contact-form/contact-form.php",
                "<?php\n/*\n * Plugin Name: Contact Form\n * Version: 1.0\n */",
            ),
            ("contact-form/inc/helpers.php", "<?php function x() {}"),
        ]);
        assert_eq!(
            find_plugin_entry(&files).as_deref(),
            Some("contact-form/contact-form.php")
        );
    }

    #[test]
    fn prefers_shallowest_match() {
        let files = files_with(&[
            ("a/b/deep.php", "<?php // Plugin Name: Deep"),
            ("main.php", "<?php // Plugin Name: Main"),
        ]);
        assert_eq!(find_plugin_entry(&files).as_deref(), Some("main.php"));
    }

    #[test]
    fn no_header_means_no_entry() {
        let files = files_with(&[("lib.php", "<?php echo 1;"), ("style.css", "body{}")]);
        assert_eq!(find_plugin_entry(&files), None);
    }

    #[test]
    fn payload_carries_content_map_and_entry() {
        let files = files_with(&[(
            "form/form.php",
            "<?php\n// Plugin Name: Form\n",
        )]);
        let payload = build_payload(&files);
        assert_eq!(payload.plugin_entry.as_deref(), Some("form/form.php"));
        assert!(payload.files.contains_key("form/form.php"));
    }
}
