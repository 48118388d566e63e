//! File extraction from assistant prose
//!
//! Assistant messages embed generated files in several historical formats.
//! Formats are attempted in a fixed priority order and the first one that
//! yields a non-empty result wins, so the same files are never extracted
//! twice under two different heuristics. Each format parser contains its
//! own failures and yields an empty result instead of erroring.

use serde_json::Value;
use tracing::debug;

use pressdock_protocol::FileKind;

use crate::files::normalize_path;

/// A file (or folder) pulled out of assistant text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    pub path: String,
    pub content: Option<String>,
    pub kind: FileKind,
}

/// Extraction order: tagged blocks, heading + code block pairs, tree
/// listings, JSON blobs.
pub fn extract_files(text: &str) -> Vec<ExtractedFile> {
    let parsers: [(&str, fn(&str) -> Vec<ExtractedFile>); 4] = [
        ("tagged_blocks", parse_tagged_blocks),
        ("heading_code_pairs", parse_heading_code_pairs),
        ("tree_listing", parse_tree_listing),
        ("json_blob", parse_json_blob),
    ];

    for (name, parser) in parsers {
        let found = parser(text);
        if !found.is_empty() {
            debug!(
                component = "extract",
                event = "extract.format_matched",
                format = name,
                count = found.len(),
                "Extracted files from assistant text"
            );
            return found;
        }
    }
    Vec::new()
}

/// Best-effort language tag for a path, used when attaching code blocks.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let ext = path.rsplit('.').next()?;
    match ext {
        "php" => Some("php"),
        "js" => Some("javascript"),
        "ts" => Some("typescript"),
        "css" => Some("css"),
        "html" | "htm" => Some("html"),
        "json" => Some("json"),
        "md" => Some("markdown"),
        "txt" => Some("text"),
        "sql" => Some("sql"),
        _ => None,
    }
}

fn looks_like_path(token: &str) -> bool {
    let t = token.trim();
    if t.is_empty() || t.len() > 200 {
        return false;
    }
    if t.starts_with("http://") || t.starts_with("https://") {
        return false;
    }
    if !t.contains('/') && !t.contains('.') {
        return false;
    }
    if t.ends_with('.') {
        return false;
    }
    t.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '-' | '_'))
}

/// `<file path="plugin/main.php"> ... </file>` blocks.
fn parse_tagged_blocks(text: &str) -> Vec<ExtractedFile> {
    const OPEN: &str = "<file path=\"";
    const CLOSE: &str = "</file>";

    let mut files = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(OPEN) {
        let after = &rest[start + OPEN.len()..];
        let Some(quote) = after.find('"') else { break };
        let path = &after[..quote];
        let after_path = &after[quote..];
        let Some(tag_end) = after_path.find('>') else { break };
        let body_and_rest = &after_path[tag_end + 1..];
        let Some(close) = body_and_rest.find(CLOSE) else { break };

        let body = strip_outer_fence(body_and_rest[..close].trim_matches('\n'));
        if looks_like_path(path) {
            files.push(ExtractedFile {
                path: normalize_path(path),
                content: Some(body),
                kind: FileKind::File,
            });
        }
        rest = &body_and_rest[close + CLOSE.len()..];
    }
    files
}

/// A heading (or emphasized/`File:`-style line) naming a path, followed by a
/// fenced code block with the file's content.
fn parse_heading_code_pairs(text: &str) -> Vec<ExtractedFile> {
    let lines: Vec<&str> = text.lines().collect();
    let mut files = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let Some(path) = heading_path(lines[i]) else {
            i += 1;
            continue;
        };

        let mut j = i + 1;
        while j < lines.len() && lines[j].trim().is_empty() {
            j += 1;
        }
        if j >= lines.len() || !lines[j].trim_start().starts_with("```") {
            i += 1;
            continue;
        }

        let mut body = String::new();
        let mut k = j + 1;
        while k < lines.len() && !lines[k].trim_start().starts_with("```") {
            body.push_str(lines[k]);
            body.push('\n');
            k += 1;
        }
        if body.ends_with('\n') {
            body.pop();
        }
        if !body.trim().is_empty() {
            files.push(ExtractedFile {
                path,
                content: Some(body),
                kind: FileKind::File,
            });
        }
        i = k + 1;
    }
    files
}

fn heading_path(line: &str) -> Option<String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() > 120 {
        return None;
    }
    let shaped = trimmed.starts_with('#')
        || trimmed.starts_with("**")
        || trimmed.ends_with(':')
        || trimmed.starts_with("File")
        || trimmed.starts_with('`');
    if !shaped {
        return None;
    }

    let token = trimmed
        .split_whitespace()
        .last()?
        .trim_matches(|c| matches!(c, '#' | '*' | '`' | ':' | '(' | ')'));
    if looks_like_path(token) {
        Some(normalize_path(token))
    } else {
        None
    }
}

/// `├──`/`└──` tree listings. Yields paths only — content arrives later via
/// file events or explicit fetches.
fn parse_tree_listing(text: &str) -> Vec<ExtractedFile> {
    let lines: Vec<&str> = text.lines().collect();
    let mut files = Vec::new();
    let mut root: Option<String> = None;
    let mut dirs: Vec<String> = Vec::new();
    let mut matched = false;

    for (i, line) in lines.iter().enumerate() {
        let raw = line.trim_end();
        let Some(marker_pos) = raw.find("├── ").or_else(|| raw.find("└── ")) else {
            continue;
        };

        if !matched {
            matched = true;
            // the line above the first branch names the root folder
            root = lines[..i]
                .iter()
                .rev()
                .map(|l| l.trim())
                .find(|l| !l.is_empty())
                .and_then(|prev| {
                    let name = prev.trim_end_matches('/');
                    if prev.ends_with('/') && looks_like_tree_name(name) {
                        Some(name.to_string())
                    } else {
                        None
                    }
                });
            if let Some(ref r) = root {
                files.push(ExtractedFile {
                    path: r.clone(),
                    content: None,
                    kind: FileKind::Folder,
                });
            }
        }

        let depth = raw[..marker_pos].chars().count() / 4;
        let name = raw[marker_pos..]
            .trim_start_matches("├── ")
            .trim_start_matches("└── ")
            .trim();
        if !looks_like_tree_name(name.trim_end_matches('/')) {
            continue;
        }

        dirs.truncate(depth);
        let is_folder = name.ends_with('/') || !name.contains('.');
        let clean = name.trim_end_matches('/');

        let mut segments: Vec<&str> = Vec::new();
        if let Some(ref r) = root {
            segments.push(r);
        }
        segments.extend(dirs.iter().map(String::as_str));
        segments.push(clean);
        let path = segments.join("/");

        if is_folder {
            files.push(ExtractedFile {
                path,
                content: None,
                kind: FileKind::Folder,
            });
            dirs.push(clean.to_string());
        } else {
            files.push(ExtractedFile {
                path,
                content: None,
                kind: FileKind::File,
            });
        }
    }
    files
}

fn looks_like_tree_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 100
        && !name.contains(char::is_whitespace)
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

/// ```json blocks (or a bare object) shaped `{"files":[{"path","content"}]}`.
fn parse_json_blob(text: &str) -> Vec<ExtractedFile> {
    let mut candidates: Vec<String> = fenced_blocks(text)
        .into_iter()
        .filter(|(lang, _)| lang.as_deref().map(|l| l == "json").unwrap_or(true))
        .map(|(_, body)| body)
        .collect();
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        candidates.push(trimmed.to_string());
    }

    for candidate in candidates {
        let Ok(value) = serde_json::from_str::<Value>(&candidate) else {
            continue;
        };
        let Some(items) = value.get("files").and_then(Value::as_array) else {
            continue;
        };

        let mut files = Vec::new();
        for item in items {
            let Some(path) = item.get("path").and_then(Value::as_str) else {
                continue;
            };
            if !looks_like_path(path) {
                continue;
            }
            let kind = match item.get("type").and_then(Value::as_str) {
                Some("folder") | Some("dir") | Some("directory") => FileKind::Folder,
                _ => FileKind::File,
            };
            files.push(ExtractedFile {
                path: normalize_path(path),
                content: item.get("content").and_then(Value::as_str).map(str::to_string),
                kind,
            });
        }
        if !files.is_empty() {
            return files;
        }
    }
    Vec::new()
}

fn fenced_blocks(text: &str) -> Vec<(Option<String>, String)> {
    let mut blocks = Vec::new();
    let mut lines = text.lines();
    while let Some(line) = lines.next() {
        let trimmed = line.trim_start();
        let Some(info) = trimmed.strip_prefix("```") else {
            continue;
        };
        let language = {
            let l = info.trim();
            if l.is_empty() {
                None
            } else {
                Some(l.to_string())
            }
        };
        let mut body = String::new();
        for inner in lines.by_ref() {
            if inner.trim_start().starts_with("```") {
                break;
            }
            body.push_str(inner);
            body.push('\n');
        }
        blocks.push((language, body));
    }
    blocks
}

/// Drop a surrounding code fence if the body carries one.
fn strip_outer_fence(body: &str) -> String {
    let trimmed = body.trim_matches('\n');
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().map(|l| l.trim_start().starts_with("```")).unwrap_or(false) {
        lines.pop();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_blocks_extract_path_and_content() {
        let text = r#"Here you go.

<file path="plugin/contact-form.php">
<?php
// Plugin Name: Contact Form
</file>

<file path="plugin/css/style.css">
.form { color: red; }
</file>"#;

        let files = extract_files(text);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "plugin/contact-form.php");
        assert_eq!(
            files[0].content.as_deref(),
            Some("<?php\n// Plugin Name: Contact Form")
        );
        assert_eq!(files[1].path, "plugin/css/style.css");
    }

    #[test]
    fn tagged_block_strips_inner_fence() {
        let text = "<file path=\"a.php\">\n```php\n<?php echo 1;\n```\n</file>";
        let files = extract_files(text);
        assert_eq!(files[0].content.as_deref(), Some("<?php echo 1;"));
    }

    #[test]
    fn heading_code_pairs_extract() {
        let text = "### plugin/main.php\n\n```php\n<?php\n```\n\n**plugin/js/form.js**\n```js\nconsole.log(1);\n```";
        let files = extract_files(text);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "plugin/main.php");
        assert_eq!(files[0].content.as_deref(), Some("<?php"));
        assert_eq!(files[1].path, "plugin/js/form.js");
    }

    #[test]
    fn heading_without_code_block_yields_nothing() {
        let text = "### plugin/main.php\n\nJust prose, no code.";
        assert!(parse_heading_code_pairs(text).is_empty());
    }

    #[test]
    fn plain_prose_paths_are_not_headings() {
        let text = "I edited plugin/main.php to fix the bug.";
        assert!(parse_heading_code_pairs(text).is_empty());
    }

    #[test]
    fn tree_listing_reconstructs_paths() {
        let text = "Structure:\n\ncontact-form/\n├── contact-form.php\n├── css/\n│   └── style.css\n└── readme.txt\n";
        let files = parse_tree_listing(text);
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "contact-form",
                "contact-form/contact-form.php",
                "contact-form/css",
                "contact-form/css/style.css",
                "contact-form/readme.txt",
            ]
        );
        assert_eq!(files[2].kind, FileKind::Folder);
        assert_eq!(files[3].kind, FileKind::File);
    }

    #[test]
    fn json_blob_extracts_files_array() {
        let text = "```json\n{\"files\":[{\"path\":\"plugin/main.php\",\"content\":\"<?php\"},{\"path\":\"plugin/inc\",\"type\":\"folder\"}]}\n```";
        let files = extract_files(text);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].content.as_deref(), Some("<?php"));
        assert_eq!(files[1].kind, FileKind::Folder);
    }

    #[test]
    fn malformed_json_yields_empty() {
        let text = "```json\n{\"files\": [oops\n```";
        assert!(parse_json_blob(text).is_empty());
    }

    #[test]
    fn priority_stops_at_first_matching_format() {
        // Tagged block and JSON blob both present; only the tagged result
        // must come back.
        let text = "<file path=\"a.php\">x</file>\n```json\n{\"files\":[{\"path\":\"b.php\"}]}\n```";
        let files = extract_files(text);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "a.php");
    }

    #[test]
    fn no_format_matches_yields_empty() {
        assert!(extract_files("Sounds good, working on it now.").is_empty());
    }

    #[test]
    fn language_for_path_maps_common_extensions() {
        assert_eq!(language_for_path("plugin/main.php"), Some("php"));
        assert_eq!(language_for_path("a/b.css"), Some("css"));
        assert_eq!(language_for_path("noext"), None);
    }
}
