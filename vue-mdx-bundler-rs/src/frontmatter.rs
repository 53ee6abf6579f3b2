//! Extraction of the YAML header block at the top of a document.
//!
//! A document may open with a block fenced by `---` lines:
//!
//! ```text
//! ---
//! title: Hello
//! tags: [intro]
//! ---
//! # Hello
//! ```
//!
//! The block is parsed independently of the bundling pipeline and threaded
//! through unchanged to the final [`ComponentBundle`](crate::ComponentBundle).

use anyhow::{anyhow, Result};

use crate::text::strip_bom;

/// Structured metadata parsed from a document header.
pub type Frontmatter = serde_json::Map<String, serde_json::Value>;

const DELIMITER: &str = "---";

/// The raw pieces of a document with a header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontmatterBlock<'a> {
    /// YAML between the fences, without the fence lines.
    pub matter: &'a str,
    /// Everything after the closing fence.
    pub body: &'a str,
    /// Number of lines the block occupies, fences included.
    pub line_count: usize,
}

/// Metadata plus the document body it was taken from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontmatterExtraction {
    pub data: Frontmatter,
    pub content: String,
}

/// Locates the header block. Returns `None` when the document does not open
/// with a `---` fence.
///
/// An opening fence without a closing one makes the rest of the document the
/// header, leaving an empty body.
pub fn split_frontmatter(source: &str) -> Option<FrontmatterBlock<'_>> {
    let source = strip_bom(source);
    let (first_line, rest) = split_line(source);
    if first_line.trim_end() != DELIMITER {
        return None;
    }

    let mut offset = 0;
    let mut line_count = 1;
    let mut remaining = rest;
    while !remaining.is_empty() {
        let (line, tail) = split_line(remaining);
        line_count += 1;
        if line.trim_end() == DELIMITER {
            return Some(FrontmatterBlock {
                matter: &rest[..offset],
                body: tail,
                line_count,
            });
        }
        offset += remaining.len() - tail.len();
        remaining = tail;
    }

    Some(FrontmatterBlock {
        matter: rest,
        body: "",
        line_count,
    })
}

/// Parses the header block of `source`. Documents without one yield an empty
/// mapping and their full text as content.
///
/// Callers attach the document path; a bad header fails the document's
/// compilation.
pub fn extract_frontmatter(source: &str) -> Result<FrontmatterExtraction> {
    let Some(block) = split_frontmatter(source) else {
        return Ok(FrontmatterExtraction {
            data: Frontmatter::new(),
            content: strip_bom(source).to_string(),
        });
    };

    Ok(FrontmatterExtraction {
        data: parse_matter(block.matter)?,
        content: block.body.to_string(),
    })
}

fn parse_matter(matter: &str) -> Result<Frontmatter> {
    if matter.trim().is_empty() {
        return Ok(Frontmatter::new());
    }
    let value: serde_json::Value = serde_yaml::from_str(matter)
        .map_err(|e| anyhow!("Invalid frontmatter: {e}"))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(Frontmatter::new()),
        other => Err(anyhow!(
            "Invalid frontmatter: expected a mapping at the top of the header block, found `{other}`"
        )),
    }
}

/// Splits off the first line, dropping its `\n` or `\r\n` terminator.
fn split_line(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(idx) => {
            let line = &text[..idx];
            (line.strip_suffix('\r').unwrap_or(line), &text[idx + 1..])
        }
        None => (text, ""),
    }
}
