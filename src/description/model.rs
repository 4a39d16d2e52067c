//! Structured form of a PR description
//!
//! A description is a sequence of free text and marked blocks:
//!
//! ```text
//! [marker]: <> (Begin:<key>)
//! ...block body...
//! [marker]: <> (End:<key>)
//! ```
//!
//! Parsing never loses text: rendering a parsed description gives back the
//! original string.

/// Start marker line of the block `key`
pub fn begin_marker(key: &str) -> String {
    format!("[marker]: <> (Begin:{key})")
}

/// End marker line of the block `key`
pub fn end_marker(key: &str) -> String {
    format!("[marker]: <> (End:{key})")
}

fn marker_key<'a>(line: &'a str, kind: &str) -> Option<&'a str> {
    line.trim_end()
        .strip_prefix("[marker]: <> (")?
        .strip_prefix(kind)?
        .strip_prefix(':')?
        .strip_suffix(')')
}

/// Footnote index of a `[n]: target` definition line
pub fn footnote_index(line: &str) -> Option<usize> {
    let rest = line.strip_prefix('[')?;
    let close = rest.find(']')?;
    let digits = &rest[..close];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let target = rest[close + 1..].strip_prefix(':')?;
    if target.trim_end_matches(['\r', '\n']).is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// One piece of a description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Text outside any block, kept verbatim
    Text(String),
    /// A marked block; `body` excludes the marker lines
    Block {
        /// Block key (subscription id or a fixed name)
        key: String,
        /// Lines between the markers, each ending in `\n`
        body: String,
    },
}

/// A parsed PR description
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    segments: Vec<Segment>,
}

impl Description {
    /// Parse a description
    ///
    /// A begin marker without a matching end marker is kept as plain text.
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.split_inclusive('\n').collect();
        let mut segments = Vec::new();
        let mut text_buf = String::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let block = marker_key(line, "Begin").and_then(|key| {
                lines[i + 1..]
                    .iter()
                    .position(|l| marker_key(l, "End") == Some(key))
                    .map(|offset| (key, i + 1 + offset))
            });

            match block {
                Some((key, end)) => {
                    if !text_buf.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text_buf)));
                    }
                    let mut body: String = lines[i + 1..end].concat();
                    if !body.is_empty() && !body.ends_with('\n') {
                        body.push('\n');
                    }
                    segments.push(Segment::Block {
                        key: key.to_string(),
                        body,
                    });
                    // The end marker's own line break belongs to the block.
                    i = end + 1;
                }
                None => {
                    text_buf.push_str(line);
                    i += 1;
                }
            }
        }

        if !text_buf.is_empty() {
            segments.push(Segment::Text(text_buf));
        }

        Self { segments }
    }

    /// Description consisting of `text` only
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::Text(text.into())],
        }
    }

    /// All segments in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Body of the block `key`
    pub fn block(&self, key: &str) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            Segment::Block { key: k, body } if k == key => Some(body.as_str()),
            _ => None,
        })
    }

    /// Keys of all blocks in order
    pub fn block_keys(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Block { key, .. } => Some(key.as_str()),
                Segment::Text(_) => None,
            })
            .collect()
    }

    /// Put `body` into the block `key`
    ///
    /// An existing block (with its footnotes) is replaced where it stands;
    /// otherwise the block is appended, separated from previous content by a
    /// blank line.
    pub fn upsert_block(&mut self, key: &str, body: String) {
        if let Some(existing) = self.segments.iter_mut().find_map(|s| match s {
            Segment::Block { key: k, body } if k == key => Some(body),
            _ => None,
        }) {
            *existing = body;
            return;
        }

        let needs_separator = match self.segments.last() {
            Some(Segment::Block { .. }) => true,
            Some(Segment::Text(t)) => !t.is_empty() && !t.ends_with("\n\n"),
            None => false,
        };
        if needs_separator {
            let separator = match self.segments.last() {
                Some(Segment::Text(t)) if !t.ends_with('\n') => "\n\n",
                _ => "\n",
            };
            self.segments.push(Segment::Text(separator.to_string()));
        }

        self.segments.push(Segment::Block {
            key: key.to_string(),
            body,
        });
    }

    /// Remove the block `key`, returning whether it existed
    pub fn remove_block(&mut self, key: &str) -> bool {
        let Some(index) = self
            .segments
            .iter()
            .position(|s| matches!(s, Segment::Block { key: k, .. } if k == key))
        else {
            return false;
        };
        self.segments.remove(index);

        // Drop the blank separator left behind.
        if index < self.segments.len()
            && index > 0
            && matches!(&self.segments[index], Segment::Text(t) if t == "\n")
        {
            self.segments.remove(index);
        }
        true
    }

    /// Largest footnote index defined anywhere in the description
    pub fn max_footnote(&self) -> Option<usize> {
        self.segments
            .iter()
            .flat_map(|s| match s {
                Segment::Text(t) => t.lines(),
                Segment::Block { body, .. } => body.lines(),
            })
            .filter_map(footnote_index)
            .max()
    }

    /// Render back to text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Block { key, body } => {
                    out.push_str(&begin_marker(key));
                    out.push('\n');
                    out.push_str(body);
                    out.push_str(&end_marker(key));
                    out.push('\n');
                }
            }
        }
        out
    }
}

impl std::fmt::Display for Description {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Header\n\n[marker]: <> (Begin:abc)\n## From x\n[1]: https://x\n[marker]: <> (End:abc)\n\ntrailer\n";

    #[test]
    fn test_parse_render_is_lossless() {
        let desc = Description::parse(SAMPLE);
        assert_eq!(desc.render(), SAMPLE);
        assert_eq!(desc.block_keys(), vec!["abc"]);
        assert_eq!(desc.block("abc"), Some("## From x\n[1]: https://x\n"));
    }

    #[test]
    fn test_unterminated_block_is_text() {
        let text = "[marker]: <> (Begin:abc)\nbody\n";
        let desc = Description::parse(text);
        assert!(desc.block_keys().is_empty());
        assert_eq!(desc.render(), text);
    }

    #[test]
    fn test_footnote_index() {
        assert_eq!(footnote_index("[12]: https://x"), Some(12));
        assert_eq!(footnote_index("[3]:x"), Some(3));
        assert_eq!(footnote_index("[3]:"), None);
        assert_eq!(footnote_index("  [3]: x"), None);
        assert_eq!(footnote_index("[a]: x"), None);
        assert_eq!(footnote_index("- **Foo**: [from 1 to 2][3]"), None);
    }

    #[test]
    fn test_max_footnote_scans_text_and_blocks() {
        let desc = Description::parse(&format!("{SAMPLE}[7]: https://y\n"));
        assert_eq!(desc.max_footnote(), Some(7));
        assert_eq!(Description::parse("no footnotes").max_footnote(), None);
    }

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut desc = Description::parse(SAMPLE);
        desc.upsert_block("abc", "new\n".to_string());
        assert_eq!(
            desc.render(),
            "Header\n\n[marker]: <> (Begin:abc)\nnew\n[marker]: <> (End:abc)\n\ntrailer\n"
        );
    }

    #[test]
    fn test_upsert_appends_with_separator() {
        let mut desc = Description::from_text("Header\n\n");
        desc.upsert_block("a", "one\n".to_string());
        desc.upsert_block("b", "two\n".to_string());
        assert_eq!(
            desc.render(),
            "Header\n\n[marker]: <> (Begin:a)\none\n[marker]: <> (End:a)\n\n[marker]: <> (Begin:b)\ntwo\n[marker]: <> (End:b)\n"
        );
    }

    #[test]
    fn test_remove_block() {
        let mut desc = Description::from_text("Header\n\n");
        desc.upsert_block("a", "one\n".to_string());
        desc.upsert_block("b", "two\n".to_string());
        assert!(desc.remove_block("a"));
        assert!(!desc.remove_block("a"));
        assert_eq!(
            desc.render(),
            "Header\n\n[marker]: <> (Begin:b)\ntwo\n[marker]: <> (End:b)\n"
        );
    }
}
