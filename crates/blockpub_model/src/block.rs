//! Block and rich text definitions.

use serde::{Deserialize, Serialize};

/// Inline formatting flags for a rich text run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    /// Bold text.
    #[serde(default, skip_serializing_if = "is_false")]
    pub bold: bool,
    /// Italic text.
    #[serde(default, skip_serializing_if = "is_false")]
    pub italic: bool,
    /// Struck-through text.
    #[serde(default, skip_serializing_if = "is_false")]
    pub strikethrough: bool,
    /// Underlined text.
    #[serde(default, skip_serializing_if = "is_false")]
    pub underline: bool,
    /// Inline code.
    #[serde(default, skip_serializing_if = "is_false")]
    pub code: bool,
    /// Text color, service-defined palette name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl Annotations {
    /// Returns true if no formatting is set.
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// One run of inline text with uniform formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    /// The text content.
    pub content: String,
    /// Link target, if the run is a link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Formatting flags.
    #[serde(default, skip_serializing_if = "Annotations::is_default")]
    pub annotations: Annotations,
}

impl RichText {
    /// Creates an unformatted text run.
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            link: None,
            annotations: Annotations::default(),
        }
    }

    /// Creates a text run linking to `url`.
    pub fn link(content: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            link: Some(url.into()),
            annotations: Annotations::default(),
        }
    }
}

/// Concatenates the text content of a list of runs.
pub fn plain_text(runs: &[RichText]) -> String {
    runs.iter().map(|run| run.content.as_str()).collect()
}

/// One table row: one list of rich text runs per column.
///
/// The number of cells must equal the owning table's `width`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Cell contents, one entry per column.
    pub cells: Vec<Vec<RichText>>,
}

impl Row {
    /// Creates a row from cell contents.
    pub fn new(cells: Vec<Vec<RichText>>) -> Self {
        Self { cells }
    }

    /// Creates a row of plain text cells.
    pub fn from_strings(cells: &[&str]) -> Self {
        Self {
            cells: cells
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Vec::new()
                    } else {
                        vec![RichText::plain(*cell)]
                    }
                })
                .collect(),
        }
    }

    /// Creates a row of `width` empty cells.
    pub fn empty(width: usize) -> Self {
        Self {
            cells: vec![Vec::new(); width],
        }
    }

    /// Returns the number of cells.
    pub fn width(&self) -> usize {
        self.cells.len()
    }
}

/// An already-resolved image or file reference.
///
/// Local paths never appear here: asset resolution (upload) replaces them
/// with opaque handles before blocks are constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetSource {
    /// A publicly reachable URL.
    External {
        /// The URL.
        url: String,
    },
    /// An asset already uploaded to the service.
    Upload {
        /// Opaque upload handle returned by the host's asset resolver.
        handle: String,
    },
}

/// A table: shell dimensions plus row data.
///
/// Remote services treat rows as children of the table block, so a table is
/// created in two phases: the shell with its header row first, remaining
/// rows appended afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableBlock {
    /// Number of columns.
    pub width: usize,
    /// Whether the first row is a header.
    pub has_header: bool,
    /// Row data, header first when `has_header` is set.
    pub rows: Vec<Row>,
}

impl TableBlock {
    /// Returns the first row, if any.
    pub fn header_row(&self) -> Option<&Row> {
        self.rows.first()
    }
}

/// One structural unit of document content.
///
/// Produced by an external converter; the order of blocks in a list is
/// semantically meaningful and preserved through publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    /// A paragraph of rich text.
    Paragraph {
        /// Inline content.
        rich_text: Vec<RichText>,
    },
    /// A heading, levels 1 through 3.
    Heading {
        /// Heading level, 1 through 3.
        level: u8,
        /// Inline content.
        rich_text: Vec<RichText>,
    },
    /// A bulleted list item.
    BulletedListItem {
        /// Inline content.
        rich_text: Vec<RichText>,
    },
    /// A numbered list item.
    NumberedListItem {
        /// Inline content.
        rich_text: Vec<RichText>,
    },
    /// A to-do item.
    ToDo {
        /// Inline content.
        rich_text: Vec<RichText>,
        /// Whether the item is checked.
        checked: bool,
    },
    /// A code block.
    Code {
        /// The code, as a single plain run in practice.
        rich_text: Vec<RichText>,
        /// Language hint.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        language: Option<String>,
        /// Caption below the block.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        caption: Vec<RichText>,
    },
    /// A block quote.
    Quote {
        /// Inline content.
        rich_text: Vec<RichText>,
    },
    /// A callout box.
    Callout {
        /// Inline content.
        rich_text: Vec<RichText>,
        /// Icon, service-defined (emoji or token).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        icon: Option<String>,
    },
    /// An image.
    Image {
        /// Resolved image source.
        source: AssetSource,
        /// Caption below the image.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        caption: Vec<RichText>,
    },
    /// An attached file.
    File {
        /// Resolved file source.
        source: AssetSource,
        /// Caption below the file.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        caption: Vec<RichText>,
    },
    /// A horizontal divider.
    Divider,
    /// A table.
    Table(TableBlock),
}

impl Block {
    /// Creates a paragraph from plain text.
    pub fn paragraph(text: impl Into<String>) -> Self {
        Block::Paragraph {
            rich_text: vec![RichText::plain(text)],
        }
    }

    /// Creates a heading from plain text. `level` is clamped to 1..=3.
    pub fn heading(level: u8, text: impl Into<String>) -> Self {
        Block::Heading {
            level: level.clamp(1, 3),
            rich_text: vec![RichText::plain(text)],
        }
    }

    /// Creates a bulleted list item from plain text.
    pub fn bulleted(text: impl Into<String>) -> Self {
        Block::BulletedListItem {
            rich_text: vec![RichText::plain(text)],
        }
    }

    /// Creates a numbered list item from plain text.
    pub fn numbered(text: impl Into<String>) -> Self {
        Block::NumberedListItem {
            rich_text: vec![RichText::plain(text)],
        }
    }

    /// Creates a to-do item from plain text.
    pub fn to_do(text: impl Into<String>, checked: bool) -> Self {
        Block::ToDo {
            rich_text: vec![RichText::plain(text)],
            checked,
        }
    }

    /// Creates a code block.
    pub fn code(code: impl Into<String>, language: Option<String>) -> Self {
        Block::Code {
            rich_text: vec![RichText::plain(code)],
            language,
            caption: Vec::new(),
        }
    }

    /// Creates a quote from plain text.
    pub fn quote(text: impl Into<String>) -> Self {
        Block::Quote {
            rich_text: vec![RichText::plain(text)],
        }
    }

    /// Creates a table.
    pub fn table(width: usize, has_header: bool, rows: Vec<Row>) -> Self {
        Block::Table(TableBlock {
            width,
            has_header,
            rows,
        })
    }

    /// Returns true if this is a table block.
    pub fn is_table(&self) -> bool {
        matches!(self, Block::Table(_))
    }

    /// Returns the table data if this is a table block.
    pub fn as_table(&self) -> Option<&TableBlock> {
        match self {
            Block::Table(table) => Some(table),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_level_clamped() {
        assert!(matches!(
            Block::heading(0, "t"),
            Block::Heading { level: 1, .. }
        ));
        assert!(matches!(
            Block::heading(2, "t"),
            Block::Heading { level: 2, .. }
        ));
        assert!(matches!(
            Block::heading(9, "t"),
            Block::Heading { level: 3, .. }
        ));
    }

    #[test]
    fn plain_text_concatenates_runs() {
        let runs = vec![RichText::plain("a"), RichText::link("b", "https://x")];
        assert_eq!(plain_text(&runs), "ab");
        assert_eq!(plain_text(&[]), "");
    }

    #[test]
    fn row_helpers() {
        let row = Row::from_strings(&["a", "", "c"]);
        assert_eq!(row.width(), 3);
        assert!(row.cells[1].is_empty());

        let empty = Row::empty(2);
        assert_eq!(empty.width(), 2);
        assert!(empty.cells.iter().all(|c| c.is_empty()));
    }

    #[test]
    fn paragraph_wire_shape() {
        let block = Block::paragraph("hello");
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "paragraph",
                "rich_text": [{"content": "hello"}],
            })
        );
    }

    #[test]
    fn divider_wire_shape() {
        let json = serde_json::to_value(Block::Divider).unwrap();
        assert_eq!(json, serde_json::json!({"type": "divider"}));
    }

    #[test]
    fn table_wire_shape() {
        let block = Block::table(2, true, vec![Row::from_strings(&["A", "B"])]);
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "table");
        assert_eq!(json["width"], 2);
        assert_eq!(json["has_header"], true);
        assert_eq!(json["rows"][0]["cells"][0][0]["content"], "A");
    }

    #[test]
    fn annotations_skipped_when_default() {
        let run = RichText::plain("x");
        let json = serde_json::to_value(&run).unwrap();
        assert!(json.get("annotations").is_none());
        assert!(json.get("link").is_none());

        let mut bold = RichText::plain("x");
        bold.annotations.bold = true;
        let json = serde_json::to_value(&bold).unwrap();
        assert_eq!(json["annotations"]["bold"], true);
    }

    #[test]
    fn block_roundtrip() {
        let blocks = vec![
            Block::paragraph("p"),
            Block::heading(2, "h"),
            Block::to_do("task", true),
            Block::code("fn main() {}", Some("rust".into())),
            Block::Image {
                source: AssetSource::Upload {
                    handle: "up-1".into(),
                },
                caption: vec![RichText::plain("cap")],
            },
            Block::Divider,
            Block::table(1, false, vec![Row::from_strings(&["x"])]),
        ];
        let json = serde_json::to_string(&blocks).unwrap();
        let decoded: Vec<Block> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, blocks);
    }
}
