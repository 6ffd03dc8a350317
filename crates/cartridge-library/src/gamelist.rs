//! Gamelist document model
//!
//! A gamelist is a `<gameList>` root holding `<game>` and `<folder>`
//! entries. Each entry carries a relative `<path>` plus one child element
//! per metadata field. Elements this crate does not know are kept as-is so
//! a rewrite does not drop them.

use crate::LibraryError;
use crate::metadata::{MetaKey, Metadata};
use crate::tree::Node;
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

const ROOT_TAG: &str = "gameList";
const PATH_TAG: &str = "path";
const PARENT_HASH_ATTR: &str = "parentHash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Game,
    Folder,
}

impl EntryKind {
    pub fn tag(self) -> &'static str {
        match self {
            EntryKind::Game => "game",
            EntryKind::Folder => "folder",
        }
    }

    pub fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"game" => Some(EntryKind::Game),
            b"folder" => Some(EntryKind::Folder),
            _ => None,
        }
    }
}

/// One `<game>` or `<folder>` element
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentEntry {
    pub kind: EntryKind,
    /// Path as written, usually `./`-relative to the system root
    pub path: String,
    /// Child elements other than `path`, in document order
    pub fields: Vec<(String, String)>,
}

impl DocumentEntry {
    /// Serialize a node's metadata under the given relative path
    pub fn from_node(node: &Node, path: String) -> Self {
        let kind = if node.is_game() {
            EntryKind::Game
        } else {
            EntryKind::Folder
        };
        let metadata = node.metadata();
        let mut fields: Vec<(String, String)> = metadata
            .iter()
            .map(|(key, value)| (key.tag().to_string(), value.to_string()))
            .collect();
        fields.extend(metadata.extras().iter().cloned());
        Self { kind, path, fields }
    }

    pub fn field(&self, tag: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Copy every field onto `metadata`. Unknown tags become extras.
    pub fn apply_to(&self, metadata: &mut Metadata) {
        for (tag, value) in &self.fields {
            match MetaKey::from_tag(tag) {
                Some(key) => {
                    metadata.set(key, value.as_str());
                }
                None => metadata.set_extra(tag.as_str(), value.as_str()),
            }
        }
    }
}

/// A parsed gamelist or recovery fragment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamelistDocument {
    /// Hash of the main document a recovery fragment was written against
    pub parent_hash: Option<String>,
    pub entries: Vec<DocumentEntry>,
}

impl GamelistDocument {
    pub fn parse(text: &str) -> Result<Self, LibraryError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut document = Self::default();
        let mut seen_root = false;
        let mut entry: Option<DocumentEntry> = None;
        let mut field: Option<(String, String)> = None;
        // depth of elements nested inside a field, which are ignored
        let mut skip_depth = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let name = e.name();
                    if skip_depth > 0 || field.is_some() {
                        skip_depth += 1;
                    } else if entry.is_some() {
                        field = Some((String::from_utf8_lossy(name.as_ref()).to_string(), String::new()));
                    } else if let Some(kind) = EntryKind::from_tag(name.as_ref()) {
                        entry = Some(DocumentEntry {
                            kind,
                            path: String::new(),
                            fields: Vec::new(),
                        });
                    } else if name.as_ref() == ROOT_TAG.as_bytes() && !seen_root {
                        seen_root = true;
                        document.parent_hash = parent_hash(&e)?;
                    } else {
                        skip_depth += 1;
                    }
                }
                Event::Empty(e) => {
                    let name = e.name();
                    if skip_depth > 0 || field.is_some() {
                        continue;
                    }
                    if let Some(current) = entry.as_mut() {
                        let tag = String::from_utf8_lossy(name.as_ref()).to_string();
                        push_field(current, tag, String::new());
                    } else if name.as_ref() == ROOT_TAG.as_bytes() && !seen_root {
                        seen_root = true;
                        document.parent_hash = parent_hash(&e)?;
                    }
                }
                Event::Text(t) => {
                    if skip_depth == 0 {
                        if let Some((_, value)) = field.as_mut() {
                            value.push_str(&t.unescape()?);
                        }
                    }
                }
                Event::CData(t) => {
                    if skip_depth == 0 {
                        if let Some((_, value)) = field.as_mut() {
                            value.push_str(&String::from_utf8_lossy(&t.into_inner()));
                        }
                    }
                }
                Event::End(e) => {
                    if skip_depth > 0 {
                        skip_depth -= 1;
                    } else if let Some((tag, value)) = field.take() {
                        if let Some(current) = entry.as_mut() {
                            push_field(current, tag, value);
                        }
                    } else if EntryKind::from_tag(e.name().as_ref()).is_some() {
                        if let Some(done) = entry.take() {
                            if done.path.trim().is_empty() {
                                tracing::debug!("Skipping gamelist entry without a path");
                            } else {
                                document.entries.push(done);
                            }
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(document)
    }

    /// Serialize with a declaration and two-space indentation
    pub fn to_bytes(&self) -> Result<Vec<u8>, LibraryError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new(ROOT_TAG);
        if let Some(hash) = &self.parent_hash {
            root.push_attribute((PARENT_HASH_ATTR, hash.as_str()));
        }
        writer.write_event(Event::Start(root))?;

        for entry in &self.entries {
            let tag = entry.kind.tag();
            writer.write_event(Event::Start(BytesStart::new(tag)))?;
            write_text_element(&mut writer, PATH_TAG, &entry.path)?;
            for (field, value) in &entry.fields {
                write_text_element(&mut writer, field, value)?;
            }
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }

        writer.write_event(Event::End(BytesEnd::new(ROOT_TAG)))?;
        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }
}

fn push_field(entry: &mut DocumentEntry, tag: String, value: String) {
    if tag == PATH_TAG {
        entry.path = value;
    } else {
        entry.fields.push((tag, value));
    }
}

fn parent_hash(start: &BytesStart<'_>) -> Result<Option<String>, LibraryError> {
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == PARENT_HASH_ATTR.as_bytes() {
            return Ok(Some(attr.unescape_value()?.to_string()));
        }
    }
    Ok(None)
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    tag: &str,
    value: &str,
) -> Result<(), LibraryError> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}
