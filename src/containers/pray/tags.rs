use indexmap::IndexMap;

use crate::binary_utils::{decode_text, encode_text, write_lpstring, write_u32, ByteCursor};
use crate::error::C2eResult;

/// The name→value payload of tag-dictionary blocks (agent, exported
/// creature, egg and starter-family metadata all share it).
///
/// Integer and string tags live in separate maps. Each map keeps insertion
/// order, and on disk every integer tag precedes every string tag. By
/// convention an integer tag shadows a string tag of the same name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagDict {
    ints: IndexMap<String, u32>,
    strings: IndexMap<String, String>,
}

/// A tag value, from either sub-map.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Int(u32),
    Str(String),
}

impl TagDict {
    pub fn new() -> Self {
        TagDict::default()
    }

    pub fn decode(data: &[u8]) -> C2eResult<Self> {
        let mut cursor = ByteCursor::new(data);
        let mut tags = TagDict::new();

        let int_count = cursor.read_u32()?;
        for _ in 0..int_count {
            let name_length = cursor.read_u32()? as usize;
            let name = decode_text(cursor.read(name_length)?);
            let value = cursor.read_u32()?;
            tags.ints.insert(name, value);
        }

        let string_count = cursor.read_u32()?;
        for _ in 0..string_count {
            let name_length = cursor.read_u32()? as usize;
            let name = decode_text(cursor.read(name_length)?);
            let value_length = cursor.read_u32()? as usize;
            let value = decode_text(cursor.read(value_length)?);
            tags.strings.insert(name, value);
        }
        Ok(tags)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_u32(&mut out, self.ints.len() as u32);
        for (name, value) in &self.ints {
            write_lpstring(&mut out, name);
            write_u32(&mut out, *value);
        }
        write_u32(&mut out, self.strings.len() as u32);
        for (name, value) in &self.strings {
            write_lpstring(&mut out, name);
            let bytes = encode_text(value);
            write_u32(&mut out, bytes.len() as u32);
            out.extend_from_slice(&bytes);
        }
        out
    }

    pub fn int(&self, name: &str) -> Option<u32> {
        self.ints.get(name).copied()
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.strings.get(name).map(String::as_str)
    }

    /// Either-map lookup; the integer map takes precedence.
    pub fn get(&self, name: &str) -> Option<TagValue> {
        if let Some(value) = self.int(name) {
            return Some(TagValue::Int(value));
        }
        self.string(name).map(|s| TagValue::Str(s.to_owned()))
    }

    pub fn set_int(&mut self, name: impl Into<String>, value: u32) {
        self.ints.insert(name.into(), value);
    }

    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.strings.insert(name.into(), value.into());
    }

    pub fn ints(&self) -> impl Iterator<Item = (&str, u32)> {
        self.ints.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn strings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.strings.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.ints.is_empty() && self.strings.is_empty()
    }

    // ---- agent metadata accessors ----

    /// Agent description, preferring the localised variant ("Agent
    /// Description-de" etc.) and falling back to the plain tag.
    pub fn agent_description(&self, localisation: Option<&str>) -> Option<&str> {
        if let Some(lang) = localisation {
            if let Some(text) = self.string(&format!("Agent Description-{lang}")) {
                return Some(text);
            }
        }
        self.string("Agent Description")
    }

    pub fn script_count(&self) -> u32 {
        self.int("Script Count").unwrap_or(0)
    }

    /// Numbered agent script; the first script is script 1.
    pub fn script(&self, index: u32) -> Option<&str> {
        if index == 0 || index > self.script_count() {
            return None;
        }
        self.string(&format!("Script {index}"))
    }

    pub fn scripts(&self) -> Vec<&str> {
        (1..=self.script_count())
            .filter_map(|i| self.string(&format!("Script {i}")))
            .collect()
    }

    pub fn remove_script(&self) -> Option<&str> {
        self.string("Remove script")
    }

    pub fn dependency_count(&self) -> u32 {
        self.int("Dependency Count").unwrap_or(0)
    }

    /// Numbered dependency; 1-based like the tags themselves.
    pub fn dependency(&self, index: u32) -> Option<PrayDependency> {
        let file = self.string(&format!("Dependency {index}"))?;
        Some(PrayDependency {
            category: self
                .int(&format!("Dependency Category {index}"))
                .unwrap_or(0),
            file: file.to_owned(),
        })
    }

    pub fn dependencies(&self) -> Vec<PrayDependency> {
        (1..=self.dependency_count())
            .filter_map(|i| self.dependency(i))
            .collect()
    }

    pub fn animation_file(&self) -> Option<&str> {
        self.string("Agent Animation File")
    }

    pub fn animation_gallery(&self) -> Option<&str> {
        self.string("Agent Animation Gallery")
    }

    pub fn animation_first_image(&self) -> u32 {
        self.int("Animation Sprite First Image").unwrap_or(0)
    }

    pub fn animation_string(&self) -> Option<&str> {
        self.string("Agent Animation String")
    }
}

/// A file the agent depends on, with its install-directory category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrayDependency {
    pub category: u32,
    pub file: String,
}
