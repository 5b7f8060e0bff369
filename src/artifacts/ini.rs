//! Order-preserving key/value document for the tool's `.config` files.
//!
//! Key case is preserved. `key = value` and `key: value` lines are accepted;
//! comments and blank lines are dropped on load. Rendering writes every
//! section as `[NAME]` followed by `key = value` lines and a blank line.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{EsysError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    sections: Vec<Section>,
}

impl IniDocument {
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::default();
        let mut current: Option<usize> = None;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = Some(doc.section_index(name.trim()));
                continue;
            }

            let split = line.find(['=', ':']).map(|pos| line.split_at(pos));
            let Some((key, rest)) = split else {
                // Continuation of the previous value
                if let Some(entry) = current.and_then(|i| doc.sections[i].entries.last_mut()) {
                    entry.1.push('\n');
                    entry.1.push_str(line);
                }
                continue;
            };

            let index = match current {
                Some(index) => index,
                None => {
                    let index = doc.section_index("DEFAULT");
                    current = Some(index);
                    index
                }
            };
            doc.sections[index].set(key.trim(), rest[1..].trim());
        }
        doc
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| EsysError::io(path, e))?;
        Ok(Self::parse(&text))
    }

    fn section_index(&mut self, name: &str) -> usize {
        if let Some(index) = self.sections.iter().position(|s| s.name == name) {
            return index;
        }
        self.sections.push(Section {
            name: name.to_string(),
            entries: Vec::new(),
        });
        self.sections.len() - 1
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|s| s.name == section)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a value, creating the section or key if absent
    pub fn set(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let index = self.section_index(section);
        self.sections[index].set(key, value);
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let _ = writeln!(out, "[{}]", section.name);
            for (key, value) in &section.entries {
                let value = value.replace('\n', "\n\t");
                let _ = writeln!(out, "{key} = {value}");
            }
            out.push('\n');
        }
        out
    }

    /// Write the whole document to `path`, truncating previous content
    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.render()).map_err(|e| EsysError::io(path, e))
    }
}

impl Section {
    fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }
}
