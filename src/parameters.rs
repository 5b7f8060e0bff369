//! Parameter records inside `.fwl` data sets.
//!
//! A record is one line `<name>:<rawData>[<value>]`. Lookups go through a
//! lazily built index of name → (file, line) covering every `.fwl` file in
//! listing order, first occurrence winning. Regenerating the data sets must
//! call [`ParameterStore::invalidate`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::error::{EsysError, Result};
use crate::files::{list_files, FWL_SUFFIX};

static RECORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>[^:]+):(?P<raw>[^\[]*)\[(?P<value>.*)\]$")
        .expect("parameter record pattern is valid")
});

/// One parsed parameter line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterRecord {
    pub name: String,
    pub raw_data: String,
    pub value: String,
}

impl ParameterRecord {
    /// Parse a record line; surrounding whitespace is ignored
    pub fn parse(line: &str) -> Option<Self> {
        let caps = RECORD.captures(line.trim())?;
        Some(Self {
            name: caps["name"].trim().to_string(),
            raw_data: caps["raw"].to_string(),
            value: caps["value"].to_string(),
        })
    }

    pub fn render(&self) -> String {
        format!("{}:{}[{}]", self.name, self.raw_data, self.value)
    }
}

/// Name prefix of a line: the trimmed text before the first colon
fn name_prefix(line: &str) -> Option<&str> {
    let (name, _) = line.trim().split_once(':')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    file: PathBuf,
    line: usize,
}

/// Reads and rewrites parameters in the working data-set directory
#[derive(Debug)]
pub struct ParameterStore {
    dir: PathBuf,
    index: Option<HashMap<String, Location>>,
}

impl ParameterStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            index: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Drop the index; the next lookup rescans the data sets
    pub fn invalidate(&mut self) {
        if self.index.take().is_some() {
            debug!(dir = %self.dir.display(), "Parameter index invalidated");
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.index.is_some()
    }

    fn build_index(&self) -> Result<HashMap<String, Location>> {
        let files = list_files(&self.dir, FWL_SUFFIX)?;
        if files.is_empty() {
            return Err(EsysError::NoDataSets(self.dir.clone()));
        }

        let mut index = HashMap::new();
        for file in files {
            let text = std::fs::read_to_string(&file).map_err(|e| EsysError::io(&file, e))?;
            for (line, content) in text.lines().enumerate() {
                if let Some(name) = name_prefix(content) {
                    index.entry(name.to_string()).or_insert_with(|| Location {
                        file: file.clone(),
                        line,
                    });
                }
            }
        }
        debug!(dir = %self.dir.display(), parameters = index.len(), "Parameter index built");
        Ok(index)
    }

    fn locate(&mut self, name: &str) -> Result<Location> {
        if self.index.is_none() {
            self.index = Some(self.build_index()?);
        }
        self.index
            .as_ref()
            .and_then(|index| index.get(name))
            .cloned()
            .ok_or_else(|| EsysError::ParameterNotFound(name.to_string()))
    }

    /// Read the indexed line, rescanning once if the file moved under us
    fn read_record(&mut self, name: &str) -> Result<(Location, String, ParameterRecord)> {
        for attempt in 0..2 {
            let location = self.locate(name)?;
            let text = std::fs::read_to_string(&location.file)
                .map_err(|e| EsysError::io(&location.file, e))?;
            let line = text.lines().nth(location.line).unwrap_or_default();

            if name_prefix(line) == Some(name) {
                let record = ParameterRecord::parse(line).ok_or_else(|| {
                    EsysError::MalformedParameter {
                        file: location.file.clone(),
                        line: location.line + 1,
                        content: line.trim().to_string(),
                    }
                })?;
                return Ok((location, text, record));
            }

            if attempt == 0 {
                self.invalidate();
            }
        }
        Err(EsysError::ParameterNotFound(name.to_string()))
    }

    /// Current value of `name`
    pub fn get(&mut self, name: &str) -> Result<String> {
        let (_, _, record) = self.read_record(name)?;
        Ok(record.value)
    }

    /// Rewrite the record of `name` with `value`, keeping its raw data and
    /// every other line of the file
    pub fn set(&mut self, name: &str, value: &str) -> Result<ParameterRecord> {
        let (location, text, mut record) = self.read_record(name)?;
        record.value = value.to_string();

        let mut out = String::with_capacity(text.len() + value.len());
        for (i, piece) in text.split_inclusive('\n').enumerate() {
            if i != location.line {
                out.push_str(piece);
                continue;
            }
            let ending = if piece.ends_with("\r\n") {
                "\r\n"
            } else if piece.ends_with('\n') {
                "\n"
            } else {
                ""
            };
            let indent_len = piece.len() - piece.trim_start().len();
            out.push_str(&piece[..indent_len]);
            out.push_str(&record.render());
            out.push_str(ending);
        }

        std::fs::write(&location.file, out).map_err(|e| EsysError::io(&location.file, e))?;
        info!(
            parameter = name,
            value,
            file = %location.file.display(),
            "Parameter updated"
        );
        Ok(record)
    }
}
