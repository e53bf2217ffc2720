use std::{
    io::{self, Write},
    ops::Range,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::message::{is_header_label, Message, FIELD_PREFIX, TIME_LABEL};

pub const CSV_EXTENSION: &str = "csv";

/// Topics whose names start with this prefix record injected failures.
pub const FAULT_TOPIC_PREFIX: &str = "failure_status";

/// One data channel of a sequence, loaded from its CSV export.
#[derive(Debug, Clone, Default)]
pub struct Topic {
    pub name: String,
    pub file_name: PathBuf,
    pub field_labels: Vec<String>,
    pub messages: Vec<Message>,
    has_header: bool,
}

/// Derives the topic name from `<sequence_name>-<topic>.csv`.
pub fn topic_name_from_file(path: &Path, sequence_name: &str) -> Option<String> {
    if path.extension()?.to_str()? != CSV_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let name = stem.strip_prefix(sequence_name)?.strip_prefix('-')?;

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

impl Topic {
    pub fn read_from_file(path: &Path, sequence_name: &str) -> Result<Self> {
        let name = topic_name_from_file(path, sequence_name)
            .ok_or_else(|| anyhow!("{} is not a topic of {}", path.display(), sequence_name))?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed opening {}", path.display()))?;

        let mut records = reader.records();

        let labels: Vec<String> = match records.next() {
            Some(r) => r?.iter().map(|s| s.trim().to_string()).collect(),
            None => return Err(anyhow!("{} is empty", path.display())),
        };

        if !labels.iter().any(|l| l == TIME_LABEL) {
            return Err(anyhow!(
                "{} has no {} column",
                path.display(),
                TIME_LABEL
            ));
        }

        let mut messages = Vec::new();
        for (line, record) in records.enumerate() {
            // line numbers are 1-based and the label row is line 1
            let record = match record {
                Ok(r) => r,
                Err(e) if matches!(e.kind(), csv::ErrorKind::Utf8 { .. }) => {
                    warn!("{}: skipping line {}: {}", path.display(), line + 2, e);
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed reading {}", path.display()))
                }
            };

            match Message::from_tokens(record.iter(), &labels) {
                Ok(msg) => messages.push(msg),
                Err(e) => warn!("{}: skipping line {}: {}", path.display(), line + 2, e),
            }
        }

        let has_header = labels.iter().any(|l| is_header_label(l));
        let field_labels = labels
            .iter()
            .filter(|l| *l != TIME_LABEL && !is_header_label(l))
            .map(|l| l.strip_prefix(FIELD_PREFIX).unwrap_or(l).to_string())
            .collect();

        debug!("loaded topic {} with {} messages", name, messages.len());

        Ok(Self {
            name,
            file_name: path.to_path_buf(),
            field_labels,
            messages,
            has_header,
        })
    }

    pub fn is_initialized(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn is_fault_topic(&self) -> bool {
        self.name.starts_with(FAULT_TOPIC_PREFIX)
    }

    pub fn has_header_field(&self) -> bool {
        self.has_header
    }

    pub fn find_label_index(&self, label: &str) -> Option<usize> {
        self.field_labels.iter().position(|l| l == label)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn range(&self, start: usize, count: Option<usize>) -> Range<usize> {
        let len = self.messages.len();
        let start = start.min(len);
        let end = match count {
            Some(n) => start.saturating_add(n).min(len),
            None => len,
        };
        start..end
    }

    pub fn write_header(&self, w: &mut impl Write, separator: &str) -> io::Result<()> {
        let mut columns = vec!["time"];
        if self.has_header {
            columns.extend(["seq", "secs", "nsecs", "frame_id"]);
        }
        columns.extend(self.field_labels.iter().map(String::as_str));

        writeln!(w, "{}", columns.join(separator))
    }

    /// Writes `count` messages starting at `start`, one per line. `None`
    /// writes through to the last message.
    pub fn write_records(
        &self,
        w: &mut impl Write,
        start: usize,
        count: Option<usize>,
        separator: &str,
    ) -> io::Result<()> {
        for msg in &self.messages[self.range(start, count)] {
            writeln!(w, "{}", msg.to_string_with(separator))?;
        }
        Ok(())
    }

    pub fn print_header(&self, separator: &str) -> io::Result<()> {
        self.write_header(&mut io::stdout().lock(), separator)
    }

    pub fn print(&self, start: usize, count: Option<usize>, separator: &str) -> io::Result<()> {
        self.write_records(&mut io::stdout().lock(), start, count, separator)
    }

    pub fn get_times(&self, start: usize, count: Option<usize>) -> Vec<DateTime<Utc>> {
        self.messages[self.range(start, count)]
            .iter()
            .map(|m| m.date_time)
            .collect()
    }

    pub fn get_fields_as_string_by_index(
        &self,
        index: usize,
        start: usize,
        count: Option<usize>,
    ) -> Result<Vec<&str>> {
        if index >= self.field_labels.len() {
            return Err(anyhow!(
                "topic {} has no field at index {}",
                self.name,
                index
            ));
        }

        self.messages[self.range(start, count)]
            .iter()
            .map(|m| {
                m.fields
                    .get(index)
                    .map(String::as_str)
                    .ok_or_else(|| anyhow!("message at {} is missing field {}", m.formatted_time(), index))
            })
            .collect()
    }

    pub fn get_fields_as_string_by_name(
        &self,
        label: &str,
        start: usize,
        count: Option<usize>,
    ) -> Result<Vec<&str>> {
        self.get_fields_as_string_by_index(self.label_index(label)?, start, count)
    }

    pub fn get_fields_as_double_by_index(
        &self,
        index: usize,
        start: usize,
        count: Option<usize>,
    ) -> Result<Vec<f64>> {
        self.parse_fields(index, start, count)
    }

    pub fn get_fields_as_double_by_name(
        &self,
        label: &str,
        start: usize,
        count: Option<usize>,
    ) -> Result<Vec<f64>> {
        self.parse_fields(self.label_index(label)?, start, count)
    }

    pub fn get_fields_as_int_by_name(
        &self,
        label: &str,
        start: usize,
        count: Option<usize>,
    ) -> Result<Vec<i64>> {
        self.parse_fields(self.label_index(label)?, start, count)
    }

    fn label_index(&self, label: &str) -> Result<usize> {
        self.find_label_index(label)
            .ok_or_else(|| anyhow!("topic {} has no field {}", self.name, label))
    }

    fn parse_fields<T>(&self, index: usize, start: usize, count: Option<usize>) -> Result<Vec<T>>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        self.get_fields_as_string_by_index(index, start, count)?
            .into_iter()
            .map(|s| {
                s.trim()
                    .parse::<T>()
                    .with_context(|| format!("cannot convert `{}` in topic {}", s, self.name))
            })
            .collect()
    }
}
