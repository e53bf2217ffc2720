use std::fmt;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

pub const TIME_LABEL: &str = "%time";
pub const FIELD_PREFIX: &str = "field.";
pub const HEADER_SEQ_LABEL: &str = "field.header.seq";
pub const HEADER_STAMP_LABEL: &str = "field.header.stamp";
pub const HEADER_FRAME_LABEL: &str = "field.header.frame_id";

pub const DEFAULT_SEPARATOR: &str = " | ";

const DATE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

/// ROS message header as exported by `rostopic echo -p`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Header {
    pub seq: i64,
    pub stamp_secs: i64,
    pub stamp_nsecs: u32,
    pub frame_id: String,
}

/// A single record of a topic.
///
/// Derived ordering compares the recorded time first, then the header, then
/// the field values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Message {
    pub date_time: DateTime<Utc>,
    pub header: Option<Header>,
    pub fields: Vec<String>,
}

pub fn is_header_label(label: &str) -> bool {
    matches!(
        label,
        HEADER_SEQ_LABEL | HEADER_STAMP_LABEL | HEADER_FRAME_LABEL
    )
}

pub fn format_date_time(dt: &DateTime<Utc>) -> String {
    dt.format(DATE_TIME_FORMAT).to_string()
}

fn parse_epoch_nanos(token: &str) -> Result<DateTime<Utc>> {
    let nanos: i64 = token
        .trim()
        .parse()
        .with_context(|| format!("invalid epoch timestamp `{}`", token))?;
    Ok(DateTime::from_timestamp_nanos(nanos))
}

impl Message {
    /// Builds a message from one CSV row, given the label row of its file.
    pub fn from_tokens<'a>(
        tokens: impl IntoIterator<Item = &'a str>,
        labels: &[String],
    ) -> Result<Self> {
        let tokens: Vec<&str> = tokens.into_iter().collect();
        if tokens.len() != labels.len() {
            return Err(anyhow!(
                "expected {} columns, got {}",
                labels.len(),
                tokens.len()
            ));
        }

        let mut date_time = None;
        let mut header: Option<Header> = None;
        let mut fields = Vec::new();

        for (label, token) in labels.iter().zip(tokens) {
            match label.as_str() {
                TIME_LABEL => date_time = Some(parse_epoch_nanos(token)?),
                HEADER_SEQ_LABEL => {
                    header.get_or_insert_with(Header::default).seq = token
                        .trim()
                        .parse()
                        .with_context(|| format!("invalid header seq `{}`", token))?;
                }
                HEADER_STAMP_LABEL => {
                    let stamp = parse_epoch_nanos(token)?;
                    let h = header.get_or_insert_with(Header::default);
                    h.stamp_secs = stamp.timestamp();
                    h.stamp_nsecs = stamp.timestamp_subsec_nanos();
                }
                HEADER_FRAME_LABEL => {
                    header.get_or_insert_with(Header::default).frame_id = token.to_string();
                }
                _ => fields.push(token.to_string()),
            }
        }

        Ok(Self {
            date_time: date_time.ok_or_else(|| anyhow!("row has no {} column", TIME_LABEL))?,
            header,
            fields,
        })
    }

    pub fn formatted_time(&self) -> String {
        format_date_time(&self.date_time)
    }

    pub fn to_string_with(&self, separator: &str) -> String {
        let mut out = self.formatted_time();

        if let Some(h) = &self.header {
            out.push_str(&format!(
                "{sep}{:>5}{sep}{:>10}{sep}{:>9}{sep}{}",
                h.seq,
                h.stamp_secs,
                h.stamp_nsecs,
                h.frame_id,
                sep = separator
            ));
        }

        for field in &self.fields {
            out.push_str(separator);
            out.push_str(field);
        }

        out
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_with(DEFAULT_SEPARATOR))
    }
}
