use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use chrono::TimeDelta;
use log::{debug, info, warn};

use crate::{
    message::Message,
    resolver::SEQUENCE_EXTENSION,
    topic::{topic_name_from_file, Topic},
};

/// Position of a message inside a sequence: which topic, which row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub topic: usize,
    pub message: usize,
}

/// One recorded flight: every topic exported for a bag file, plus a
/// chronological index across all of them.
#[derive(Debug, Default)]
pub struct Sequence {
    pub name: String,
    pub directory: PathBuf,
    pub topics: Vec<Topic>,
    message_index: Vec<MessageRef>,
    is_initialized: bool,
}

pub fn format_duration(d: TimeDelta) -> String {
    format!("{:.3} s", d.num_milliseconds() as f64 / 1000.0)
}

/// Stems of the other bag files in `files` whose names extend `name` with
/// `-`, so their topic exports also match `<name>-*.csv`.
fn sibling_sequences(files: &[PathBuf], name: &str) -> Vec<String> {
    let prefix = format!("{}-", name);
    files
        .iter()
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(SEQUENCE_EXTENSION))
        .filter_map(|p| p.file_stem()?.to_str())
        .filter(|stem| stem.starts_with(&prefix))
        .map(str::to_string)
        .collect()
}

impl Sequence {
    /// Loads `<directory>/<name>-*.csv`. Never fails; check
    /// [`Sequence::is_initialized`] before use.
    pub fn new(directory: impl AsRef<Path>, name: &str) -> Self {
        let mut sequence = Self::default();
        if let Err(e) = sequence.load_sequence(directory.as_ref(), name) {
            warn!("could not load sequence {}: {:#}", name, e);
        }
        sequence
    }

    pub fn load_sequence(&mut self, directory: &Path, name: &str) -> Result<()> {
        self.clear();
        self.name = name.to_string();
        self.directory = directory.to_path_buf();

        let entries = fs::read_dir(directory)
            .with_context(|| format!("Failed listing {}", directory.display()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() {
                files.push(path);
            }
        }

        // `<name>-a.bag` next to `<name>.bag` owns the `<name>-a-*.csv` exports
        let siblings = sibling_sequences(&files, name);

        let mut topics = Vec::new();
        for path in files {
            if topic_name_from_file(&path, name).is_none() {
                continue;
            }
            if let Some(owner) = siblings
                .iter()
                .find(|s| topic_name_from_file(&path, s).is_some())
            {
                debug!("{} belongs to sequence {}", path.display(), owner);
                continue;
            }

            match Topic::read_from_file(&path, name) {
                Ok(topic) => topics.push(topic),
                Err(e) => warn!("skipping {}: {:#}", path.display(), e),
            }
        }

        if topics.is_empty() {
            return Err(anyhow!(
                "no topics for {} in {}",
                name,
                directory.display()
            ));
        }

        topics.sort_by(|a, b| a.name.cmp(&b.name));
        self.topics = topics;
        self.merge_topics();
        self.is_initialized = true;

        info!(
            "loaded sequence {} with {} topics and {} messages",
            self.name,
            self.topics.len(),
            self.message_index.len()
        );

        Ok(())
    }

    fn merge_topics(&mut self) {
        self.message_index = self
            .topics
            .iter()
            .enumerate()
            .flat_map(|(t, topic)| {
                (0..topic.messages.len()).map(move |m| MessageRef {
                    topic: t,
                    message: m,
                })
            })
            .collect();

        let topics = &self.topics;
        self.message_index
            .sort_by_key(|r| topics[r.topic].messages[r.message].date_time);

        debug!("merged {} messages", self.message_index.len());
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn find_topic_index(&self, name: &str) -> Option<usize> {
        self.topics.iter().position(|t| t.name == name)
    }

    pub fn message_count(&self) -> usize {
        self.message_index.len()
    }

    /// The `i`-th message in chronological order.
    pub fn get_message(&self, i: usize) -> Option<&Message> {
        let r = self.message_index.get(i)?;
        self.topics[r.topic].messages.get(r.message)
    }

    pub fn topic_of_message(&self, i: usize) -> Option<&Topic> {
        let r = self.message_index.get(i)?;
        self.topics.get(r.topic)
    }

    pub fn get_fault_topics(&self) -> Vec<&Topic> {
        self.topics.iter().filter(|t| t.is_fault_topic()).collect()
    }

    /// Index, in chronological order, of the earliest message recorded on a
    /// fault topic.
    pub fn find_first_fault_message(&self) -> Option<usize> {
        self.message_index
            .iter()
            .position(|r| self.topics[r.topic].is_fault_topic())
    }

    pub fn get_total_duration(&self) -> Option<TimeDelta> {
        let first = self.get_message(0)?;
        let last = self.get_message(self.message_count().checked_sub(1)?)?;
        Some(last.date_time - first.date_time)
    }

    /// Time from the first message to the first fault; the whole flight when
    /// there is no fault.
    pub fn get_normal_flight_duration(&self) -> Option<TimeDelta> {
        match self.find_first_fault_message() {
            Some(i) => {
                let first = self.get_message(0)?;
                Some(self.get_message(i)?.date_time - first.date_time)
            }
            None => self.get_total_duration(),
        }
    }

    pub fn write_brief_info(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "Sequence: {}", self.name)?;
        writeln!(w, "Directory: {}", self.directory.display())?;
        writeln!(
            w,
            "Topics: {} ({} messages)",
            self.topics.len(),
            self.message_count()
        )?;

        if let Some(d) = self.get_total_duration() {
            writeln!(w, "Total duration: {}", format_duration(d))?;
        }

        let faults: Vec<&str> = self
            .get_fault_topics()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        if faults.is_empty() {
            writeln!(w, "Fault topics: none")
        } else {
            writeln!(w, "Fault topics: {}", faults.join(", "))
        }
    }

    pub fn print_brief_info(&self) -> io::Result<()> {
        self.write_brief_info(&mut io::stdout().lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ: &str = "carbonZ_2018-07-18-15-53-31_1_engine_failure";

    fn write(dir: &Path, topic: &str, content: &str) {
        fs::write(dir.join(format!("{}-{}.csv", SEQ, topic)), content).unwrap();
    }

    fn flight_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "mavros-nav_info-roll",
            "%time,field.header.seq,field.header.stamp,field.header.frame_id,field.commanded,field.measured\n\
             1000000000,1,1000000000,,0.1,0.1\n\
             2000000000,2,2000000000,,0.2,0.2\n\
             4000000000,3,4000000000,,0.3,0.3\n",
        );
        write(
            dir.path(),
            "failure_status-engines",
            "%time,field.data\n3500000000,True\n3900000000,True\n",
        );
        write(
            dir.path(),
            "mavros-imu-data",
            "%time,field.header.seq,field.header.stamp,field.header.frame_id,field.x\n\
             1500000000,1,1500000000,imu,9.8\n",
        );
        // another sequence in the same folder
        fs::write(
            dir.path().join("other-mavros-nav_info-roll.csv"),
            "%time,field.data\n0,1\n",
        )
        .unwrap();
        // and the bag itself
        fs::write(dir.path().join(format!("{}.bag", SEQ)), b"#ROSBAG").unwrap();
        dir
    }

    #[test]
    fn test_load_sequence() {
        let dir = flight_dir();
        let seq = Sequence::new(dir.path(), SEQ);

        assert!(seq.is_initialized());
        assert_eq!(seq.topics.len(), 3);
        assert_eq!(seq.message_count(), 6);
        assert_eq!(seq.topics[0].name, "failure_status-engines");
        assert_eq!(seq.find_topic_index("mavros-nav_info-roll"), Some(2));
        assert_eq!(seq.find_topic_index("mavros-nav_info-pitch"), None);
    }

    #[test]
    fn test_messages_are_chronological() {
        let dir = flight_dir();
        let seq = Sequence::new(dir.path(), SEQ);

        let times: Vec<i64> = (0..seq.message_count())
            .map(|i| seq.get_message(i).unwrap().date_time.timestamp_millis())
            .collect();
        assert_eq!(times, vec![1000, 1500, 2000, 3500, 3900, 4000]);
        assert_eq!(seq.topic_of_message(1).unwrap().name, "mavros-imu-data");
        assert!(seq.get_message(6).is_none());
    }

    #[test]
    fn test_first_fault_and_durations() {
        let dir = flight_dir();
        let seq = Sequence::new(dir.path(), SEQ);

        let fault = seq.find_first_fault_message().unwrap();
        assert_eq!(fault, 3);
        assert!(seq.topic_of_message(fault).unwrap().is_fault_topic());

        assert_eq!(seq.get_total_duration(), Some(TimeDelta::milliseconds(3000)));
        assert_eq!(
            seq.get_normal_flight_duration(),
            Some(TimeDelta::milliseconds(2500))
        );
        assert_eq!(seq.get_fault_topics().len(), 1);
    }

    #[test]
    fn test_no_fault_uses_total_duration() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "mavros-state", "%time,field.mode\n1000000000,AUTO\n3000000000,AUTO\n");
        let seq = Sequence::new(dir.path(), SEQ);

        assert_eq!(seq.find_first_fault_message(), None);
        assert_eq!(
            seq.get_normal_flight_duration(),
            Some(TimeDelta::milliseconds(2000))
        );
    }

    #[test]
    fn test_sibling_sequence_exports_are_not_taken() {
        let dir = tempfile::tempdir().unwrap();
        let data = "%time,field.data\n1000000000,1\n";
        for file in ["s.bag", "s-a.bag", "s-x.csv", "s-a-y.csv"] {
            fs::write(dir.path().join(file), data).unwrap();
        }

        let seq = Sequence::new(dir.path(), "s");
        let names: Vec<&str> = seq.topics.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["x"]);

        let sibling = Sequence::new(dir.path(), "s-a");
        assert_eq!(sibling.find_topic_index("y"), Some(0));
        assert_eq!(sibling.topics.len(), 1);
    }

    #[test]
    fn test_bad_topic_is_skipped() {
        let dir = flight_dir();
        write(dir.path(), "broken", "field.data\n1\n");
        let seq = Sequence::new(dir.path(), SEQ);

        assert!(seq.is_initialized());
        assert_eq!(seq.find_topic_index("broken"), None);
    }

    #[test]
    fn test_missing_directory_is_uninitialized() {
        let dir = tempfile::tempdir().unwrap();
        let seq = Sequence::new(dir.path().join("nope"), SEQ);
        assert!(!seq.is_initialized());
    }

    #[test]
    fn test_no_matching_topics_is_uninitialized() {
        let dir = flight_dir();
        let seq = Sequence::new(dir.path(), "carbonZ_unknown");
        assert!(!seq.is_initialized());
        assert_eq!(seq.message_count(), 0);
        assert_eq!(seq.get_total_duration(), None);
    }

    #[test]
    fn test_clear_resets() {
        let dir = flight_dir();
        let mut seq = Sequence::new(dir.path(), SEQ);
        seq.clear();
        assert!(!seq.is_initialized());
        assert!(seq.topics.is_empty());
    }

    #[test]
    fn test_brief_info() {
        let dir = flight_dir();
        let seq = Sequence::new(dir.path(), SEQ);

        let mut out = Vec::new();
        seq.write_brief_info(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains(&format!("Sequence: {}", SEQ)));
        assert!(text.contains("Topics: 3 (6 messages)"));
        assert!(text.contains("Total duration: 3.000 s"));
        assert!(text.contains("Fault topics: failure_status-engines"));
    }
}
