use crate::error::LogError;
use chrono::{DateTime, Local};
use cogex_core::{EventRecord, EventValue};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Columns that lead every row, in this order. The rest follow sorted.
pub const PREFIX_COLUMNS: [&str; 5] = ["time_s", "trial_index", "event_type", "participant", "session"];

/// Identity of the session, stamped on every row.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub participant: String,
    pub session: String,
    pub task_name: String,
    pub started: DateTime<Local>,
}

impl SessionInfo {
    pub fn new(participant: &str, session: &str, task_name: &str) -> Self {
        Self {
            participant: participant.to_owned(),
            session: session.to_owned(),
            task_name: task_name.to_owned(),
            started: Local::now(),
        }
    }

    /// `{participant}_{TaskName}_{YYYYmmdd_HHMMSS}.csv`, spaces removed from
    /// the task name.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.csv",
            self.participant,
            self.task_name.replace(' ', ""),
            self.started.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Append-only, in-memory record buffer written out once as a CSV table.
///
/// Records may carry different fields; the table has one column per field
/// name seen in any record and leaves the cell empty where a record lacks it.
///
/// The first successful flush wins, later ones are no-ops, so the normal exit
/// path and the drop path can both flush. With a teardown path set, a log
/// dropped before it was flushed (early return, panic) writes itself there.
#[derive(Debug)]
pub struct EventLog {
    info: SessionInfo,
    records: Vec<EventRecord>,
    flushed: bool,
    teardown_path: Option<PathBuf>,
}

impl EventLog {
    pub fn new(info: SessionInfo) -> Self {
        Self {
            info,
            records: Vec::new(),
            flushed: false,
            teardown_path: None,
        }
    }

    pub fn with_teardown_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.teardown_path = Some(path.into());
        self
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn teardown_path(&self) -> Option<&Path> {
        self.teardown_path.as_deref()
    }

    /// Default output path for this session inside `dir`.
    pub fn default_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.info.file_name())
    }

    /// Reserves room for `additional` records so appends inside a run do not
    /// reallocate.
    pub fn reserve(&mut self, additional: usize) {
        self.records.reserve(additional);
    }

    pub fn append(&mut self, record: EventRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Every column of the table: the fixed prefix, then the union of all
    /// record fields in lexicographic order.
    pub fn columns(&self) -> Vec<Cow<'static, str>> {
        let extra: BTreeSet<&Cow<'static, str>> = self
            .records
            .iter()
            .flat_map(|r| r.fields.keys())
            .filter(|k| !is_prefix(k))
            .collect();
        PREFIX_COLUMNS
            .iter()
            .map(|c| Cow::Borrowed(*c))
            .chain(extra.into_iter().cloned())
            .collect()
    }

    /// Writes the table. Does nothing if the log was already flushed.
    pub fn flush<W: Write>(&mut self, writer: W) -> Result<(), LogError> {
        if self.flushed {
            return Ok(());
        }
        self.write_csv(writer)?;
        self.flushed = true;
        Ok(())
    }

    /// Writes the table to `path`, creating parent directories. On failure the
    /// records are dumped as JSON lines to `{path}.bak` and the original error
    /// is still returned.
    pub fn flush_to_path(&mut self, path: &Path) -> Result<(), LogError> {
        if self.flushed {
            return Ok(());
        }
        match self.write_file(path) {
            Ok(()) => {
                self.flushed = true;
                info!(path = %path.display(), records = self.records.len(), "event log saved");
                Ok(())
            }
            Err(source) => {
                let fallback = self.dump_fallback(path);
                Err(LogError::Persistence {
                    path: path.to_path_buf(),
                    source,
                    fallback,
                })
            }
        }
    }

    fn write_file(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        self.write_csv(BufWriter::new(file))
    }

    fn write_csv<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        let columns = self.columns();

        write_row(&mut w, columns.iter().map(|c| Cow::Borrowed(&**c)))?;
        for record in &self.records {
            let cells = columns.iter().map(|c| self.cell(record, c));
            write_row(&mut w, cells)?;
        }
        w.flush()
    }

    fn cell<'a>(&'a self, record: &'a EventRecord, column: &str) -> Cow<'a, str> {
        match column {
            "time_s" => Cow::Owned(record.time_s.to_string()),
            "trial_index" => match record.trial_index {
                Some(i) => Cow::Owned(i.to_string()),
                None => Cow::Borrowed(""),
            },
            "event_type" => Cow::Borrowed(&*record.event_type),
            "participant" | "session" => match record.get(column) {
                Some(v) => render(v),
                None if column == "participant" => Cow::Borrowed(self.info.participant.as_str()),
                None => Cow::Borrowed(self.info.session.as_str()),
            },
            _ => record.get(column).map_or(Cow::Borrowed(""), render),
        }
    }

    fn dump_fallback(&self, path: &Path) -> Option<PathBuf> {
        let mut name = path.as_os_str().to_owned();
        name.push(".bak");
        let backup = PathBuf::from(name);

        let result = File::create(&backup).map_err(LogError::from).and_then(|f| {
            let mut w = BufWriter::new(f);
            for record in &self.records {
                serde_json::to_writer(&mut w, record).map_err(std::io::Error::from)?;
                w.write_all(b"\n")?;
            }
            w.flush()?;
            Ok(())
        });
        match result {
            Ok(()) => {
                warn!(path = %backup.display(), records = self.records.len(), "event log dumped to fallback file");
                Some(backup)
            }
            Err(e) => {
                warn!(error = %e, "event log fallback dump failed");
                None
            }
        }
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        if self.flushed {
            return;
        }
        let Some(path) = self.teardown_path.clone() else {
            if !self.records.is_empty() {
                warn!(records = self.records.len(), "event log dropped without being flushed");
            }
            return;
        };
        if let Err(e) = self.flush_to_path(&path) {
            warn!(error = %e, "event log flush on teardown failed");
        }
    }
}

fn is_prefix(name: &str) -> bool {
    PREFIX_COLUMNS.contains(&name)
}

fn render(value: &EventValue) -> Cow<'_, str> {
    match value {
        EventValue::Text(s) => Cow::Borrowed(&**s),
        EventValue::Missing => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

fn write_row<'a, W, I>(w: &mut W, cells: I) -> std::io::Result<()>
where
    W: Write,
    I: Iterator<Item = Cow<'a, str>>,
{
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        write_cell(w, &cell)?;
    }
    w.write_all(b"\n")
}

fn write_cell<W: Write>(w: &mut W, cell: &str) -> std::io::Result<()> {
    if cell.contains([',', '"', '\n', '\r']) {
        w.write_all(b"\"")?;
        w.write_all(cell.replace('"', "\"\"").as_bytes())?;
        w.write_all(b"\"")
    } else {
        w.write_all(cell.as_bytes())
    }
}
