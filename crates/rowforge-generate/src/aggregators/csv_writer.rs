use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rowforge_core::{Aggregator, Error, GeneratedRow, Result};
use tracing::debug;

const NAME: &str = "csv_row_writer";

/// Writes the chosen fields of every row it sees to a CSV file of its own.
///
/// Each copy opens a fresh `<prefix>-<uuid>.csv` under `dir` in `start`, so
/// with several workers the rows are spread over one file per worker. The
/// accumulator is the number of rows written.
#[derive(Debug)]
pub struct CsvRowWriter {
    dir: PathBuf,
    prefix: String,
    fields: Vec<String>,
    path: Option<PathBuf>,
    writer: Option<csv::Writer<CountingWriter<BufWriter<File>>>>,
}

impl CsvRowWriter {
    pub fn new<I, S>(dir: impl Into<PathBuf>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dir: dir.into(),
            prefix: "rows".to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
            path: None,
            writer: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File opened by `start`, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn open(&mut self) -> std::result::Result<(), csv::Error> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self
            .dir
            .join(format!("{}-{}.csv", self.prefix, uuid::Uuid::new_v4()));
        let file = BufWriter::new(File::create(&path)?);
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(CountingWriter::new(file));
        writer.write_record(&self.fields)?;
        debug!(path = %path.display(), "csv writer opened");
        self.path = Some(path);
        self.writer = Some(writer);
        Ok(())
    }
}

/// Copies share configuration only; each opens its own file.
impl Clone for CsvRowWriter {
    fn clone(&self) -> Self {
        Self {
            dir: self.dir.clone(),
            prefix: self.prefix.clone(),
            fields: self.fields.clone(),
            path: None,
            writer: None,
        }
    }
}

impl Aggregator for CsvRowWriter {
    type Output = u64;

    fn name(&self) -> &str {
        NAME
    }

    fn fields_needed(&self) -> BTreeSet<String> {
        self.fields.iter().cloned().collect()
    }

    fn start(&mut self) -> Result<()> {
        self.open().map_err(|err| Error::aggregator(NAME, err.to_string()))
    }

    fn map(&mut self, row: &GeneratedRow) -> Result<u64> {
        let mut record = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = row.value(field).ok_or_else(|| {
                Error::aggregator(NAME, format!("row {} has no field '{field}'", row.id()))
            })?;
            record.push(value.to_csv());
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::aggregator(NAME, "map called before start"))?;
        writer
            .write_record(&record)
            .map_err(|err| Error::aggregator(NAME, err.to_string()))?;
        Ok(1)
    }

    fn reduce(&mut self, larger: u64, smaller: u64) -> Result<u64> {
        Ok(larger + smaller)
    }

    fn done(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let mut counting = writer
            .into_inner()
            .map_err(|err| Error::aggregator(NAME, err.error().to_string()))?;
        counting
            .flush()
            .map_err(|err| Error::aggregator(NAME, err.to_string()))?;
        debug!(
            path = ?self.path,
            bytes = counting.bytes_written(),
            "csv writer closed"
        );
        Ok(())
    }
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> std::fmt::Debug for CountingWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountingWriter")
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}
