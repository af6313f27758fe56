use std::fs::{self, File};
use std::io::{BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use tracing::debug;

use crate::clock::Clock;
use crate::domain::{Accession, FetchedRecord};
use crate::error::SeqFetchError;

/// Receives successful records as they arrive.
pub trait RecordSink {
    fn write_record(&mut self, id: &Accession, text: &str) -> Result<(), SeqFetchError>;
}

/// `{dir}/{YYYY-MM-DD}.fasta`
pub fn output_path(dir: &Utf8Path, date: NaiveDate) -> Utf8PathBuf {
    dir.join(format!("{}.fasta", date.format("%Y-%m-%d")))
}

fn ensure_dir(dir: &Utf8Path) -> Result<(), SeqFetchError> {
    fs::create_dir_all(dir.as_std_path()).map_err(|err| {
        SeqFetchError::persistence(format!("create directory {dir}: {err}"))
    })
}

/// Append-as-you-go output file named after the run's date.
///
/// Every record is flushed as soon as it is written so a crash leaves the
/// records fetched so far on disk. Dropping the sink flushes the buffer;
/// [`DatedFastaSink::finish`] also syncs and reports errors.
pub struct DatedFastaSink {
    path: Utf8PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

impl DatedFastaSink {
    pub fn create<K: Clock + ?Sized>(dir: &Utf8Path, clock: &K) -> Result<Self, SeqFetchError> {
        ensure_dir(dir)?;
        let path = output_path(dir, clock.today());
        let file = File::create(path.as_std_path())
            .map_err(|err| SeqFetchError::persistence(format!("create {path}: {err}")))?;
        debug!(path = %path, "opened output file");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            records: 0,
        })
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn finish(mut self) -> Result<Utf8PathBuf, SeqFetchError> {
        self.writer
            .flush()
            .map_err(|err| SeqFetchError::persistence(format!("flush {}: {err}", self.path)))?;
        self.writer
            .get_ref()
            .sync_all()
            .map_err(|err| SeqFetchError::persistence(format!("sync {}: {err}", self.path)))?;
        debug!(path = %self.path, records = self.records, "closed output file");
        Ok(self.path)
    }
}

impl RecordSink for DatedFastaSink {
    fn write_record(&mut self, _id: &Accession, text: &str) -> Result<(), SeqFetchError> {
        self.writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|err| SeqFetchError::persistence(format!("write {}: {err}", self.path)))?;
        self.records += 1;
        Ok(())
    }
}

/// Opens a dated sink for the duration of `body`.
///
/// On success the sink is finished (flushed and synced) and its path returned
/// alongside the body's value. On error the sink is dropped, which flushes
/// whatever was written before the failure.
pub fn with_sink<K, T, F>(
    dir: &Utf8Path,
    clock: &K,
    body: F,
) -> Result<(T, Utf8PathBuf), SeqFetchError>
where
    K: Clock + ?Sized,
    F: FnOnce(&mut DatedFastaSink) -> Result<T, SeqFetchError>,
{
    let mut sink = DatedFastaSink::create(dir, clock)?;
    let value = body(&mut sink)?;
    let path = sink.finish()?;
    Ok((value, path))
}

/// Writes all records in one pass. The file only appears at its final path
/// once fully written.
pub fn write_bulk<K: Clock + ?Sized>(
    dir: &Utf8Path,
    clock: &K,
    records: &[FetchedRecord],
) -> Result<Utf8PathBuf, SeqFetchError> {
    ensure_dir(dir)?;
    let path = output_path(dir, clock.today());
    let temp = tempfile::Builder::new()
        .prefix("kira-seqfetch")
        .tempfile_in(dir.as_std_path())
        .map_err(|err| SeqFetchError::persistence(format!("temp file in {dir}: {err}")))?;
    {
        let mut writer = BufWriter::new(temp.as_file());
        for record in records {
            writer
                .write_all(record.text.as_bytes())
                .map_err(|err| SeqFetchError::persistence(format!("write {path}: {err}")))?;
        }
        writer
            .flush()
            .map_err(|err| SeqFetchError::persistence(format!("flush {path}: {err}")))?;
    }
    temp.as_file()
        .sync_all()
        .map_err(|err| SeqFetchError::persistence(format!("sync {path}: {err}")))?;
    temp.persist(path.as_std_path())
        .map_err(|err| SeqFetchError::persistence(format!("persist {path}: {err}")))?;
    debug!(path = %path, records = records.len(), "wrote output file");
    Ok(path)
}
