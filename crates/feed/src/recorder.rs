//! Rotating quote log
//!
//! Appends one delimited record per successful fetch. Files are
//! time-bucketed: crossing a bucket boundary closes the current file and
//! opens a new one named after the bucket's start time.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use ratewatch_core::Quote;

struct OpenLog {
    bucket: u64,
    writer: BufWriter<File>,
}

/// Append-only CSV log of observed quotes, rotated on a fixed interval
pub struct QuoteRecorder {
    dir: PathBuf,
    rotate_every_secs: u64,
    log: Mutex<Option<OpenLog>>,
}

impl QuoteRecorder {
    pub fn new(dir: PathBuf, rotate_every_secs: u64) -> anyhow::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            rotate_every_secs: rotate_every_secs.max(1),
            log: Mutex::new(None),
        })
    }

    /// Appends one record. Recording is best-effort: an I/O failure is
    /// logged and never surfaces to the updater.
    pub fn append(&self, quote: &Quote) {
        if let Err(err) = self.try_append(quote) {
            warn!(source = %quote.source, error = %err, "quote log write failed");
        }
    }

    fn try_append(&self, quote: &Quote) -> anyhow::Result<()> {
        let bucket = bucket_index(quote.observed_at_ms / 1000, self.rotate_every_secs);

        let mut guard = self.log.lock();
        let rotate = guard.as_ref().map_or(true, |log| log.bucket != bucket);
        if rotate {
            let path = self.dir.join(file_name(bucket, self.rotate_every_secs));
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            info!(path = %path.display(), "quote log rotated");
            *guard = Some(OpenLog {
                bucket,
                writer: BufWriter::new(file),
            });
        }

        // rotate above guarantees the slot is filled
        if let Some(log) = guard.as_mut() {
            writeln!(
                log.writer,
                "{},{},{}",
                quote.source,
                quote.price,
                observed_at_rfc3339(quote)
            )?;
            log.writer.flush()?;
        }
        Ok(())
    }
}

fn bucket_index(unix_secs: u64, rotate_every_secs: u64) -> u64 {
    unix_secs / rotate_every_secs
}

fn file_name(bucket: u64, rotate_every_secs: u64) -> String {
    let start = (bucket * rotate_every_secs) as i64;
    let at = DateTime::<Utc>::from_timestamp(start, 0).unwrap_or_default();
    format!("quotes-{}.csv", at.format("%Y%m%d-%H%M%S"))
}

fn observed_at_rfc3339(quote: &Quote) -> String {
    DateTime::<Utc>::from_timestamp_millis(quote.observed_at_ms as i64)
        .map(|t| t.to_rfc3339())
        .unwrap_or_default()
}
