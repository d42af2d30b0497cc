//! Binary results stream.
//!
//! Concentrations are recorded at each reporting instant to a scratch file
//! that is opened lazily on first write and removed when the project closes.
//! `save_to` copies the finished stream to a caller-named destination.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::msx_error::{MsxError, Result};

/// File signature shared with the legacy toolkit.
pub const MAGIC: u32 = 516114521;
/// Format version.
pub const VERSION: u32 = 100000;

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

fn scratch_path() -> PathBuf {
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("msxout-{}-{}.tmp", std::process::id(), seq))
}

/// Layout constants written into the header so a reader can frame periods.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OutHeader {
    pub n_species: u32,
    pub n_report_nodes: u32,
    pub n_report_links: u32,
}

/// Streaming writer for the concentration tensor
/// `[species x location x time]`.
#[derive(Debug, Default)]
pub struct OutWriter {
    file: Option<(PathBuf, BufWriter<File>)>,
    header: OutHeader,
    periods: u32,
    finalized: bool,
}

impl OutWriter {
    pub fn new() -> OutWriter {
        OutWriter::default()
    }

    fn writer(&mut self, header: OutHeader) -> Result<&mut BufWriter<File>> {
        if self.file.is_none() {
            let path = scratch_path();
            let file = File::create(&path).map_err(|_| MsxError::OutputOpen)?;
            let mut writer = BufWriter::new(file);
            let write_header = |w: &mut BufWriter<File>| -> std::io::Result<()> {
                w.write_all(&MAGIC.to_le_bytes())?;
                w.write_all(&VERSION.to_le_bytes())?;
                w.write_all(&header.n_species.to_le_bytes())?;
                w.write_all(&header.n_report_nodes.to_le_bytes())?;
                w.write_all(&header.n_report_links.to_le_bytes())?;
                Ok(())
            };
            write_header(&mut writer).map_err(|_| MsxError::OutputWrite)?;
            self.header = header;
            self.file = Some((path, writer));
        }
        Ok(&mut self.file.as_mut().expect("just opened").1)
    }

    /// Appends one reporting instant. `values` holds every reported node's
    /// species block followed by every reported link's, in declaration order.
    pub fn write_period(&mut self, header: OutHeader, values: &[f32]) -> Result<()> {
        debug_assert_eq!(
            values.len() as u32,
            (header.n_report_nodes + header.n_report_links) * header.n_species
        );
        let writer = self.writer(header)?;
        for v in values {
            writer
                .write_all(&v.to_le_bytes())
                .map_err(|_| MsxError::OutputWrite)?;
        }
        self.periods += 1;
        Ok(())
    }

    /// Writes the period-count trailer and flushes. Idempotent.
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        if let Some((_, writer)) = self.file.as_mut() {
            writer
                .write_all(&self.periods.to_le_bytes())
                .and_then(|_| writer.write_all(&MAGIC.to_le_bytes()))
                .and_then(|_| writer.flush())
                .map_err(|_| MsxError::OutputWrite)?;
            self.finalized = true;
        }
        Ok(())
    }

    /// Copies the finished stream to `path`.
    pub fn save_to(&mut self, path: &std::path::Path) -> Result<()> {
        self.finalize()?;
        match self.file.as_ref() {
            Some((scratch, _)) => {
                std::fs::copy(scratch, path).map_err(|_| MsxError::OutputWrite)?;
                Ok(())
            }
            None => Err(MsxError::OutputOpen),
        }
    }

    pub fn periods(&self) -> u32 {
        self.periods
    }

    /// Removes the scratch file. Called on every close path.
    pub fn remove_scratch(&mut self) {
        if let Some((path, writer)) = self.file.take() {
            drop(writer);
            std::fs::remove_file(&path).ok();
        }
        self.periods = 0;
        self.finalized = false;
    }
}

impl Drop for OutWriter {
    fn drop(&mut self) {
        self.remove_scratch();
    }
}
