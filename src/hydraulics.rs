//! Hydraulic state supply.
//!
//! The quality engine does not solve hydraulics. Demands, heads and flows
//! arrive either programmatically through `set_hydraulics` or from a
//! little-endian binary trace file produced by a hydraulic solver, one record
//! per hydraulic period.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::msx_error::{MsxError, Result};

/// One hydraulic period: arrays are 1-based in declaration order, converted
/// into internal units (cfs, feet) on ingestion.
#[derive(Debug, Clone, Default)]
pub struct HydRecord {
    /// Start of the period, seconds.
    pub time: u64,
    pub demands: Vec<f64>,
    pub heads: Vec<f64>,
    pub flows: Vec<f64>,
}

/// Where the hydraulic trace comes from.
#[derive(Debug, Default)]
pub enum Hydraulics {
    /// Nothing supplied yet; stepping reports `HydraulicsUnavailable`.
    #[default]
    None,
    /// A single record injected by the caller, in effect until replaced.
    Injected(HydRecord),
    /// A pre-read trace file.
    Trace { records: Vec<HydRecord>, cursor: usize },
}

fn read_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u16(reader: &mut impl Read) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_f32_vec(reader: &mut impl Read, n: usize, scale: f64) -> std::io::Result<Vec<f64>> {
    let mut out = Vec::with_capacity(n + 1);
    out.push(0.0);
    let mut buf = [0u8; 4];
    for _ in 0..n {
        reader.read_exact(&mut buf)?;
        out.push(f32::from_le_bytes(buf) as f64 * scale);
    }
    Ok(out)
}

impl Hydraulics {
    /// Reads a complete hydraulic trace.
    ///
    /// Record layout: `time:u32`, `n_status:u16`, `demands[n_nodes]:f32`,
    /// `heads[n_nodes]:f32`, `flows[n_links]:f32`, then `n_status` link
    /// status/setting pairs (`u16` + `f32`), which quality transport does not
    /// consume. `flow_ucf` converts flows and demands to cfs.
    pub fn read_trace(
        path: &Path,
        n_nodes: usize,
        n_links: usize,
        dur: u64,
        flow_ucf: f64,
    ) -> Result<Hydraulics> {
        let file = File::open(path).map_err(|_| MsxError::HydraulicsUnavailable)?;
        let mut reader = BufReader::new(file);
        let mut records: Vec<HydRecord> = Vec::new();
        loop {
            let time = match read_u32(&mut reader) {
                Ok(t) => t as u64,
                // clean end of file between records
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(_) => return Err(MsxError::HydraulicsRead),
            };
            let body = (|| -> std::io::Result<HydRecord> {
                let n_status = read_u16(&mut reader)? as usize;
                let demands = read_f32_vec(&mut reader, n_nodes, flow_ucf)?;
                let heads = read_f32_vec(&mut reader, n_nodes, 1.0)?;
                let flows = read_f32_vec(&mut reader, n_links, flow_ucf)?;
                for _ in 0..n_status {
                    read_u16(&mut reader)?;
                    let mut buf = [0u8; 4];
                    reader.read_exact(&mut buf)?;
                }
                Ok(HydRecord {
                    time,
                    demands,
                    heads,
                    flows,
                })
            })();
            let record = body.map_err(|_| MsxError::HydraulicsRead)?;
            if let Some(last) = records.last() {
                if record.time <= last.time {
                    return Err(MsxError::HydraulicsRead);
                }
            }
            records.push(record);
        }
        match records.first() {
            Some(first) if first.time == 0 => {}
            _ => return Err(MsxError::HydraulicsRead),
        }
        // the trace must cover the declared duration: every period boundary
        // recorded lies inside it
        if records.last().map(|r| r.time).unwrap_or(0) >= dur && dur > 0 {
            return Err(MsxError::HydraulicsRead);
        }
        Ok(Hydraulics::Trace {
            records,
            cursor: 0,
        })
    }

    /// The record in effect, if any hydraulics were supplied.
    pub fn current(&self) -> Result<&HydRecord> {
        match self {
            Hydraulics::None => Err(MsxError::HydraulicsUnavailable),
            Hydraulics::Injected(record) => Ok(record),
            Hydraulics::Trace { records, cursor } => {
                records.get(*cursor).ok_or(MsxError::HydraulicsUnavailable)
            }
        }
    }

    /// Moves the cursor so the current record covers time `t`.
    /// Returns true when the period changed.
    pub fn advance(&mut self, t: u64) -> bool {
        match self {
            Hydraulics::Trace { records, cursor } => {
                let mut moved = false;
                while *cursor + 1 < records.len() && records[*cursor + 1].time <= t {
                    *cursor += 1;
                    moved = true;
                }
                moved
            }
            _ => false,
        }
    }

    /// Time of the next hydraulic period boundary at or after `t`, or `dur`
    /// when the current period runs to the end.
    pub fn next_event(&self, t: u64, dur: u64) -> u64 {
        match self {
            Hydraulics::Trace { records, cursor } => records
                .get(*cursor + 1)
                .map(|r| r.time)
                .filter(|&bt| bt > t)
                .unwrap_or(dur)
                .min(dur),
            _ => dur,
        }
    }

    /// Restarts a trace from its first record.
    pub fn rewind(&mut self) {
        if let Hydraulics::Trace { cursor, .. } = self {
            *cursor = 0;
        }
    }
}
