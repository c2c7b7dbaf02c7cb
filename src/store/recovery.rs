//! Store Recovery
//!
//! Replays a backing file from offset 0. The file is its own log: every
//! intact record is reported in order until the first record that is short or
//! fails validation.
//!
//! What happens next depends on what follows the damaged record:
//! - nothing intact: it is the torn tail of a crash mid-append and is cut off
//! - another intact record: committed data was damaged in place; recovery
//!   fails with `CorruptRecord` and the file is left untouched

use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use super::FileStore;
use crate::codec::{
    decode_record, RecordHeader, RecordKind, CRC_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    PAYLOAD_LEN_SIZE, RECORD_MAGIC,
};
use crate::error::{Result, ZelosError};

/// Location and identity of one intact record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedRecord {
    pub offset: u64,
    pub length: u32,
    pub kind: RecordKind,
    pub sequence: u64,
    pub key: String,
}

impl ScannedRecord {
    pub fn is_tombstone(&self) -> bool {
        self.kind == RecordKind::Tombstone
    }
}

/// Where and why scanning stopped early
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamagedRecord {
    pub offset: u64,
    pub reason: String,
}

/// Sequential reader over the records of a backing file
pub struct RecordScanner<R> {
    reader: R,
    /// End of the last intact record
    position: u64,
    damaged: Option<DamagedRecord>,
    done: bool,
}

impl<R: Read> RecordScanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            position: 0,
            damaged: None,
            done: false,
        }
    }

    /// Bytes covered by intact records so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Set once scanning hit an incomplete or invalid record
    pub fn damaged(&self) -> Option<&DamagedRecord> {
        self.damaged.as_ref()
    }

    /// Read the next record
    ///
    /// Returns `Ok(None)` at a clean end of file or at a damaged record. Only
    /// real I/O failures are errors.
    fn read_next(&mut self) -> Result<Option<ScannedRecord>> {
        let start = self.position;

        let mut buf = vec![0u8; HEADER_SIZE];
        let got = read_up_to(&mut self.reader, &mut buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return self.stop(start, "incomplete header");
        }

        let header = match RecordHeader::parse(&buf) {
            Ok(header) => header,
            Err(e) => return self.stop(start, e.to_string()),
        };

        // Key and payload length
        buf.resize(HEADER_SIZE + header.key_len + PAYLOAD_LEN_SIZE, 0);
        if !self.fill(&mut buf[HEADER_SIZE..])? {
            return self.stop(start, "incomplete key");
        }

        let mut len_bytes = [0u8; PAYLOAD_LEN_SIZE];
        len_bytes.copy_from_slice(&buf[HEADER_SIZE + header.key_len..]);
        let payload_len = u32::from_le_bytes(len_bytes);
        if payload_len > MAX_PAYLOAD_SIZE {
            return self.stop(start, format!("payload length {} exceeds maximum", payload_len));
        }

        // Payload and checksum
        let prefix_len = buf.len();
        buf.resize(prefix_len + payload_len as usize + CRC_SIZE, 0);
        if !self.fill(&mut buf[prefix_len..])? {
            return self.stop(start, "incomplete payload");
        }

        let record = match decode_record(&buf) {
            Ok(record) => record,
            Err(e) => return self.stop(start, e.to_string()),
        };

        self.position += buf.len() as u64;

        Ok(Some(ScannedRecord {
            offset: start,
            length: buf.len() as u32,
            kind: record.kind,
            sequence: record.sequence,
            key: record.key,
        }))
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<bool> {
        Ok(read_up_to(&mut self.reader, buf)? == buf.len())
    }

    fn stop(&mut self, offset: u64, reason: impl Into<String>) -> Result<Option<ScannedRecord>> {
        self.damaged = Some(DamagedRecord {
            offset,
            reason: reason.into(),
        });
        Ok(None)
    }
}

impl<R: Read> Iterator for RecordScanner<R> {
    type Item = Result<ScannedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Result of a recovery pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of intact records replayed
    pub records_recovered: u64,

    /// Bytes of the torn tail past the last intact record
    pub bytes_discarded: u64,

    /// Highest sequence number seen (0 for an empty file)
    pub last_sequence: u64,

    /// Whether the file was cut back to its intact prefix
    pub was_truncated: bool,

    /// Length of the intact prefix
    pub valid_len: u64,

    /// Damaged record at the end of the file, if any
    pub torn_tail: Option<DamagedRecord>,

    /// Damaged record with intact records after it, if any
    pub corruption: Option<DamagedRecord>,
}

/// Replays backing files
pub struct StoreRecovery;

impl StoreRecovery {
    /// Recover records from the file behind `store`
    ///
    /// This will:
    /// 1. Read all intact records in offset order
    /// 2. Stop at the first incomplete or invalid record
    /// 3. Fail with `CorruptRecord` if an intact record follows it
    /// 4. Otherwise truncate the torn tail
    /// 5. Return the intact records in order
    pub fn recover(store: &FileStore) -> Result<(Vec<ScannedRecord>, RecoveryReport)> {
        let (records, mut report) = Self::scan(store.path())?;

        if let Some(damage) = &report.corruption {
            tracing::error!(
                path = %store.path().display(),
                offset = damage.offset,
                reason = %damage.reason,
                "Damaged record followed by intact records; refusing to recover"
            );
            return Err(ZelosError::corrupt(damage.offset, damage.reason.clone()));
        }

        if report.bytes_discarded > 0 {
            store.truncate(report.valid_len)?;
            report.was_truncated = true;

            tracing::warn!(
                path = %store.path().display(),
                valid_len = report.valid_len,
                discarded = report.bytes_discarded,
                reason = report.torn_tail.as_ref().map(|t| t.reason.as_str()).unwrap_or(""),
                "Truncated torn tail during recovery"
            );
        }

        Ok((records, report))
    }

    /// Verify integrity of a backing file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryReport> {
        let (_, report) = Self::scan(path)?;
        Ok(report)
    }

    fn scan(path: &Path) -> Result<(Vec<ScannedRecord>, RecoveryReport)> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok((Vec::new(), RecoveryReport::empty()));
            }
            Err(e) => return Err(e.into()),
        };
        let file_len = file.metadata()?.len();

        let mut scanner = RecordScanner::new(BufReader::new(file));
        let mut records = Vec::new();
        let mut last_sequence = 0;

        for record in scanner.by_ref() {
            let record = record?;
            last_sequence = last_sequence.max(record.sequence);
            records.push(record);
        }

        let valid_len = scanner.position();
        let damaged = scanner.damaged().cloned();

        let mut report = RecoveryReport {
            records_recovered: records.len() as u64,
            bytes_discarded: file_len.saturating_sub(valid_len),
            last_sequence,
            was_truncated: false,
            valid_len,
            torn_tail: None,
            corruption: None,
        };

        if let Some(damage) = damaged {
            let mut file = scanner.into_inner().into_inner();
            if intact_record_after(&mut file, damage.offset)?.is_some() {
                report.bytes_discarded = 0;
                report.corruption = Some(damage);
            } else {
                report.torn_tail = Some(damage);
            }
        }

        Ok((records, report))
    }
}

impl<R> RecordScanner<R> {
    /// Give back the underlying reader
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Offset of the first intact record starting after `damaged_at`, if any
///
/// Every byte position holding the record magic is tried as a frame start;
/// only a frame that decodes with a matching checksum counts.
fn intact_record_after(file: &mut File, damaged_at: u64) -> Result<Option<u64>> {
    let from = damaged_at + 1;
    file.seek(SeekFrom::Start(from))?;

    let mut rest = Vec::new();
    file.read_to_end(&mut rest)?;

    let found = rest
        .iter()
        .enumerate()
        .filter(|(_, byte)| **byte == RECORD_MAGIC)
        .map(|(start, _)| start)
        .find(|&start| {
            frame_len(&rest[start..])
                .map_or(false, |len| decode_record(&rest[start..start + len]).is_ok())
        });

    Ok(found.map(|start| from + start as u64))
}

/// Length of the record framed at the start of `bytes`, if it fits
fn frame_len(bytes: &[u8]) -> Option<usize> {
    let header = RecordHeader::parse(bytes).ok()?;

    let len_at = HEADER_SIZE + header.key_len;
    let len_bytes = bytes.get(len_at..len_at + PAYLOAD_LEN_SIZE)?;
    let payload_len = u32::from_le_bytes(len_bytes.try_into().ok()?);
    if payload_len > MAX_PAYLOAD_SIZE {
        return None;
    }

    let len = len_at + PAYLOAD_LEN_SIZE + payload_len as usize + CRC_SIZE;
    (len <= bytes.len()).then_some(len)
}

impl RecoveryReport {
    fn empty() -> Self {
        Self {
            records_recovered: 0,
            bytes_discarded: 0,
            last_sequence: 0,
            was_truncated: false,
            valid_len: 0,
            torn_tail: None,
            corruption: None,
        }
    }
}

/// Read until `buf` is full or the reader is exhausted
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
