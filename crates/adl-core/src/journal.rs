//! Append-only event journal for off-chain indexers.
//!
//! Every emitted event becomes one JSON line. Records are hash-chained: each carries the hash
//! of its predecessor, and its own hash covers the predecessor hash, its sequence number, the
//! emitting contract, and the event payload under a fixed domain tag. An indexer can replay
//! the file and detect any dropped, reordered, or edited line with [`verify_journal`].

use crate::events::{Event, EventSink};
use crate::{AdlError, Address, Hash32, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

pub const EVENT_JOURNAL_RECORD_DOMAIN_V1: &[u8] = b"ADL_EVENT_JOURNAL_RECORD_V1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecordV1 {
    pub record_version: u32,
    pub sequence: u64,
    pub prev_record_hash: Hash32,
    pub record_hash: Hash32,
    pub contract: Address,
    pub event: Event,
}

fn sha256(data: &[u8]) -> Hash32 {
    Hash32(Sha256::digest(data).into())
}

pub fn record_hash_v1(
    prev_record_hash: &Hash32,
    sequence: u64,
    contract: &Address,
    event: &Event,
) -> Result<Hash32> {
    let payload = serde_json::to_vec(event)
        .map_err(|e| AdlError::JournalError(format!("failed to encode event: {e}")))?;

    let mut bytes = Vec::with_capacity(128);
    bytes.extend_from_slice(EVENT_JOURNAL_RECORD_DOMAIN_V1);
    bytes.extend_from_slice(&1u32.to_le_bytes());
    bytes.extend_from_slice(&sequence.to_le_bytes());
    bytes.extend_from_slice(&prev_record_hash.0);
    bytes.extend_from_slice(&contract.0);
    bytes.extend_from_slice(&sha256(&payload).0);
    Ok(sha256(&bytes))
}

/// Position of the chain after the last record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JournalHead {
    pub records: u64,
    pub last_record_hash: Hash32,
}

impl JournalHead {
    const GENESIS: JournalHead = JournalHead {
        records: 0,
        last_record_hash: Hash32::ZERO,
    };
}

/// Replay a journal file and check every link of the hash chain.
///
/// A missing file is an empty journal.
pub fn verify_journal(path: &Path) -> Result<JournalHead> {
    if !path.exists() {
        return Ok(JournalHead::GENESIS);
    }
    let file = fs::File::open(path)
        .map_err(|e| AdlError::JournalError(format!("failed to open journal: {e}")))?;

    let mut head = JournalHead::GENESIS;
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line =
            line.map_err(|e| AdlError::JournalError(format!("failed to read journal: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: JournalRecordV1 = serde_json::from_str(&line).map_err(|e| {
            AdlError::JournalError(format!("line {}: malformed record: {e}", index + 1))
        })?;

        if record.record_version != 1 {
            return Err(AdlError::JournalError(format!(
                "line {}: unsupported record version {}",
                index + 1,
                record.record_version
            )));
        }
        if record.sequence != head.records {
            return Err(AdlError::JournalError(format!(
                "line {}: expected sequence {}, found {}",
                index + 1,
                head.records,
                record.sequence
            )));
        }
        if record.prev_record_hash != head.last_record_hash {
            return Err(AdlError::JournalError(format!(
                "line {}: broken chain link",
                index + 1
            )));
        }
        let expected = record_hash_v1(
            &record.prev_record_hash,
            record.sequence,
            &record.contract,
            &record.event,
        )?;
        if expected != record.record_hash {
            return Err(AdlError::JournalError(format!(
                "line {}: record hash mismatch",
                index + 1
            )));
        }

        head = JournalHead {
            records: head.records + 1,
            last_record_hash: record.record_hash,
        };
    }
    Ok(head)
}

/// Append target of a journal.
trait JournalStorage: Write {
    /// Current length in bytes.
    fn end(&mut self) -> io::Result<u64>;
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl JournalStorage for fs::File {
    fn end(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// Where the writer stands: the chain head, or unusable after a failed rollback.
enum Cursor {
    Ready(JournalHead),
    Poisoned,
}

/// Event sink that appends hash-chained records to a JSONL file.
///
/// A record is written and synced before the emitting component commits. A failed append is
/// truncated away so the file always ends on a whole record; if even that fails the journal
/// refuses further appends until it is reopened.
pub struct FileEventJournal {
    path: PathBuf,
    cursor: Mutex<Cursor>,
}

impl FileEventJournal {
    /// Open `path`, resuming after the last record if the file already holds a valid chain.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let head = verify_journal(&path)?;
        debug!(path = %path.display(), records = head.records, "Event journal opened");
        Ok(Self {
            path,
            cursor: Mutex::new(Cursor::Ready(head)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn head(&self) -> Result<JournalHead> {
        match *self.lock()? {
            Cursor::Ready(head) => Ok(head),
            Cursor::Poisoned => Err(poisoned()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Cursor>> {
        self.cursor
            .lock()
            .map_err(|_| AdlError::JournalError("journal lock poisoned".into()))
    }

    fn append_to(
        &self,
        storage: &mut impl JournalStorage,
        contract: Address,
        event: &Event,
    ) -> Result<()> {
        let mut cursor = self.lock()?;
        let Cursor::Ready(head) = *cursor else {
            return Err(poisoned());
        };

        let record_hash = record_hash_v1(&head.last_record_hash, head.records, &contract, event)?;
        let record = JournalRecordV1 {
            record_version: 1,
            sequence: head.records,
            prev_record_hash: head.last_record_hash,
            record_hash,
            contract,
            event: event.clone(),
        };
        let mut line = serde_json::to_vec(&record)
            .map_err(|e| AdlError::JournalError(format!("failed to serialize record: {e}")))?;
        line.push(b'\n');

        let start = storage
            .end()
            .map_err(|e| AdlError::JournalError(format!("failed to stat journal: {e}")))?;
        if let Err(e) = storage.write_all(&line).and_then(|()| storage.sync()) {
            if let Err(rollback) = storage.truncate(start).and_then(|()| storage.sync()) {
                *cursor = Cursor::Poisoned;
                error!(error = %rollback, path = %self.path.display(), "Journal rollback failed");
                return Err(AdlError::JournalError(format!(
                    "failed to append record ({e}) and to roll it back ({rollback})"
                )));
            }
            warn!(error = %e, sequence = head.records, "Journal append rolled back");
            return Err(AdlError::JournalError(format!("failed to append record: {e}")));
        }

        *cursor = Cursor::Ready(JournalHead {
            records: head.records + 1,
            last_record_hash: record_hash,
        });
        Ok(())
    }
}

fn poisoned() -> AdlError {
    AdlError::JournalError("journal holds a partial record; reopen it to recover".into())
}

impl EventSink for FileEventJournal {
    fn emit(&self, contract: Address, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AdlError::JournalError(format!("failed to open journal: {e}")))?;
        self.append_to(&mut file, contract, event)
    }
}
