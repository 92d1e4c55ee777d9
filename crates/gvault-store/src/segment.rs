use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use gvault_manifest::Locator;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::record::{Record, RecordFault, RecordHeader, HEADER_LEN, MAGIC};
use crate::retry::RetryPolicy;

/// Append-only file of payload records for one kind family.
///
/// Records are written through a buffered writer that is flushed after every
/// append, so reads through a separate handle always see complete records.
/// Durability needs an explicit [`sync`](Self::sync).
pub struct PayloadSegment {
    path: PathBuf,
    writer: BufWriter<File>,
    len: u64,
    retry: RetryPolicy,
}

/// Result of scanning a segment front to back.
#[derive(Debug, Default)]
pub struct SegmentScan {
    /// Records that passed header and checksum validation, with their position.
    pub records: Vec<(Locator, Record)>,
    /// Records skipped because their checksum or header fields were invalid.
    pub faults: Vec<(u64, RecordFault)>,
    /// Offset where scanning stopped early on a torn or unreadable tail.
    pub truncated_at: Option<u64>,
}

impl PayloadSegment {
    /// Create an empty segment, replacing any existing file.
    pub fn create(path: &Path, retry: RetryPolicy) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        File::create(path)?;
        Self::open(path, retry)
    }

    /// Open an existing segment for appending.
    pub fn open(path: &Path, retry: RetryPolicy) -> io::Result<Self> {
        let file = retry.run(|| OpenOptions::new().read(true).append(true).open(path))?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            len,
            retry,
        })
    }

    /// Append one encoded record. Returns where it landed.
    pub fn append(&mut self, record: &[u8]) -> io::Result<Locator> {
        let offset = self.len;
        self.writer.write_all(record)?;
        self.writer.flush()?;
        self.len += record.len() as u64;
        debug!(path = %self.path.display(), offset, len = record.len(), "segment append");
        Ok(Locator {
            offset,
            length: record.len() as u64,
        })
    }

    /// Read the raw bytes of one record.
    pub fn read(&self, locator: &Locator) -> io::Result<Vec<u8>> {
        if locator.end() > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "record at {}..{} lies past segment end {}",
                    locator.offset,
                    locator.end(),
                    self.len
                ),
            ));
        }
        self.retry.run(|| {
            let mut file = File::open(&self.path)?;
            file.seek(SeekFrom::Start(locator.offset))?;
            let mut buf = vec![0u8; locator.length as usize];
            file.read_exact(&mut buf)?;
            Ok(buf)
        })
    }

    /// Flush buffers and, when `fsync` is set, force data to stable storage.
    pub fn sync(&mut self, fsync: bool) -> io::Result<()> {
        self.writer.flush()?;
        if fsync {
            let file = self.writer.get_ref();
            self.retry.run(|| file.sync_data())?;
        }
        Ok(())
    }

    /// Cut the segment back to `len` bytes.
    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Current length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record front to back.
    ///
    /// A record that fails validation is skipped up to the next offset where
    /// a complete record with a valid checksum starts, and the skipped range
    /// is reported as a fault. Only when nothing valid follows is the rest
    /// reported as a torn tail.
    pub fn scan(&self) -> io::Result<SegmentScan> {
        let data = self.retry.run(|| fs::read(&self.path))?;
        let mut scan = SegmentScan::default();
        let mut offset = 0usize;

        while offset < data.len() {
            let fault = match decode_at(&data, offset) {
                Ok(record) => {
                    let length = record.header.record_len();
                    scan.records.push((
                        Locator {
                            offset: offset as u64,
                            length: length as u64,
                        },
                        record,
                    ));
                    offset += length;
                    continue;
                }
                Err(fault) => fault,
            };

            // Where the damaged record claims to end, if its header is
            // readable and the claim fits in the file.
            let claimed_end = header_at(&data, offset)
                .ok()
                .map(|header| offset + header.record_len())
                .filter(|end| *end <= data.len());

            match next_record(&data, offset + 1) {
                Some(next) if Some(next) == claimed_end => {
                    warn!(path = %self.path.display(), offset, %fault, "corrupt record; skipping");
                    scan.faults.push((offset as u64, fault));
                    offset = next;
                }
                Some(next) => {
                    let len = (next - offset) as u64;
                    warn!(
                        path = %self.path.display(),
                        offset,
                        len,
                        %fault,
                        "unreadable bytes; resuming at next valid record"
                    );
                    scan.faults.push((
                        offset as u64,
                        RecordFault::Unreadable {
                            len,
                            cause: Box::new(fault),
                        },
                    ));
                    offset = next;
                }
                None if claimed_end == Some(data.len()) => {
                    warn!(path = %self.path.display(), offset, %fault, "corrupt final record");
                    scan.faults.push((offset as u64, fault));
                    break;
                }
                None => {
                    warn!(
                        path = %self.path.display(),
                        offset,
                        %fault,
                        "no valid record past this point; torn tail"
                    );
                    scan.truncated_at = Some(offset as u64);
                    break;
                }
            }
        }

        debug!(
            path = %self.path.display(),
            records = scan.records.len(),
            faults = scan.faults.len(),
            "segment scan complete"
        );
        Ok(scan)
    }
}

fn header_at(data: &[u8], offset: usize) -> Result<RecordHeader, RecordFault> {
    let Some(bytes) = data.get(offset..offset + HEADER_LEN) else {
        return Err(RecordFault::LengthMismatch {
            expected: HEADER_LEN,
            actual: data.len().saturating_sub(offset),
        });
    };
    let mut header = [0u8; HEADER_LEN];
    header.copy_from_slice(bytes);
    RecordHeader::parse(&header)
}

/// Decode the record starting at `offset`, checksum included.
fn decode_at(data: &[u8], offset: usize) -> Result<Record, RecordFault> {
    let header = header_at(data, offset)?;
    let end = offset + header.record_len();
    if end > data.len() {
        return Err(RecordFault::LengthMismatch {
            expected: header.record_len(),
            actual: data.len() - offset,
        });
    }
    Record::decode(&data[offset..end])
}

/// First offset at or after `from` holding a complete, valid record.
fn next_record(data: &[u8], from: usize) -> Option<usize> {
    let last = data.len().checked_sub(HEADER_LEN)?;
    (from..=last).find(|&at| data[at..].starts_with(MAGIC) && decode_at(data, at).is_ok())
}

/// Builds a replacement segment next to the original.
///
/// Dropping the rewriter without committing deletes the temporary file and
/// leaves the original untouched.
pub struct SegmentRewriter {
    tmp: BufWriter<NamedTempFile>,
    len: u64,
}

impl SegmentRewriter {
    /// Start a rewrite in the directory of `target`.
    pub fn new(target: &Path) -> io::Result<Self> {
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Ok(Self {
            tmp: BufWriter::new(NamedTempFile::new_in(dir)?),
            len: 0,
        })
    }

    pub fn append(&mut self, record: &[u8]) -> io::Result<Locator> {
        let offset = self.len;
        self.tmp.write_all(record)?;
        self.len += record.len() as u64;
        Ok(Locator {
            offset,
            length: record.len() as u64,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sync the replacement and rename it over `target`, then reopen it.
    pub fn commit(self, target: &Path, retry: RetryPolicy) -> io::Result<PayloadSegment> {
        let tmp = self.tmp.into_inner().map_err(|e| e.into_error())?;
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| e.error)?;
        PayloadSegment::open(target, retry)
    }
}
