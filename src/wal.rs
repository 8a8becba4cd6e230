use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::limits::MAX_WAL_RECORD_LEN;
use crate::model::Event;

/// Frame one event as `[u32 len][bincode payload][u32 crc32]`, little-endian.
fn write_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record larger than 4 GiB"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

enum Record {
    /// A decoded event and the number of bytes its frame took.
    Event(Event, u64),
    /// Clean end of file, a torn tail, or a record that fails its checksum.
    End,
}

fn read_exact_or_end(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_record(reader: &mut impl Read) -> io::Result<Record> {
    let mut word = [0u8; 4];
    if !read_exact_or_end(reader, &mut word)? {
        return Ok(Record::End);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_WAL_RECORD_LEN {
        return Ok(Record::End);
    }
    let mut payload = vec![0u8; len];
    if !read_exact_or_end(reader, &mut payload)? {
        return Ok(Record::End);
    }
    if !read_exact_or_end(reader, &mut word)? {
        return Ok(Record::End);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(Record::End);
    }
    let framed = (len + 8) as u64;
    Ok(bincode::deserialize::<Event>(&payload).map_or(Record::End, |e| Record::Event(e, framed)))
}

/// Append-only write-ahead log of appointment events.
///
/// A crash mid-append leaves at most one torn record at the tail; replay
/// stops there and everything before it is kept. `recover` cuts the tail
/// off so later appends follow the last intact record.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length after the last successful `flush_sync`.
    durable_len: u64,
    #[cfg(test)]
    fail_on_append: Option<u64>,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let durable_len = file.metadata()?.len();
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            durable_len,
            #[cfg(test)]
            fail_on_append: None,
        })
    }

    /// Make the `n`th following append (0 = the next one) fail.
    #[cfg(test)]
    pub fn fail_on_append(&mut self, n: u64) {
        self.fail_on_append = Some(n);
    }

    /// Append and fsync one event. The writer task batches instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    #[cfg(test)]
    fn injected_failure(&mut self) -> io::Result<()> {
        match self.fail_on_append {
            Some(0) => {
                self.fail_on_append = None;
                Err(io::Error::other("injected append failure"))
            }
            Some(n) => {
                self.fail_on_append = Some(n - 1);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Buffer an event without syncing; `flush_sync` makes the batch durable.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        #[cfg(test)]
        self.injected_failure()?;
        write_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.durable_len = self.writer.get_ref().metadata()?.len();
        Ok(())
    }

    /// Drop everything written since the last `flush_sync`: the unflushed
    /// buffer is discarded and any bytes that already reached the file are
    /// truncated away.
    pub fn rollback(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let (_, _discarded) = std::mem::replace(&mut self.writer, BufWriter::new(file)).into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.durable_len)?;
        file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn snapshot_path(path: &Path) -> PathBuf {
        path.with_extension("wal.snapshot")
    }

    /// Write a snapshot next to the log and fsync it. Does not touch the live log.
    pub fn write_snapshot(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::snapshot_path(path))?);
        for event in events {
            write_record(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the live log and reopen for appends.
    pub fn install_snapshot(&mut self) -> io::Result<()> {
        fs::rename(Self::snapshot_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Read back every intact event. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(Self::scan(path)?.0)
    }

    /// Replay, then truncate the file to its intact prefix and fsync, so a
    /// torn tail cannot hide records appended after this point.
    pub fn recover(path: &Path) -> io::Result<Vec<Event>> {
        let (events, intact_len) = Self::scan(path)?;
        match OpenOptions::new().write(true).open(path) {
            Ok(file) => {
                let len = file.metadata()?.len();
                if len > intact_len {
                    warn!(
                        "{}: dropping {} bytes of torn or corrupt tail",
                        path.display(),
                        len - intact_len
                    );
                    file.set_len(intact_len)?;
                    file.sync_all()?;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(events)
    }

    /// Intact events plus the byte length they cover.
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut intact_len = 0;
        while let Record::Event(event, framed) = read_record(&mut reader)? {
            events.push(event);
            intact_len += framed;
        }
        Ok((events, intact_len))
    }
}
