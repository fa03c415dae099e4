//! Append-only event log backing the engine.
//!
//! Each frame is `[u32 len][bincode Event][u32 crc32]`, little-endian, and
//! holds one committed unit of work: a whole rank transaction, or a rule with
//! its full occurrence series. Replay therefore never sees half of one.
//!
//! The file never keeps bytes of a batch that was reported as failed: a
//! failed write or sync truncates back to the last durable length, and
//! opening the log cuts off a torn tail left by a crash. Later appends always
//! land directly after the last good frame.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

const LEN_BYTES: u64 = 4;
const CRC_BYTES: u64 = 4;

fn invalid_data(msg: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

/// Serialize `event` as one frame onto the end of `out`. On error `out` is
/// left untouched.
fn push_frame(out: &mut Vec<u8>, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(invalid_data)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| invalid_data("event too large for one frame"))?;
    out.reserve(payload.len() + (LEN_BYTES + CRC_BYTES) as usize);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(&payload);
    out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(())
}

/// Fill `buf`, or report `false` if the input ends first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact frame and its size on disk. `None` at the end of the log or
/// at the first torn or corrupt frame.
fn read_frame(reader: &mut impl Read, path: &Path) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; LEN_BYTES as usize];
    if !read_full(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u64::from(u32::from_le_bytes(len_buf));

    // A corrupt length must not turn into a huge allocation.
    let mut payload = Vec::new();
    reader.by_ref().take(len).read_to_end(&mut payload)?;
    if (payload.len() as u64) < len {
        return Ok(None);
    }

    let mut crc_buf = [0u8; CRC_BYTES as usize];
    if !read_full(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        tracing::warn!("WAL {}: CRC mismatch, dropping tail", path.display());
        return Ok(None);
    }

    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Some((event, LEN_BYTES + len + CRC_BYTES))),
        Err(e) => {
            tracing::warn!("WAL {}: undecodable frame ({e}), dropping tail", path.display());
            Ok(None)
        }
    }
}

/// Every intact event in the log and the byte length they cover.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut valid_len = 0;
    while let Some((event, size)) = read_frame(&mut reader, path)? {
        events.push(event);
        valid_len += size;
    }
    Ok((events, valid_len))
}

pub struct Wal {
    file: File,
    path: PathBuf,
    /// Length of the fsynced prefix. Anything past it belongs to a failed batch.
    durable_len: u64,
    staged: Vec<u8>,
    staged_events: u64,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path` and return the events it holds.
    /// A torn or corrupt tail is truncated away.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, valid_len) = scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        let mut wal = Self {
            file,
            path: path.to_path_buf(),
            durable_len: on_disk,
            staged: Vec::new(),
            staged_events: 0,
            appends_since_compact: 0,
        };
        if on_disk > valid_len {
            tracing::warn!(
                "WAL {}: truncating {} bytes after the last intact frame",
                path.display(),
                on_disk - valid_len
            );
            wal.truncate_to(valid_len)?;
        }
        Ok((wal, events))
    }

    /// Events currently in the log at `path`. Missing file means empty.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Add `event` to the pending batch. Nothing reaches the file until
    /// [`Wal::commit_staged`].
    pub fn stage(&mut self, event: &Event) -> io::Result<()> {
        push_frame(&mut self.staged, event)?;
        self.staged_events += 1;
        Ok(())
    }

    /// Drop the pending batch without writing it.
    pub fn discard_staged(&mut self) {
        self.staged.clear();
        self.staged_events = 0;
    }

    /// Write and fsync the pending batch.
    ///
    /// On failure the file is cut back to its last durable length, so a
    /// batch reported as failed can never resurface on replay.
    pub fn commit_staged(&mut self) -> io::Result<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.staged);
        let events = std::mem::take(&mut self.staged_events);

        let result = self
            .file
            .write_all(&batch)
            .and_then(|()| self.file.sync_all());
        match result {
            Ok(()) => {
                self.durable_len += batch.len() as u64;
                self.appends_since_compact += events;
                Ok(())
            }
            Err(e) => {
                let durable = self.durable_len;
                if let Err(undo) = self.truncate_to(durable) {
                    tracing::error!(
                        "WAL {}: rollback after failed write also failed: {undo}",
                        self.path.display()
                    );
                }
                Err(e)
            }
        }
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.file.sync_all()?;
        self.durable_len = len;
        Ok(())
    }

    /// Replace the whole log with `events`.
    ///
    /// The new content is written and fsynced under a temporary name first,
    /// then renamed over the log, so a crash leaves either the old or the new
    /// file intact.
    pub fn rewrite(&mut self, events: &[Event]) -> io::Result<()> {
        let mut buf = Vec::new();
        for event in events {
            push_frame(&mut buf, event)?;
        }
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&buf)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        self.file = OpenOptions::new().append(true).open(&self.path)?;
        self.durable_len = buf.len() as u64;
        self.discard_staged();
        self.appends_since_compact = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RankOp, RankedItem, RankedKind};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("rosterd_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn created(name: &str) -> Event {
        Event::RanksCommitted {
            kind: RankedKind::Group,
            ops: vec![RankOp::Created(RankedItem {
                id: Ulid::new(),
                kind: RankedKind::Group,
                name: name.into(),
                rank: 1,
                visible: true,
            })],
        }
    }

    fn commit(wal: &mut Wal, events: &[Event]) {
        for e in events {
            wal.stage(e).unwrap();
        }
        wal.commit_staged().unwrap();
    }

    fn append_raw(path: &Path, bytes: &[u8]) {
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        f.write_all(bytes).unwrap();
    }

    #[test]
    fn committed_batch_replays_in_order() {
        let path = tmp_path("batch.wal");
        let events = vec![created("Juniors"), Event::ScheduleDeleted { id: Ulid::new() }];
        {
            let (mut wal, replayed) = Wal::recover(&path).unwrap();
            assert!(replayed.is_empty());
            commit(&mut wal, &events);
            assert_eq!(wal.appends_since_compact(), 2);
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn staged_events_are_invisible_until_committed() {
        let path = tmp_path("staged.wal");
        let (mut wal, _) = Wal::recover(&path).unwrap();
        wal.stage(&created("A")).unwrap();
        assert!(Wal::replay(&path).unwrap().is_empty());
        assert_eq!(wal.appends_since_compact(), 0);

        wal.discard_staged();
        wal.commit_staged().unwrap();
        assert!(Wal::replay(&path).unwrap().is_empty());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn rollback_removes_failed_batch_bytes() {
        let path = tmp_path("rollback.wal");
        let first = created("Adults");
        let later = created("Kids");

        let (mut wal, _) = Wal::recover(&path).unwrap();
        commit(&mut wal, std::slice::from_ref(&first));

        // Half a frame reached the file before the write failed.
        let mut torn = Vec::new();
        push_frame(&mut torn, &created("lost")).unwrap();
        append_raw(&path, &torn[..torn.len() / 2]);
        let durable = wal.durable_len;
        wal.truncate_to(durable).unwrap();

        commit(&mut wal, std::slice::from_ref(&later));
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, later]);
    }

    #[test]
    fn recover_cuts_torn_tail_so_later_appends_survive() {
        let path = tmp_path("torn_tail.wal");
        let first = created("Seniors");
        let later = created("Minis");
        {
            let (mut wal, _) = Wal::recover(&path).unwrap();
            commit(&mut wal, std::slice::from_ref(&first));
        }
        append_raw(&path, &[7u8; 6]);

        {
            let (mut wal, replayed) = Wal::recover(&path).unwrap();
            assert_eq!(replayed, vec![first.clone()]);
            commit(&mut wal, std::slice::from_ref(&later));
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, later]);
    }

    #[test]
    fn corrupt_crc_ends_replay() {
        let path = tmp_path("corrupt_crc.wal");
        let mut frame = Vec::new();
        push_frame(&mut frame, &Event::ScheduleDeleted { id: Ulid::new() }).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        File::create(&path).unwrap().write_all(&frame).unwrap();

        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn huge_length_prefix_is_treated_as_torn() {
        let path = tmp_path("huge_len.wal");
        File::create(&path)
            .unwrap()
            .write_all(&u32::MAX.to_le_bytes())
            .unwrap();
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn missing_file_replays_empty() {
        let path = tmp_path("nonexistent.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn rewrite_then_append() {
        let path = tmp_path("rewrite.wal");
        let keep = created("Adults");
        let next = created("Kids");
        {
            let (mut wal, _) = Wal::recover(&path).unwrap();
            for _ in 0..10 {
                commit(&mut wal, &[created("churn")]);
            }
            wal.rewrite(std::slice::from_ref(&keep)).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            commit(&mut wal, std::slice::from_ref(&next));
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![keep, next]);
        assert!(!path.with_extension("wal.tmp").exists());
    }
}
