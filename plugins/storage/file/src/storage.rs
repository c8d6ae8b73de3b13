use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use parking_lot::RwLock;

use tally_api::{KeyValueStore, PurchaseRecord, Split, SplitScanner, StorageError, split_key_ranges};

use super::config::{FileStoreConfig, LogLine, LogLineRef, LogRecord};

pub const LOG_FILE_NAME: &str = "purchases.jsonl";

// ════════════════════════════════════════════════════════════════
//  FileStore
// ════════════════════════════════════════════════════════════════

struct LogState {
    file: File,
    /// Bytes of complete lines in the log; the next append starts here.
    len: u64,
    /// key → offset of the newest line for that key.
    index: BTreeMap<Vec<u8>, u64>,
}

pub struct FileStore {
    path: PathBuf,
    keys_per_split: usize,
    sync_writes: bool,
    state: Arc<RwLock<LogState>>,
}

impl FileStore {
    /// Open (or create) the log under `config.data_dir` and rebuild the index.
    ///
    /// A final line without a trailing newline is a torn append from a crash:
    /// it is cut off with a warning. Any other unreadable line is an error.
    pub fn open(config: &FileStoreConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            StorageError::io(format!("mkdir {}: {e}", config.data_dir.display()))
        })?;
        let path = config.data_dir.join(LOG_FILE_NAME);

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::io(format!("open {}: {e}", path.display())))?;

        let (index, len) = replay(&path)?;
        let on_disk = file
            .metadata()
            .map_err(|e| StorageError::io(format!("stat {}: {e}", path.display())))?
            .len();
        if on_disk > len {
            tracing::warn!(
                path = %path.display(),
                torn_bytes = on_disk - len,
                "truncating incomplete final line"
            );
            file.set_len(len)
                .map_err(|e| StorageError::io(format!("truncate {}: {e}", path.display())))?;
        }

        tracing::info!(path = %path.display(), keys = index.len(), bytes = len, "opened purchase log");

        Ok(Self {
            path,
            keys_per_split: config.keys_per_split,
            sync_writes: config.sync_writes,
            state: Arc::new(RwLock::new(LogState { file, len, index })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.state.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().index.is_empty()
    }

    fn serialize_line(key: &[u8], record: &PurchaseRecord) -> Result<Vec<u8>, StorageError> {
        let mut line = serde_json::to_vec(&LogLineRef {
            key: B64.encode(key),
            record,
        })
        .map_err(|e| StorageError::format(format!("json serialize: {e}")))?;
        line.push(b'\n');
        Ok(line)
    }
}

impl KeyValueStore for FileStore {
    fn write(&self, key: &[u8], record: &PurchaseRecord) -> Result<(), StorageError> {
        let line = Self::serialize_line(key, record)?;

        let mut state = self.state.write();
        let offset = state.len;
        let mut appended = state.file.write_all(&line);
        if appended.is_ok() && self.sync_writes {
            appended = state.file.sync_data();
        }

        if let Err(e) = appended {
            // Drop a partial line so the next append starts on a line boundary.
            if let Err(trunc) = state.file.set_len(offset) {
                tracing::error!(path = %self.path.display(), error = %trunc, "failed to roll back partial append");
            }
            return Err(StorageError::io(format!("append {}: {e}", self.path.display())));
        }

        state.len += line.len() as u64;
        state.index.insert(key.to_vec(), offset);
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Result<Option<PurchaseRecord>, StorageError> {
        let offset = self.state.read().index.get(key).copied();
        match offset {
            Some(offset) => read_record_at(&self.path, offset).map(Some),
            None => Ok(None),
        }
    }

    fn list_splits(&self) -> Result<Vec<Split>, StorageError> {
        let state = self.state.read();
        Ok(split_key_ranges(state.index.keys().map(Vec::as_slice), self.keys_per_split))
    }

    fn create_scanner(&self, split: &Split) -> Box<dyn SplitScanner> {
        Box::new(FileScanner {
            state: self.state.clone(),
            path: self.path.clone(),
            split: split.clone(),
            cursor: None,
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  FileScanner
// ════════════════════════════════════════════════════════════════

/// Walks one split of the index in key order, reading each record body from
/// the log. The index lock is released before any file I/O.
struct FileScanner {
    state: Arc<RwLock<LogState>>,
    path: PathBuf,
    split: Split,
    cursor: Option<Vec<u8>>,
}

impl SplitScanner for FileScanner {
    fn initialize(&mut self, split: &Split) -> Result<(), StorageError> {
        self.split = split.clone();
        self.cursor = None;
        Ok(())
    }

    fn next_record(&mut self) -> Result<Option<PurchaseRecord>, StorageError> {
        let next = {
            let Some(bounds) = self.split.remaining(self.cursor.as_deref()) else {
                return Ok(None);
            };
            let state = self.state.read();
            state
                .index
                .range::<[u8], _>(bounds)
                .next()
                .map(|(k, offset)| (k.clone(), *offset))
        };

        let Some((key, offset)) = next else {
            return Ok(None);
        };
        let record = read_record_at(&self.path, offset)?;
        self.cursor = Some(key);
        Ok(Some(record))
    }
}

// ════════════════════════════════════════════════════════════════
//  Helpers
// ════════════════════════════════════════════════════════════════

/// Rebuild the index from the log. Returns the index and the byte length of
/// the complete lines (anything after it is a torn tail).
fn replay(path: &Path) -> Result<(BTreeMap<Vec<u8>, u64>, u64), StorageError> {
    let f = File::open(path).map_err(|e| StorageError::io(format!("open {}: {e}", path.display())))?;
    let mut reader = BufReader::new(f);

    let mut index = BTreeMap::new();
    let mut offset = 0u64;
    let mut line_no = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| StorageError::io(format!("read {}: {e}", path.display())))?;
        if n == 0 || buf.last() != Some(&b'\n') {
            break;
        }
        line_no += 1;

        let line: LogLine = serde_json::from_slice(&buf[..n - 1]).map_err(|e| {
            StorageError::corrupt(format!("parse json: {e}"))
                .with_context(format!("{}:{line_no}", path.display()))
        })?;
        let key = B64.decode(line.key.as_bytes()).map_err(|e| {
            StorageError::corrupt(format!("decode key: {e}"))
                .with_context(format!("{}:{line_no}", path.display()))
        })?;

        index.insert(key, offset);
        offset += n as u64;
    }

    Ok((index, offset))
}

fn read_record_at(path: &Path, offset: u64) -> Result<PurchaseRecord, StorageError> {
    let mut f = File::open(path).map_err(|e| StorageError::io(format!("open {}: {e}", path.display())))?;
    f.seek(SeekFrom::Start(offset))
        .map_err(|e| StorageError::io(format!("seek: {e}")))?;

    let mut buf = Vec::new();
    BufReader::new(f)
        .read_until(b'\n', &mut buf)
        .map_err(|e| StorageError::io(format!("read: {e}")))?;

    let line: LogRecord = serde_json::from_slice(buf.strip_suffix(b"\n").unwrap_or(&buf)).map_err(|e| {
        StorageError::corrupt(format!("parse json: {e}"))
            .with_context(format!("{}@{offset}", path.display()))
    })?;
    Ok(line.record)
}

#[cfg(test)]
mod tests {
    use super::*;

    use tally_api::{ErrorKind, ProductId, records};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> FileStore {
        FileStore::open(&FileStoreConfig::new(dir.path())).unwrap()
    }

    fn purchase(customer: &str, product: &str, quantity: u32) -> PurchaseRecord {
        PurchaseRecord::new(customer, product, quantity, 1_700_000_000_000)
    }

    fn scan_everything(store: &FileStore) -> Vec<PurchaseRecord> {
        let mut out = Vec::new();
        for split in store.list_splits().unwrap() {
            let mut scanner = store.create_scanner(&split);
            out.extend(records(scanner.as_mut()).map(Result::unwrap));
        }
        out
    }

    #[test]
    fn read_after_write() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp);
        let record = purchase("bob", "apple", 3);

        store.write(b"1700000000000bobapple", &record).unwrap();
        assert_eq!(store.read(b"1700000000000bobapple").unwrap(), Some(record));
        assert_eq!(store.read(b"missing").unwrap(), None);
    }

    #[test]
    fn binary_keys_round_trip() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp);
        let key = [0u8, 255, b'\n', 7];
        let record = PurchaseRecord::new("cat", ProductId::Numeric(287), 32, 5);

        store.write(&key, &record).unwrap();
        drop(store);

        let reopened = open(&tmp);
        assert_eq!(reopened.read(&key).unwrap(), Some(record));
    }

    #[test]
    fn reopen_replays_last_write_wins() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open(&tmp);
            store.write(b"a", &purchase("joe", "pear", 1)).unwrap();
            store.write(b"b", &purchase("joe", "banana", 10)).unwrap();
            store.write(b"a", &purchase("joe", "pear", 4)).unwrap();
        }

        let store = open(&tmp);
        assert_eq!(store.len(), 2);
        assert_eq!(store.read(b"a").unwrap().unwrap().quantity(), 4);

        let quantities: Vec<u32> = scan_everything(&store).iter().map(|r| r.quantity()).collect();
        assert_eq!(quantities, vec![4, 10]);
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open(&tmp);
            store.write(b"a", &purchase("bob", "apple", 3)).unwrap();
        }
        let path = tmp.path().join(LOG_FILE_NAME);
        let intact = std::fs::metadata(&path).unwrap().len();
        {
            let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"{\"key\":\"Yg==\",\"rec").unwrap();
        }

        let store = open(&tmp);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), intact);
        assert_eq!(store.len(), 1);

        store.write(b"b", &purchase("kat", "orange", 2)).unwrap();
        drop(store);
        let store = open(&tmp);
        assert_eq!(store.read(b"b").unwrap().unwrap().customer(), "kat");
    }

    #[test]
    fn damaged_line_in_the_middle_is_corruption() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOG_FILE_NAME);
        std::fs::write(&path, "not json\n").unwrap();

        let err = FileStore::open(&FileStoreConfig::new(tmp.path())).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Corrupt);
        assert!(err.message.contains(":1:"), "{}", err.message);
    }

    #[test]
    fn splits_cover_all_keys() {
        let tmp = TempDir::new().unwrap();
        let mut config = FileStoreConfig::new(tmp.path());
        config.keys_per_split = 2;
        let store = FileStore::open(&config).unwrap();

        for i in 0..5 {
            store.write(format!("k{i}").as_bytes(), &purchase("c", "p", i)).unwrap();
        }
        assert_eq!(store.list_splits().unwrap().len(), 3);
        assert_eq!(scan_everything(&store).len(), 5);
    }

    #[test]
    fn scanner_restarts_from_split_start() {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp);
        store.write(b"a", &purchase("a", "p", 1)).unwrap();
        store.write(b"b", &purchase("b", "p", 2)).unwrap();

        let split = Split::full();
        let mut scanner = store.create_scanner(&split);
        assert_eq!(scanner.next_record().unwrap().unwrap().customer(), "a");
        scanner.initialize(&split).unwrap();
        assert_eq!(records(scanner.as_mut()).count(), 2);
    }

    #[test]
    fn sync_writes_option() {
        let tmp = TempDir::new().unwrap();
        let mut config = FileStoreConfig::new(tmp.path().join("nested"));
        config.sync_writes = true;
        let store = FileStore::open(&config).unwrap();
        store.write(b"k", &purchase("bob", "apple", 3)).unwrap();
        assert!(store.path().ends_with(LOG_FILE_NAME));
        assert_eq!(store.len(), 1);
    }
}
