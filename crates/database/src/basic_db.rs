use libmdbx::{Database, DatabaseOptions, WriteMap, WriteFlags, TableFlags};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::path::Path;

#[derive(Clone)]
pub struct InnerDatabase {
    db: Arc<Mutex<Database<WriteMap>>>,
}

/// Key/value access shared by every handler. Implementors are cheap to clone
/// and hand out the same underlying environment.
pub trait SafeDatabase: Clone + Send + Sync + 'static {

    fn new<P: AsRef<Path>>(path: P) -> Result<Self, libmdbx::Error> where Self: Sized;

    fn write(&self, key: &str, value: &str, table: &str) -> Result<(), libmdbx::Error>;

    fn read(&self, key: &str, table: &str) -> Result<Option<Vec<u8>>, libmdbx::Error>;

    fn read_all(&self, table: &str) -> Result<HashMap<Vec<u8>, Vec<u8>>, libmdbx::Error>;

    /// Entries whose key starts with `prefix`, in key order.
    fn read_prefix(&self, prefix: &str, table: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, libmdbx::Error>;

    fn batch_write<K, V>(&self, items: &[(K, V)], table: &str) -> Result<(), libmdbx::Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>;

    /// Returns whether the key existed.
    fn delete(&self, key: &str, table: &str) -> Result<bool, libmdbx::Error>;
}

impl InnerDatabase {
    fn lock(&self) -> MutexGuard<'_, Database<WriteMap>> {
        // Uncommitted transactions abort on drop, so a poisoned guard is still consistent.
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SafeDatabase for InnerDatabase{

    fn new<P: AsRef<Path>>(path: P) -> Result<Self, libmdbx::Error> {
        let mut options = DatabaseOptions::default();
        options.max_tables = Some(100);
        let db = Database::<WriteMap>::open_with_options(path, options)?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn write(&self, key: &str, value: &str, table: &str) -> Result<(), libmdbx::Error> {
        let db = self.lock();
        let transaction = db.begin_rw_txn()?;
        let table = transaction.create_table(Some(table), TableFlags::default())?;

        transaction.put(&table, key, value, WriteFlags::default())?;
        transaction.commit()?;
        Ok(())
    }

    fn read(&self, key: &str, table: &str) -> Result<Option<Vec<u8>>, libmdbx::Error> {
        let db = self.lock();
        let transaction = db.begin_ro_txn()?;

        if let Ok(table) = transaction.open_table(Some(table)) {
            let result = transaction.get(&table, key.as_bytes())?;
            return Ok(result);
        }

        Ok(None)
    }

    fn read_all(&self, table: &str) -> Result<HashMap<Vec<u8>, Vec<u8>>, libmdbx::Error> {
        let mut map = HashMap::new();
        let db = self.lock();
        let transaction = db.begin_ro_txn()?;

        if let Ok(table) = transaction.open_table(Some(table)) {
            let cursor = transaction.cursor(&table)?;

            for item in cursor {
                let (key, value) = item?;
                map.insert(key.to_vec(), value.to_vec());
            }
        }

        Ok(map)
    }

    fn read_prefix(&self, prefix: &str, table: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, libmdbx::Error> {
        let mut entries = Vec::new();
        let db = self.lock();
        let transaction = db.begin_ro_txn()?;

        if let Ok(table) = transaction.open_table(Some(table)) {
            let cursor = transaction.cursor(&table)?;

            for item in cursor {
                let (key, value) = item?;
                if key.starts_with(prefix.as_bytes()) {
                    entries.push((key.to_vec(), value.to_vec()));
                }
            }
        }

        Ok(entries)
    }

    fn batch_write<K, V>(&self, items: &[(K, V)], table: &str) -> Result<(), libmdbx::Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let db = self.lock();
        let transaction = db.begin_rw_txn()?;
        let table = transaction.create_table(Some(table), TableFlags::default())?;

        for (key, value) in items {
            transaction.put(&table, key, value, WriteFlags::default())?;
        }

        transaction.commit()?;
        Ok(())
    }

    fn delete(&self, key: &str, table: &str) -> Result<bool, libmdbx::Error> {
        let db = self.lock();
        let transaction = db.begin_rw_txn()?;
        let table = transaction.create_table(Some(table), TableFlags::default())?;

        let existed = transaction.del(&table, key.as_bytes(), None)?;
        transaction.commit()?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        db.write("0xabc", "{\"a\":1}", "users")?;

        assert_eq!(db.read("0xabc", "users")?, Some(b"{\"a\":1}".to_vec()));
        assert_eq!(db.read("0xdef", "users")?, None);
        assert_eq!(db.read("0xabc", "missing_table")?, None);
        Ok(())
    }

    #[test]
    fn test_read_prefix_is_ordered_and_filtered() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        db.batch_write(
            &[("s1_b", "2"), ("s2_a", "x"), ("s1_a", "1"), ("s10_a", "y")],
            "members",
        )?;

        let entries = db.read_prefix("s1_", "members")?;
        let keys: Vec<String> = entries
            .into_iter()
            .map(|(k, _)| String::from_utf8(k).unwrap())
            .collect();

        assert_eq!(keys, vec!["s1_a".to_string(), "s1_b".to_string()]);
        Ok(())
    }

    #[test]
    fn test_delete() -> Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempdir()?;
        let db = InnerDatabase::new(temp_dir.path().join("test_db"))?;

        db.write("k", "v", "votes")?;
        assert!(db.delete("k", "votes")?);
        assert!(!db.delete("k", "votes")?);
        assert_eq!(db.read("k", "votes")?, None);
        assert!(db.read_all("votes")?.is_empty());
        Ok(())
    }
}
