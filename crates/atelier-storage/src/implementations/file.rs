//! File-based storage backend for the fulfillment service.
//!
//! Stores each record as a binary file with a fixed-size header carrying
//! TTL information. Writes go through a temp-file rename so readers never
//! observe a partial record, and all mutations are serialized through a
//! process-wide lock so the atomic operations hold. An exclusive lock file
//! claims the data directory for this process; two services sharing a
//! directory would silently break compare-and-swap.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use fs2::FileExt;
use atelier_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey, ValidationError,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::sync::Mutex;

/// Fixed-size file header for TTL support.
///
/// Binary layout (32 bytes total):
/// - bytes 0-3: magic "ATEL"
/// - bytes 4-5: version (u16, little-endian)
/// - bytes 6-13: expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - bytes 14-31: reserved
#[derive(Debug, Clone)]
struct FileHeader {
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"ATEL";
	const VERSION: u16 = 1;
	const SIZE: usize = 32;

	/// Creates a new header with the given TTL.
	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0 // Permanent storage
		} else {
			now_secs().saturating_add(ttl.as_secs())
		};
		Self { expires_at }
	}

	/// Serializes the header to bytes.
	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&Self::VERSION.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	/// Deserializes a header from bytes.
	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}
		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}
		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);
		Ok(Self {
			expires_at: u64::from_le_bytes(expires_bytes),
		})
	}

	/// Checks if the data has expired.
	fn is_expired(&self) -> bool {
		self.expires_at != 0 && now_secs() >= self.expires_at
	}
}

fn now_secs() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or_default()
		.as_secs()
}

/// TTL configuration for different storage namespaces.
#[derive(Debug, Clone)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Creates TTL config from TOML configuration.
	fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();

		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all() {
				let config_key = format!("ttl_{}", storage_key.as_str());
				if let Some(ttl_value) = table
					.get(&config_key)
					.and_then(|v| v.as_integer())
					.map(|v| v as u64)
				{
					ttls.insert(storage_key, Duration::from_secs(ttl_value));
				}
			}
		}

		Self { ttls }
	}

	/// Gets the TTL for a specific storage namespace.
	fn get_ttl(&self, storage_key: StorageKey) -> Duration {
		self.ttls
			.get(&storage_key)
			.copied()
			.unwrap_or(Duration::ZERO)
	}
}

/// File-based storage implementation.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// TTL configuration for different storage namespaces.
	ttl_config: TtlConfig,
	/// Serializes all mutations; get/exists read without it.
	write_lock: Mutex<()>,
	/// Held for the lifetime of this storage to claim the directory.
	_dir_lock: std::fs::File,
}

impl FileStorage {
	/// Creates a new FileStorage, claiming `base_path` with an exclusive
	/// lock file.
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Result<Self, StorageError> {
		std::fs::create_dir_all(&base_path).map_err(|e| StorageError::Backend(e.to_string()))?;

		let lock_path = base_path.join(".lock");
		let dir_lock = std::fs::OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(&lock_path)
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		dir_lock.try_lock_exclusive().map_err(|_| {
			StorageError::Backend(format!(
				"Storage directory {:?} is locked by another process",
				base_path
			))
		})?;

		Ok(Self {
			base_path,
			ttl_config,
			write_lock: Mutex::new(()),
			_dir_lock: dir_lock,
		})
	}

	/// Converts a storage key to a filesystem-safe file path.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let safe_key = key.replace(['/', ':'], "_");
		self.base_path.join(format!("{}.bin", safe_key))
	}

	/// Gets the TTL for a given key based on its namespace.
	fn get_ttl_for_key(&self, key: &str) -> Duration {
		// Parse namespace from key (e.g., "orders:TLR-..." -> "orders")
		let namespace = key.split(':').next().unwrap_or("");
		namespace
			.parse::<StorageKey>()
			.map(|sk| self.ttl_config.get_ttl(sk))
			.unwrap_or(Duration::ZERO)
	}

	/// Reads the live payload for a key, treating expired records as
	/// missing.
	async fn read_live(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
		let path = self.get_file_path(key);
		let data = match fs::read(&path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::deserialize(&data)?;
		if header.is_expired() {
			return Ok(None);
		}
		Ok(Some(data[FileHeader::SIZE..].to_vec()))
	}

	/// Writes a payload with a fresh header, atomically via temp+rename.
	async fn write_record(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		let header = FileHeader::new(ttl);
		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(value);

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		Ok(())
	}

	/// Removes all expired files from storage.
	async fn cleanup_expired_files(&self) -> Result<usize, StorageError> {
		let _guard = self.write_lock.lock().await;
		let mut removed = 0;
		let mut entries = fs::read_dir(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new("bin")) {
				continue;
			}
			match fs::read(&path).await {
				Ok(data) => {
					if let Ok(header) = FileHeader::deserialize(&data) {
						if header.is_expired() {
							if let Err(e) = fs::remove_file(&path).await {
								tracing::warn!("Failed to remove expired file {:?}: {}", path, e);
							} else {
								removed += 1;
							}
						}
					}
				}
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
				}
			}
		}
		Ok(removed)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.read_live(key).await?.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		let ttl = ttl.unwrap_or_else(|| self.get_ttl_for_key(key));
		self.write_record(key, &value, ttl).await
	}

	async fn set_bytes_if_absent(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		if self.read_live(key).await?.is_some() {
			return Ok(false);
		}
		let ttl = ttl.unwrap_or_else(|| self.get_ttl_for_key(key));
		self.write_record(key, &value, ttl).await?;
		Ok(true)
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		value: Vec<u8>,
	) -> Result<bool, StorageError> {
		let _guard = self.write_lock.lock().await;
		let current = self.read_live(key).await?;
		if current.as_deref() != expected {
			return Ok(false);
		}
		let ttl = self.get_ttl_for_key(key);
		self.write_record(key, &value, ttl).await?;
		Ok(true)
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let _guard = self.write_lock.lock().await;
		let path = self.get_file_path(key);
		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.read_live(key).await?.is_some())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.cleanup_expired_files().await
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		// Build TTL fields dynamically based on StorageKey variants
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];
		for storage_key in StorageKey::all() {
			optional_fields.push(Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl crate::StorageRegistry for Registry {}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/storage")
/// - `ttl_<namespace>`: TTL in seconds per namespace (default: 0, never expires)
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	let ttl_config = TtlConfig::from_config(config);

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		ttl_config,
	)?))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn storage(dir: &tempfile::TempDir) -> FileStorage {
		FileStorage::new(
			dir.path().join("data"),
			TtlConfig {
				ttls: HashMap::new(),
			},
		)
		.unwrap()
	}

	#[tokio::test]
	async fn test_roundtrip_and_delete() {
		let dir = tempfile::tempdir().unwrap();
		let storage = storage(&dir);

		storage
			.set_bytes("orders:TLR-1", b"payload".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(
			storage.get_bytes("orders:TLR-1").await.unwrap(),
			b"payload".to_vec()
		);
		assert!(storage.exists("orders:TLR-1").await.unwrap());

		storage.delete("orders:TLR-1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("orders:TLR-1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_expired_record_is_missing_and_cleaned() {
		let dir = tempfile::tempdir().unwrap();
		let storage = storage(&dir);

		// Forge an already-expired record on disk.
		let header = FileHeader { expires_at: 1 };
		let mut data = header.serialize().to_vec();
		data.extend_from_slice(b"stale");
		std::fs::write(storage.get_file_path("orders:old"), data).unwrap();

		assert!(!storage.exists("orders:old").await.unwrap());
		assert!(matches!(
			storage.get_bytes("orders:old").await,
			Err(StorageError::NotFound)
		));
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
	}

	#[test]
	fn test_ttl_config_parsing() {
		let config: toml::Value = toml::from_str("ttl_orders = 60").unwrap();
		let ttl = TtlConfig::from_config(&config);
		assert_eq!(ttl.get_ttl(StorageKey::Orders), Duration::from_secs(60));
		assert_eq!(ttl.get_ttl(StorageKey::Workers), Duration::ZERO);
	}

	#[tokio::test]
	async fn test_compare_and_swap_on_files() {
		let dir = tempfile::tempdir().unwrap();
		let storage = storage(&dir);

		assert!(storage
			.compare_and_swap("workers:w1", None, b"v1".to_vec())
			.await
			.unwrap());
		assert!(!storage
			.compare_and_swap("workers:w1", Some(b"other"), b"v2".to_vec())
			.await
			.unwrap());
		assert!(storage
			.compare_and_swap("workers:w1", Some(b"v1"), b"v2".to_vec())
			.await
			.unwrap());
		assert_eq!(
			storage.get_bytes("workers:w1").await.unwrap(),
			b"v2".to_vec()
		);
	}

	#[tokio::test]
	async fn test_directory_is_claimed_exclusively() {
		let dir = tempfile::tempdir().unwrap();
		let first = storage(&dir);
		let second = FileStorage::new(
			dir.path().join("data"),
			TtlConfig {
				ttls: HashMap::new(),
			},
		);
		assert!(second.is_err());
		drop(first);
	}
}
