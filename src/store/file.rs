//! Simple file-backed [`CredentialStore`] for lightweight deployments.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// crates.io
use time::Date;
// self
use crate::{
	_prelude::*,
	key::{Credential, CredentialId, Platform, UsageLogEntry},
	store::{
		CredentialFilter, CredentialStore, IncrementOutcome, StoreError, StoreFuture,
		sort_least_used,
	},
};

#[derive(Debug, Deserialize)]
struct Snapshot {
	credentials: Vec<Credential>,
}

/// Persists credentials to a JSON snapshot and the usage log to an append-only JSON Lines file.
///
/// Credential mutations rewrite the snapshot through a temporary file and a rename. Usage entries
/// go to `<snapshot stem>.usage.jsonl` next to the snapshot, one line per call, so logging costs a
/// single small write no matter how long the log has grown. Appends are not fsynced.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	log_path: PathBuf,
	credentials: Arc<RwLock<HashMap<CredentialId, Credential>>>,
	log_writer: Arc<Mutex<()>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing credentials.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let credentials = Self::load_snapshot(&path)?;
		let log_path = path.with_extension("usage.jsonl");

		Ok(Self {
			path,
			log_path,
			credentials: Arc::new(RwLock::new(credentials)),
			log_writer: Default::default(),
		})
	}

	/// Location of the usage log.
	pub fn log_path(&self) -> &Path {
		&self.log_path
	}

	/// Reads the usage log back in append order.
	///
	/// An unterminated final line, left by a crash mid-append, is skipped.
	pub fn usage_log(&self) -> Result<Vec<UsageLogEntry>, StoreError> {
		let _guard = self.log_writer.lock();
		let bytes = match fs::read(&self.log_path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", self.log_path.display()),
				}),
		};
		let Some(end) = bytes.iter().rposition(|b| *b == b'\n') else {
			return Ok(Vec::new());
		};

		bytes[..end]
			.split(|b| *b == b'\n')
			.enumerate()
			.filter(|(_, line)| !line.is_empty())
			.map(|(i, line)| {
				serde_json::from_slice(line).map_err(|e| StoreError::Serialization {
					message: format!("Failed to parse {} line {}: {e}", self.log_path.display(), i + 1),
				})
			})
			.collect()
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<CredentialId, Credential>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;
		let snapshot: Snapshot =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(snapshot
			.credentials
			.into_iter()
			.map(|credential| (credential.id.clone(), credential))
			.collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, state: &HashMap<CredentialId, Credential>) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let mut credentials: Vec<&Credential> = state.values().collect();

		credentials.sort_by(|a, b| a.id.cmp(&b.id));

		let snapshot = serde_json::json!({ "credentials": credentials });
		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn update_locked(
		&self,
		id: &CredentialId,
		apply: impl FnOnce(&mut Credential),
	) -> Result<Option<Credential>, StoreError> {
		let mut guard = self.credentials.write();
		let updated = match guard.get_mut(id) {
			Some(credential) => {
				apply(credential);

				credential.clone()
			},
			None => return Ok(None),
		};

		self.persist_locked(&guard)?;

		Ok(Some(updated))
	}
}
impl CredentialStore for FileStore {
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut guard = self.credentials.write();

			guard.insert(credential.id.clone(), credential);
			self.persist_locked(&guard)
		})
	}

	fn fetch<'a>(&'a self, id: &'a CredentialId) -> StoreFuture<'a, Option<Credential>> {
		Box::pin(async move { Ok(self.credentials.read().get(id).cloned()) })
	}

	fn list(&self, platform: Platform, filter: CredentialFilter) -> StoreFuture<'_, Vec<Credential>> {
		Box::pin(async move {
			let mut credentials: Vec<Credential> = self
				.credentials
				.read()
				.values()
				.filter(|credential| credential.platform == platform && filter.matches(credential))
				.cloned()
				.collect();

			sort_least_used(&mut credentials);

			Ok(credentials)
		})
	}

	fn reset_stale(&self, today: Date) -> StoreFuture<'_, usize> {
		Box::pin(async move {
			let mut guard = self.credentials.write();
			let reset = guard
				.values_mut()
				.map(|credential| credential.reset_if_stale(today))
				.filter(|reset| *reset)
				.count();

			if reset > 0 {
				self.persist_locked(&guard)?;
			}

			Ok(reset)
		})
	}

	fn increment_usage<'a>(&'a self, id: &'a CredentialId) -> StoreFuture<'a, IncrementOutcome> {
		Box::pin(async move {
			let updated = self.update_locked(id, |credential| {
				credential.calls_used_today = credential.calls_used_today.saturating_add(1);
			})?;

			Ok(match updated {
				Some(credential) => IncrementOutcome::Incremented(credential.calls_used_today),
				None => IncrementOutcome::Missing,
			})
		})
	}

	fn mark_exhausted<'a>(
		&'a self,
		id: &'a CredentialId,
		note: String,
	) -> StoreFuture<'a, Option<Credential>> {
		Box::pin(async move { self.update_locked(id, |credential| credential.mark_exhausted(&note)) })
	}

	fn set_active<'a>(
		&'a self,
		id: &'a CredentialId,
		active: bool,
		note: String,
	) -> StoreFuture<'a, Option<Credential>> {
		Box::pin(async move {
			self.update_locked(id, |credential| {
				credential.is_active = active;
				credential.append_note(&note);
			})
		})
	}

	fn append_usage(&self, entry: UsageLogEntry) -> StoreFuture<'_, ()> {
		Box::pin(async move {
			let mut line = serde_json::to_vec(&entry).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize usage entry: {e}"),
			})?;

			line.push(b'\n');

			let _guard = self.log_writer.lock();
			let mut file = OpenOptions::new()
				.create(true)
				.append(true)
				.open(&self.log_path)
				.map_err(|e| StoreError::Backend {
					message: format!("Failed to open {}: {e}", self.log_path.display()),
				})?;

			file.write_all(&line).map_err(|e| StoreError::Backend {
				message: format!("Failed to append to {}: {e}", self.log_path.display()),
			})
		})
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, process};
	// crates.io
	use time::macros;
	use tokio::runtime::Runtime;
	// self
	use super::*;

	fn temp_path() -> PathBuf {
		let unique = format!(
			"quota_broker_file_store_{}_{}.json",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos(),
		);

		env::temp_dir().join(unique)
	}

	fn build_credential() -> Credential {
		Credential::builder(
			CredentialId::new("etsy-file").expect("Failed to build credential id fixture."),
			Platform::Etsy,
		)
		.api_key("etsy-key")
		.daily_limit(100)
		.calls_used_today(7)
		.last_reset_at(macros::date!(2025 - 03 - 01))
		.build()
		.expect("Failed to build file-store test credential.")
	}

	#[test]
	fn mutations_survive_reopen() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let credential = build_credential();
		let id = credential.id.clone();
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(credential)).expect("Failed to save fixture credential.");

		let outcome =
			rt.block_on(store.increment_usage(&id)).expect("Failed to increment usage counter.");

		assert_eq!(outcome, IncrementOutcome::Incremented(8));

		rt.block_on(store.mark_exhausted(&id, "rate limited".into()))
			.expect("Failed to mark credential exhausted.");
		drop(store);

		let reopened = FileStore::open(&path).expect("Failed to reopen file store snapshot.");
		let fetched = rt
			.block_on(reopened.fetch(&id))
			.expect("Failed to fetch fixture credential from file store.")
			.expect("File store lost credential after reopen.");

		assert_eq!(fetched.calls_used_today, 100);
		assert_eq!(fetched.notes, "rate limited");
		assert_eq!(fetched.api_key.expose(), "etsy-key");

		let reset = rt
			.block_on(reopened.reset_stale(macros::date!(2025 - 03 - 02)))
			.expect("Failed to reset stale counters.");

		assert_eq!(reset, 1);

		fs::remove_file(&path).unwrap_or_else(|e| {
			panic!("Failed to remove temporary file store snapshot {}: {e}", path.display())
		});
	}

	#[test]
	fn usage_entries_append_without_touching_the_snapshot() {
		let path = temp_path();
		let store = FileStore::open(&path).expect("Failed to open file store snapshot.");
		let credential = build_credential();
		let id = credential.id.clone();
		let user = crate::key::UserId::new("seller-1").expect("Failed to build user id fixture.");
		let rt = Runtime::new().expect("Failed to build Tokio runtime for file store test.");

		rt.block_on(store.save(credential)).expect("Failed to save fixture credential.");

		let snapshot_before = fs::read(&path).expect("Snapshot should exist after save.");

		for status in [200, 429, 200] {
			let entry = UsageLogEntry::new(id.clone(), user.clone(), Platform::Etsy, "/v3/x")
				.with_status(status);

			rt.block_on(store.append_usage(entry)).expect("Failed to append usage entry.");
		}

		assert_eq!(fs::read(&path).expect("Snapshot should still exist."), snapshot_before);
		assert_eq!(store.log_path().extension().and_then(|ext| ext.to_str()), Some("jsonl"));

		let raw = fs::read_to_string(store.log_path()).expect("Usage log should exist.");

		assert_eq!(raw.lines().count(), 3);

		// Simulate a crash halfway through a fourth append.
		OpenOptions::new()
			.append(true)
			.open(store.log_path())
			.and_then(|mut file| file.write_all(b"{\"credential_id\":\"etsy-"))
			.expect("Failed to write torn usage line.");

		let statuses: Vec<Option<u16>> = FileStore::open(&path)
			.expect("Failed to reopen file store snapshot.")
			.usage_log()
			.expect("Usage log with a torn tail should still load.")
			.into_iter()
			.map(|entry| entry.status)
			.collect();

		assert_eq!(statuses, [Some(200), Some(429), Some(200)]);

		let _ = fs::remove_file(store.log_path());
		let _ = fs::remove_file(&path);
	}
}
