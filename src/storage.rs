/// Persisted harness state
///
/// Three small JSON files under the state directory: the version manifest
/// for installed components, the session state (current wallet selection,
/// last update check), and the bounded inscription history.
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Sentinel wallet selected when the user never picked one; matches the
/// indexer's own default wallet name.
pub const DEFAULT_WALLET: &str = "ord";

/// Most-recent publications kept; oldest evicted on overflow.
pub const HISTORY_LIMIT: usize = 5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InscriptionRecord {
    pub inscription_id: String,
    pub source_file: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionState {
    pub current_wallet: String,
    pub last_update_check: Option<DateTime<Utc>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            current_wallet: DEFAULT_WALLET.to_string(),
            last_update_check: None,
        }
    }
}

#[derive(Clone)]
pub struct SessionStore {
    base_path: PathBuf,
}

impl SessionStore {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StorageError> {
        fs::create_dir_all(&self.base_path)?;
        let json = serde_json::to_string_pretty(value)?;
        fs::write(self.file(name), json)?;
        Ok(())
    }

    fn read_json<T: for<'de> Deserialize<'de> + Default>(
        &self,
        name: &str,
    ) -> Result<T, StorageError> {
        let path = self.file(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    // ------------------------------------------------------------------
    // Session state
    // ------------------------------------------------------------------

    pub fn load_session(&self) -> Result<SessionState, StorageError> {
        self.read_json("session.json")
    }

    pub fn save_session(&self, state: &SessionState) -> Result<(), StorageError> {
        self.write_json("session.json", state)
    }

    pub fn current_wallet(&self) -> Result<String, StorageError> {
        Ok(self.load_session()?.current_wallet)
    }

    pub fn set_current_wallet(&self, name: &str) -> Result<(), StorageError> {
        let mut state = self.load_session()?;
        state.current_wallet = name.to_string();
        self.save_session(&state)
    }

    pub fn touch_update_check(&self) -> Result<(), StorageError> {
        let mut state = self.load_session()?;
        state.last_update_check = Some(Utc::now());
        self.save_session(&state)
    }

    // ------------------------------------------------------------------
    // Version manifest
    // ------------------------------------------------------------------

    pub fn component_version(&self, component: &str) -> Result<Option<String>, StorageError> {
        let manifest: BTreeMap<String, String> = self.read_json("versions.json")?;
        Ok(manifest.get(component).cloned())
    }

    pub fn record_component_version(
        &self,
        component: &str,
        version: &str,
    ) -> Result<(), StorageError> {
        let mut manifest: BTreeMap<String, String> = self.read_json("versions.json")?;
        manifest.insert(component.to_string(), version.to_string());
        self.write_json("versions.json", &manifest)
    }

    // ------------------------------------------------------------------
    // Inscription history
    // ------------------------------------------------------------------

    pub fn recent_inscriptions(&self) -> Result<Vec<InscriptionRecord>, StorageError> {
        self.read_json("inscriptions.json")
    }

    /// Append a publication, evicting the oldest past the limit.
    pub fn push_inscription(&self, record: InscriptionRecord) -> Result<(), StorageError> {
        let mut history = self.recent_inscriptions()?;
        history.push(record);
        if history.len() > HISTORY_LIMIT {
            let excess = history.len() - HISTORY_LIMIT;
            history.drain(..excess);
        }
        self.write_json("inscriptions.json", &history)
    }

    pub fn clear_history(&self) -> Result<(), StorageError> {
        self.write_json("inscriptions.json", &Vec::<InscriptionRecord>::new())
    }
}
