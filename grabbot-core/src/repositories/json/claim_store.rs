// File: src/repositories/json/claim_store.rs
//
// Two files side by side:
//   claimed_codes.json          ["AB3D9F8K", ...]
//   claimed_codes_history.json  {"AB3D9F8K": {"amount": "5.00", "currency": "USDT", "date": "..."}}
// Both are rewritten wholesale on every mutation.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use grabbot_common::models::{ClaimRecord, ClaimSummary, Code};
use crate::repositories::ClaimRepository;
use crate::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryEntry {
    amount: String,
    currency: String,
    date: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct StoreState {
    codes: HashSet<String>,
    history: BTreeMap<String, HistoryEntry>,
}

pub struct JsonClaimStore {
    codes_path: PathBuf,
    history_path: PathBuf,
    state: RwLock<StoreState>,
}

impl JsonClaimStore {
    /// Opens the store at `path` and loads whatever is on disk.
    /// Never fails: missing or unreadable files give an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let codes_path = path.into();
        let history_path = history_path_for(&codes_path);
        let store = Self {
            codes_path,
            history_path,
            state: RwLock::new(StoreState::default()),
        };
        store.load();
        store
    }

    /// Replaces the in-memory state with the contents of the files.
    pub fn load(&self) {
        let mut codes: HashSet<String> = read_json_or_default::<Vec<String>>(&self.codes_path)
            .into_iter()
            .collect();
        let history: BTreeMap<String, HistoryEntry> = read_json_or_default(&self.history_path);

        // A code with a record is spent even if the array lost it.
        codes.extend(history.keys().cloned());

        info!(
            "Loaded {} claimed codes ({} with records) from {}",
            codes.len(),
            history.len(),
            self.codes_path.display()
        );
        let mut state = self.state.write();
        state.codes = codes;
        state.history = history;
    }

    pub fn path(&self) -> &Path {
        &self.codes_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    pub fn records(&self) -> Vec<ClaimRecord> {
        let state = self.state.read();
        state
            .history
            .iter()
            .filter_map(|(code, entry)| to_record(code, entry))
            .collect()
    }

    fn persist(&self, state: &StoreState) -> Result<(), Error> {
        let mut codes: Vec<&String> = state.codes.iter().collect();
        codes.sort();
        let codes_json = serde_json::to_vec_pretty(&codes)?;
        let history_json = serde_json::to_vec_pretty(&state.history)?;

        write_atomically(&self.codes_path, &codes_json)
            .and_then(|_| write_atomically(&self.history_path, &history_json))
            .map_err(|e| {
                error!("Failed to persist claim store to {}: {}", self.codes_path.display(), e);
                Error::Persistence(format!("{}: {}", self.codes_path.display(), e))
            })
    }
}

impl ClaimRepository for JsonClaimStore {
    fn contains(&self, code: &str) -> bool {
        self.state.read().codes.contains(code)
    }

    fn record_success(&self, code: &Code, amount: &str, currency: &str) -> Result<ClaimRecord, Error> {
        let record = ClaimRecord {
            code: code.clone(),
            amount: amount.to_string(),
            currency: currency.to_string(),
            claimed_at: Utc::now(),
        };
        let mut state = self.state.write();
        state.codes.insert(code.as_str().to_string());
        state.history.insert(
            code.as_str().to_string(),
            HistoryEntry {
                amount: record.amount.clone(),
                currency: record.currency.clone(),
                date: record.claimed_at,
            },
        );
        self.persist(&state)?;
        debug!("Recorded claim {} => {} {}", code, amount, currency);
        Ok(record)
    }

    fn mark_processed(&self, code: &Code) -> Result<(), Error> {
        let mut state = self.state.write();
        if !state.codes.insert(code.as_str().to_string()) {
            return Ok(());
        }
        self.persist(&state)
    }

    fn len(&self) -> usize {
        self.state.read().codes.len()
    }

    fn summary(&self, recent: usize) -> ClaimSummary {
        let state = self.state.read();
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();
        let mut records: Vec<ClaimRecord> = Vec::with_capacity(state.history.len());
        for (code, entry) in &state.history {
            match entry.amount.trim().parse::<f64>() {
                Ok(v) => *totals.entry(entry.currency.clone()).or_insert(0.0) += v,
                Err(_) => warn!("Unparsable amount '{}' for {}", entry.amount, code),
            }
            if let Some(rec) = to_record(code, entry) {
                records.push(rec);
            }
        }
        records.sort_by(|a, b| b.claimed_at.cmp(&a.claimed_at));
        records.truncate(recent);

        ClaimSummary {
            known_codes: state.codes.len(),
            successful_claims: state.history.len(),
            totals,
            recent: records,
        }
    }
}

/// `data/claimed_codes.json` => `data/claimed_codes_history.json`
fn history_path_for(codes_path: &Path) -> PathBuf {
    let stem = codes_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "claimed_codes".to_string());
    codes_path.with_file_name(format!("{stem}_history.json"))
}

fn to_record(code: &str, entry: &HistoryEntry) -> Option<ClaimRecord> {
    // Hand-edited files may hold junk keys; they still count as spent.
    let code = Code::parse(code).ok()?;
    Some(ClaimRecord {
        code,
        amount: entry.amount.clone(),
        currency: entry.currency.clone(),
        claimed_at: entry.date,
    })
}

fn read_json_or_default<T>(path: &Path) -> T
where
    T: Default + for<'de> Deserialize<'de>,
{
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist yet, starting empty", path.display());
            return T::default();
        }
        Err(e) => {
            warn!("Could not read {}: {} => starting empty", path.display(), e);
            return T::default();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            warn!("{} is not valid claim data ({}) => starting empty", path.display(), e);
            T::default()
        }
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)
}
