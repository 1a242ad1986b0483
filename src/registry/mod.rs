//! Room-pair registry: the flat JSON file linking rooms, plus the derived
//! bidirectional lookup consulted on every translation decision.

use crate::api::{ChatApi, SEARCH_PAGE_SIZE};
use crate::utils::atomic_write;
use anyhow::{Context, Result, bail};
use fs2::FileExt;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, warn};

const MAX_SEARCH_PAGES: u64 = 100;

/// Characters the service rejects in room names.
fn invalid_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[#:,&'<>"@/+]"#).expect("invalid room-name regex"))
}

pub fn is_room_name_valid(name: &str) -> bool {
    !name.is_empty() && !invalid_chars().is_match(name)
}

/// One operator-declared link between two rooms. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomPair {
    #[serde(rename = "pairId")]
    pub pair_id: String,
    #[serde(rename = "room1name")]
    pub room1_name: String,
    #[serde(rename = "room2name")]
    pub room2_name: String,
    #[serde(rename = "room1lang")]
    pub room1_lang: String,
    #[serde(rename = "room2lang")]
    pub room2_lang: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct RoomsFile {
    rooms: Vec<RoomPair>,
}

/// Where a message from a given room should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub target_room: String,
    pub from_lang: String,
    pub to_lang: String,
}

/// File-backed registry. Reads re-open the file every time — the data is
/// tiny and the control plane may have appended a pair since the last look.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms_path: PathBuf,
    codes_path: PathBuf,
}

impl RoomRegistry {
    pub fn new(rooms_path: PathBuf, codes_path: PathBuf) -> Self {
        Self {
            rooms_path,
            codes_path,
        }
    }

    /// Resolve a room to its paired room and language direction.
    ///
    /// Unregistered rooms return `None` silently — most traffic on the
    /// global feed is rooms nobody linked.
    pub fn resolve(&self, room_name: &str) -> Option<Route> {
        let lookup = match self.build_lookup() {
            Ok(lookup) => lookup,
            Err(e) => {
                warn!("failed to build room lookup: {e:#}");
                return None;
            }
        };
        lookup.get(room_name).cloned()
    }

    /// Rebuild the bidirectional lookup from the pair set and the
    /// language-name→code table.
    fn build_lookup(&self) -> Result<HashMap<String, Route>> {
        let pairs = self.pairs()?;
        let codes = self.language_codes()?;

        let mut lookup = HashMap::with_capacity(pairs.len() * 2);
        for pair in &pairs {
            let Some(lang1) = codes.get(&pair.room1_lang) else {
                warn!(
                    "pair {}: unknown language {:?}, skipping",
                    pair.pair_id, pair.room1_lang
                );
                continue;
            };
            let Some(lang2) = codes.get(&pair.room2_lang) else {
                warn!(
                    "pair {}: unknown language {:?}, skipping",
                    pair.pair_id, pair.room2_lang
                );
                continue;
            };
            lookup.insert(
                pair.room1_name.clone(),
                Route {
                    target_room: pair.room2_name.clone(),
                    from_lang: lang1.clone(),
                    to_lang: lang2.clone(),
                },
            );
            lookup.insert(
                pair.room2_name.clone(),
                Route {
                    target_room: pair.room1_name.clone(),
                    from_lang: lang2.clone(),
                    to_lang: lang1.clone(),
                },
            );
        }
        Ok(lookup)
    }

    /// All registered pairs. Missing file reads as empty.
    pub fn pairs(&self) -> Result<Vec<RoomPair>> {
        if !self.rooms_path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.rooms_path)
            .with_context(|| format!("Failed to open {}", self.rooms_path.display()))?;
        file.lock_shared()
            .with_context(|| "Failed to lock rooms file for reading")?;
        let content = std::fs::read_to_string(&self.rooms_path)
            .with_context(|| format!("Failed to read {}", self.rooms_path.display()))?;
        // Lock released when `file` drops
        let parsed: RoomsFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.rooms_path.display()))?;
        Ok(parsed.rooms)
    }

    pub fn language_codes(&self) -> Result<HashMap<String, String>> {
        let content = std::fs::read_to_string(&self.codes_path)
            .with_context(|| format!("Failed to read {}", self.codes_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.codes_path.display()))
    }

    /// Register a new pair (control plane only). Validates names and
    /// languages, then appends under an exclusive lock.
    pub fn add_pair(
        &self,
        room1_name: &str,
        room1_lang: &str,
        room2_name: &str,
        room2_lang: &str,
    ) -> Result<RoomPair> {
        if !is_room_name_valid(room1_name) || !is_room_name_valid(room2_name) {
            bail!("room names must be non-empty and contain none of # : , & ' < > \" @ / +");
        }
        if room1_name == room2_name {
            bail!("room names must differ");
        }
        let codes = self.language_codes()?;
        for lang in [room1_lang, room2_lang] {
            if !codes.contains_key(lang) {
                bail!("unknown language {lang:?}");
            }
        }

        let lock_path = self.rooms_path.with_extension("json.lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to create lock file {}", lock_path.display()))?;
        lock_file
            .lock_exclusive()
            .with_context(|| "Failed to lock rooms file for writing")?;

        let mut rooms = self.pairs()?;
        if rooms
            .iter()
            .any(|p| p.room1_name == room1_name && p.room2_name == room2_name)
        {
            bail!("{room1_name} and {room2_name} are already linked");
        }

        let pair = RoomPair {
            pair_id: uuid::Uuid::new_v4().to_string(),
            room1_name: room1_name.to_string(),
            room2_name: room2_name.to_string(),
            room1_lang: room1_lang.to_string(),
            room2_lang: room2_lang.to_string(),
        };
        rooms.push(pair.clone());

        let content = serde_json::to_string_pretty(&RoomsFile { rooms })?;
        atomic_write(&self.rooms_path, &content)?;
        Ok(pair)
    }
}

/// Walk the room directory page by page until both names are seen, or the
/// directory (or the 100-page cap) is exhausted.
pub async fn rooms_exist(
    api: &ChatApi,
    session: &str,
    room1_name: &str,
    room2_name: &str,
) -> Result<bool> {
    let mut seen: Vec<String> = Vec::new();
    let mut page_number = 0u64;
    let mut total: Option<u64> = None;

    while page_number < MAX_SEARCH_PAGES
        && total.is_none_or(|t| page_number * SEARCH_PAGE_SIZE < t)
    {
        debug!("browsing directory page {page_number} for {room1_name} and {room2_name}");
        let page = api.search_rooms_page(session, page_number).await?;
        total = Some(page.total_room_count);
        seen.extend(page.rooms);
        page_number += 1;

        if seen.iter().any(|r| r == room1_name) && seen.iter().any(|r| r == room2_name) {
            return Ok(true);
        }
        // Courtesy pause between directory pages.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    }
    Ok(false)
}
