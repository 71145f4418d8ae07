use super::CacheEntry;
use crate::protocol::{codec, codec_by_name, DomainName, ResourceRecord};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, trace, warn};

const EXTENSION: &str = ".info";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("cache file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache file {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("cache file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("origin {0:?} cannot be used as a file name")]
    InvalidOrigin(String),
    #[error("persisting cache entry did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Directory holding one JSON file per cached domain, named `<origin>.info`.
#[derive(Clone, Debug)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<CacheStore, PersistError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PersistError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(CacheStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads every cache file in the directory. Files that cannot be read are skipped.
    pub fn load_all(&self) -> Result<Vec<CacheEntry>, PersistError> {
        let io_error = |source| PersistError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = Vec::new();
        for file in fs::read_dir(&self.dir).map_err(io_error)? {
            let path = file.map_err(io_error)?.path();
            let is_cache_file = path
                .file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.ends_with(EXTENSION));
            if !is_cache_file {
                continue;
            }

            match load_file(&path) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(%err, "Skipping unreadable cache file"),
            }
        }
        Ok(entries)
    }

    /// Atomically replaces the file for the entry's origin.
    pub fn save(&self, entry: &CacheEntry) -> Result<(), PersistError> {
        let path = self.path_for(&entry.origin.key())?;
        let tmp = self.dir.join(format!(
            "{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or(EXTENSION)
        ));

        let json = serde_json::to_vec(&PersistedEntry::from(entry)).map_err(|source| {
            PersistError::Json {
                path: path.clone(),
                source,
            }
        })?;

        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, &path))
            .map_err(|source| PersistError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "Saved cache entry");

        // Older files are named after the origin with its trailing dot and would shadow
        // this one on the next load
        let legacy = self.dir.join(format!("{}.{}", entry.origin.key(), EXTENSION));
        match fs::remove_file(&legacy) {
            Ok(()) => debug!(path = %legacy.display(), "Removed legacy cache file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PersistError::Io {
                    path: legacy,
                    source,
                })
            }
        }

        Ok(())
    }

    fn path_for(&self, origin: &str) -> Result<PathBuf, PersistError> {
        if origin == "." || origin == ".." || origin.contains(&['/', '\\', '\0'][..]) {
            return Err(PersistError::InvalidOrigin(origin.to_owned()));
        }
        Ok(self.dir.join(format!("{}{}", origin, EXTENSION)))
    }
}

fn load_file(path: &Path) -> Result<CacheEntry, PersistError> {
    let bytes = fs::read(path).map_err(|source| PersistError::Io {
        path: path.to_owned(),
        source,
    })?;
    let persisted: PersistedEntry =
        serde_json::from_slice(&bytes).map_err(|source| PersistError::Json {
            path: path.to_owned(),
            source,
        })?;
    persisted.into_entry().map_err(|reason| PersistError::Corrupt {
        path: path.to_owned(),
        reason,
    })
}

// {"origin": "example.com", "time": "...", "ttl": 360, "data": {"a": [{"ttl": 300, "value": "93.184.216.34"}]}}
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    origin: String,
    #[serde(with = "timestamp")]
    time: chrono::DateTime<chrono::Utc>,
    ttl: u32,
    data: BTreeMap<String, Vec<PersistedRecord>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    ttl: u32,
    value: String,
}

impl From<&CacheEntry> for PersistedEntry {
    fn from(entry: &CacheEntry) -> Self {
        let data = entry
            .records
            .iter()
            .filter_map(|(rtype, records)| {
                let codec = codec(*rtype)?;
                let records = records
                    .iter()
                    .map(|r| PersistedRecord {
                        ttl: r.ttl,
                        value: r.data.to_text(),
                    })
                    .collect();
                Some((codec.name.to_owned(), records))
            })
            .collect();

        PersistedEntry {
            origin: entry.origin.key(),
            time: entry.fetched_at,
            ttl: entry.freshness_window,
            data,
        }
    }
}

impl PersistedEntry {
    fn into_entry(self) -> Result<CacheEntry, String> {
        let origin: DomainName = self
            .origin
            .parse()
            .map_err(|err| format!("origin {:?}: {}", self.origin, err))?;

        let mut records = std::collections::HashMap::new();
        for (name, persisted) in self.data {
            let codec = match codec_by_name(&name) {
                Some(codec) => codec,
                None => {
                    trace!(origin = %origin, %name, "Skipping records of unknown type");
                    continue;
                }
            };
            let parsed = persisted
                .into_iter()
                .map(|r| {
                    codec
                        .parse(&r.value)
                        .map(|data| ResourceRecord { ttl: r.ttl, data })
                        .ok_or_else(|| format!("invalid {} value {:?}", codec.rtype, r.value))
                })
                .collect::<Result<Vec<_>, _>>()?;
            records.insert(codec.rtype, parsed);
        }

        Ok(CacheEntry {
            origin,
            fetched_at: self.time,
            freshness_window: self.ttl,
            records,
        })
    }
}

mod timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(d)?;
        parse(&text).ok_or_else(|| de::Error::custom(format!("invalid timestamp {:?}", text)))
    }

    // Older cache files carry a naive local time such as "2021-05-04 17:32:10.123456"
    pub fn parse(text: &str) -> Option<DateTime<Utc>> {
        if let Ok(time) = DateTime::parse_from_rfc3339(text) {
            return Some(time.with_timezone(&Utc));
        }

        let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|time| time.with_timezone(&Utc))
    }
}
