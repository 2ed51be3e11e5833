//! The ban and whitelist file.
//!
//! Address patterns are either literal (`1.2.3.4`) or prefix-wildcarded
//! (`1.2.3.*`); matching is case-insensitive and compares up to the first
//! `*`. A whitelisted address bypasses the banlist entirely. The file is
//! rewritten pretty-printed after every mutation so it stays hand-editable.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ConfigError;

#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct BanEntry {
    pub name: String,
    pub reason: String,
    /// Minutes from `added_at` until the ban lapses. Absent means forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Seconds since the epoch when the ban was added.
    #[serde(default)]
    pub added_at: u64,
}

impl BanEntry {
    fn is_active(&self, now: SystemTime) -> bool {
        match self.duration {
            None => true,
            Some(minutes) => {
                let expiry = UNIX_EPOCH
                    + Duration::from_secs(self.added_at)
                    + Duration::from_secs(minutes * 60);
                now < expiry
            }
        }
    }
}

#[derive(Clone, Default, Debug, Serialize, Deserialize)]
struct AccessFile {
    #[serde(default)]
    banlist: BTreeMap<String, BanEntry>,
    #[serde(default)]
    whitelist: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct AccessList {
    path: PathBuf,
    file: AccessFile,
}

impl AccessList {
    /// Loads the list, or starts empty if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let file = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;

            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.display().to_string(),
                source,
            })?
        } else {
            AccessFile::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    fn write_out(&self) {
        let text = serde_json::to_string_pretty(&self.file)
            .expect("access list serialization is infallible");

        if let Err(e) = std::fs::write(&self.path, text) {
            warn!(path = %self.path.display(), error = %e, "could not write access list");
        }
    }

    /// Adds a ban. Fails if the pattern already exists.
    pub fn add_ban(
        &mut self,
        pattern: &str,
        name: &str,
        reason: &str,
        duration_minutes: Option<u64>,
    ) -> Result<(), ConfigError> {
        if self.file.banlist.contains_key(pattern) {
            return Err(ConfigError::Invalid(String::from("Ban already exists.")));
        }

        self.file.banlist.insert(
            pattern.to_owned(),
            BanEntry {
                name: name.to_owned(),
                reason: reason.to_owned(),
                duration: duration_minutes,
                added_at: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs(),
            },
        );

        self.write_out();
        Ok(())
    }

    pub fn remove_ban(&mut self, pattern: &str) -> Result<(), ConfigError> {
        if self.file.banlist.remove(pattern).is_none() {
            return Err(ConfigError::Invalid(String::from("Ban not found.")));
        }

        self.write_out();
        Ok(())
    }

    pub fn add_whitelist(&mut self, address: &str, name: &str) -> Result<(), ConfigError> {
        if self.file.whitelist.contains_key(address) {
            return Err(ConfigError::Invalid(String::from(
                "Whitelist entry already exists.",
            )));
        }

        self.file
            .whitelist
            .insert(address.to_owned(), name.to_owned());
        self.write_out();
        Ok(())
    }

    pub fn remove_whitelist(&mut self, address: &str) -> Result<(), ConfigError> {
        if self.file.whitelist.remove(address).is_none() {
            return Err(ConfigError::Invalid(String::from(
                "Whitelist entry not found.",
            )));
        }

        self.write_out();
        Ok(())
    }

    /// The active ban matching `address`, if any. Whitelisted addresses are
    /// never banned.
    pub fn get_ban(&self, address: &str) -> Option<(&str, &BanEntry)> {
        if self.file.whitelist.contains_key(address) {
            return None;
        }

        let now = SystemTime::now();

        self.file
            .banlist
            .iter()
            .find(|(pattern, entry)| {
                pattern_matches(pattern, address) && entry.is_active(now)
            })
            .map(|(pattern, entry)| (pattern.as_str(), entry))
    }

    pub fn is_banned(&self, address: &str) -> bool {
        self.get_ban(address).is_some()
    }

    pub fn bans(&self) -> impl Iterator<Item = (&str, &BanEntry)> {
        self.file
            .banlist
            .iter()
            .map(|(pattern, entry)| (pattern.as_str(), entry))
    }

    pub fn whitelists(&self) -> impl Iterator<Item = (&str, &str)> {
        self.file
            .whitelist
            .iter()
            .map(|(address, name)| (address.as_str(), name.as_str()))
    }
}

/// Compares up to the first `*` of the pattern (or its full length if none),
/// case-insensitively.
fn pattern_matches(pattern: &str, address: &str) -> bool {
    let cutoff = pattern.find('*').unwrap_or(pattern.len());
    let prefix = &pattern[..cutoff];

    if pattern.len() == cutoff {
        // No wildcard: exact match.
        return pattern.eq_ignore_ascii_case(address);
    }

    address.len() >= prefix.len() && address[..prefix.len()].eq_ignore_ascii_case(prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list() -> (tempfile::TempDir, AccessList) {
        let dir = tempfile::tempdir().unwrap();
        let list = AccessList::load(&dir.path().join("access_list.json")).unwrap();
        (dir, list)
    }

    #[test]
    fn wildcard_matches_prefix_only() {
        let (_dir, mut list) = list();
        list.add_ban("1.2.3.*", "griefer", "aimbot", None).unwrap();

        assert!(list.is_banned("1.2.3.9"));
        assert!(list.is_banned("1.2.3.250"));
        assert!(!list.is_banned("1.2.4.1"));
    }

    #[test]
    fn literal_ban_is_exact() {
        let (_dir, mut list) = list();
        list.add_ban("10.0.0.7", "x", "y", None).unwrap();

        assert!(list.is_banned("10.0.0.7"));
        assert!(!list.is_banned("10.0.0.70"));
    }

    #[test]
    fn whitelist_bypasses_ban() {
        let (_dir, mut list) = list();
        list.add_ban("10.0.0.*", "subnet", "spam", None).unwrap();
        list.add_whitelist("10.0.0.5", "the one good actor").unwrap();

        assert!(list.is_banned("10.0.0.4"));
        assert!(!list.is_banned("10.0.0.5"));
    }

    #[test]
    fn expired_bans_lapse() {
        let (_dir, mut list) = list();
        list.add_ban("5.5.5.5", "x", "y", Some(10)).unwrap();

        // Backdate the entry past its duration.
        list.file.banlist.get_mut("5.5.5.5").unwrap().added_at = 0;

        assert!(!list.is_banned("5.5.5.5"));

        list.add_ban("6.6.6.6", "x", "y", Some(10)).unwrap();
        assert!(list.is_banned("6.6.6.6"));
    }

    #[test]
    fn duplicate_entries_rejected() {
        let (_dir, mut list) = list();
        list.add_ban("1.1.1.1", "x", "y", None).unwrap();

        assert!(list.add_ban("1.1.1.1", "x", "y", None).is_err());
        assert!(list.remove_ban("2.2.2.2").is_err());
    }

    #[test]
    fn persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access_list.json");

        {
            let mut list = AccessList::load(&path).unwrap();
            list.add_ban("9.9.9.*", "net", "flood", Some(30)).unwrap();
            list.add_whitelist("9.9.9.1", "ok").unwrap();
        }

        let list = AccessList::load(&path).unwrap();
        assert!(list.is_banned("9.9.9.2"));
        assert!(!list.is_banned("9.9.9.1"));
        assert_eq!(list.bans().count(), 1);
        assert_eq!(list.whitelists().count(), 1);
    }
}
