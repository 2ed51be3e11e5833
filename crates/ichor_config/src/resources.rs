//! WAD and DeHackEd resource resolution.
//!
//! Every resource named by the configuration is located on disk (trying
//! alternates in order), SHA-1 hashed, and recorded. PWADs that cannot be
//! found locally are fetched from the configured repository over HTTP;
//! IWADs and DeHackEd patches are never fetched.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{info, warn};
use url::Url;

use crate::ConfigError;

/// URL schemes the downloader accepts.
const ACCEPTED_SCHEMES: [&str; 10] = [
    "http", "https", "ftp", "gopher", "scp", "sftp", "tftp", "telnet", "dict", "file",
];

#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Iwad,
    Pwad,
    Deh,
}

/// A resource as written in the configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RawResource {
    pub name: String,
    #[serde(rename = "type", default = "default_resource_type")]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub alternates: Vec<String>,
}

const fn default_resource_type() -> ResourceType {
    ResourceType::Pwad
}

impl RawResource {
    pub fn is_iwad(&self) -> bool {
        self.resource_type == ResourceType::Iwad
    }
}

/// A located and hashed resource.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub path: PathBuf,
    pub resource_type: ResourceType,
    /// 40 hex characters.
    pub sha1: String,
}

/// The resolved resource set for a session.
#[derive(Clone, Debug, Default)]
pub struct ResourceStore {
    pub resources: Vec<Resource>,
}

impl ResourceStore {
    /// Resolves every configured resource against the search folders,
    /// fetching missing PWADs from `wad_repository` when one is set.
    pub fn resolve(
        raw: &[RawResource],
        folders: &[PathBuf],
        wad_repository: Option<&str>,
        cache_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let mut resources = vec![];

        for entry in raw {
            let resource = resolve_one(entry, folders, wad_repository, cache_dir)?;
            info!(
                name = %resource.name,
                sha1 = %resource.sha1,
                "resource loaded"
            );
            resources.push(resource);
        }

        Ok(Self { resources })
    }

    pub fn iwad(&self) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.resource_type == ResourceType::Iwad)
    }

    pub fn by_name(&self, name: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Checks a recorded `{name, sha1}` list against this store. Returns
    /// the first mismatching or missing name, if any.
    pub fn verify_digests<'a>(
        &self,
        recorded: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Option<String> {
        for (name, sha1) in recorded {
            match self.by_name(name) {
                Some(resource) if resource.sha1.eq_ignore_ascii_case(sha1) => {}
                _ => return Some(name.to_owned()),
            }
        }

        None
    }
}

fn resolve_one(
    entry: &RawResource,
    folders: &[PathBuf],
    wad_repository: Option<&str>,
    cache_dir: &Path,
) -> Result<Resource, ConfigError> {
    let mut candidates = vec![entry.name.clone()];
    candidates.extend(entry.alternates.iter().cloned());

    for candidate in &candidates {
        for folder in folders {
            let path = folder.join(candidate);
            if path.is_file() {
                return finish(entry, candidate, path);
            }
        }

        // The cache holds previously fetched PWADs.
        let cached = cache_dir.join(candidate);
        if cached.is_file() {
            return finish(entry, candidate, cached);
        }
    }

    // Only PWADs may come over the network.
    if entry.resource_type == ResourceType::Pwad {
        if let Some(repository) = wad_repository {
            let path = fetch_resource(repository, &entry.name, cache_dir)?;
            return finish(entry, &entry.name.clone(), path);
        }
    }

    Err(ConfigError::MissingResource(entry.name.clone()))
}

fn finish(entry: &RawResource, name: &str, path: PathBuf) -> Result<Resource, ConfigError> {
    let sha1 = hash_file(&path)?;

    Ok(Resource {
        name: name.to_owned(),
        path,
        resource_type: entry.resource_type,
        sha1,
    })
}

/// SHA-1 of a file's contents as 40 hex characters.
pub fn hash_file(path: &Path) -> Result<String, ConfigError> {
    let mut file = File::open(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        if n == 0 {
            break;
        }

        hasher.update(&buf[..n]);
    }

    Ok(digest_hex(&hasher.finalize()))
}

/// Hex-encodes a digest.
pub fn digest_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Validates a download URL against the accepted scheme set.
pub fn validate_fetch_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::InvalidUrl)?;

    if !ACCEPTED_SCHEMES.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrl);
    }

    Ok(url)
}

/// Downloads `{repository}/{name}` into the cache directory and returns the
/// cached path.
pub fn fetch_resource(
    repository: &str,
    name: &str,
    cache_dir: &Path,
) -> Result<PathBuf, ConfigError> {
    let base = repository.trim_end_matches('/');
    let url = validate_fetch_url(&format!("{base}/{name}"))?;

    info!(%url, "fetching missing resource");

    let response = reqwest::blocking::get(url.clone()).map_err(|e| ConfigError::FetchFailed {
        name: name.to_owned(),
        message: e.to_string(),
    })?;

    if !response.status().is_success() {
        return Err(ConfigError::FetchFailed {
            name: name.to_owned(),
            message: format!("server returned {}", response.status()),
        });
    }

    std::fs::create_dir_all(cache_dir).map_err(|source| ConfigError::Io {
        path: cache_dir.display().to_string(),
        source,
    })?;

    let path = cache_dir.join(name);
    let bytes = response.bytes().map_err(|e| ConfigError::FetchFailed {
        name: name.to_owned(),
        message: e.to_string(),
    })?;

    let mut file = File::create(&path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    if let Err(source) = file.write_all(&bytes) {
        warn!(path = %path.display(), "removing partial download");
        let _ = std::fs::remove_file(&path);
        return Err(ConfigError::Io {
            path: path.display().to_string(),
            source,
        });
    }

    Ok(path)
}
