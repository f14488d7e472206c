// src/channel.rs

//! Channel descriptors, the persistent channel store, and index loading
//!
//! A channel is one configured package source: either a remote deb
//! repository (`base_url` + distribution + components) or a local
//! directory containing a ready-made `Packages` index. The store
//! persists the facade-managed channel list as JSON; reloading fetches
//! and parses every channel's index into `PackageRecord`s.

use crate::catalog::{parse_depends, parse_provides, PackageRecord};
use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default timeout for index downloads (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Kind of a configured channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelKind {
    /// Remote repository laid out as `dists/<dist>/<component>/binary-<arch>/`
    AptDeb,
    /// Local directory with a plain `Packages` file
    DebDir,
}

/// A repository descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub base_url: String,
    pub distribution: String,
    pub components: Vec<String>,
    pub kind: ChannelKind,
}

impl Channel {
    pub fn apt_deb(url: impl Into<String>, distribution: impl Into<String>, components: Vec<String>) -> Self {
        Self {
            base_url: url.into(),
            distribution: distribution.into(),
            components,
            kind: ChannelKind::AptDeb,
        }
    }

    pub fn deb_dir(path: impl Into<String>) -> Self {
        Self {
            base_url: path.into(),
            distribution: "./".to_string(),
            components: Vec::new(),
            kind: ChannelKind::DebDir,
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ChannelKind::AptDeb => {
                write!(f, "deb {} {}", self.base_url, self.distribution)?;
                for component in &self.components {
                    write!(f, " {}", component)?;
                }
                Ok(())
            }
            ChannelKind::DebDir => write!(f, "dir {}", self.base_url),
        }
    }
}

/// Persistent list of facade-managed channels.
///
/// System package sources are not modeled; every channel the engine
/// knows about lives in this store.
#[derive(Debug)]
pub struct ChannelStore {
    path: PathBuf,
    channels: Vec<Channel>,
}

impl ChannelStore {
    /// Open the store, loading any previously persisted channel list.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let channels = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Channel(format!("corrupt channel store {}: {}", path.display(), e)))?
        } else {
            Vec::new()
        };
        Ok(Self { path, channels })
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.channels)
            .map_err(|e| Error::Channel(format!("failed to serialize channel store: {}", e)))?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// Add a channel. Re-adding an identical descriptor is a no-op;
    /// returns whether the store changed.
    pub fn add(&mut self, channel: Channel) -> Result<bool> {
        if self.channels.contains(&channel) {
            debug!("Channel already configured: {}", channel);
            return Ok(false);
        }
        info!("Adding channel: {}", channel);
        self.channels.push(channel);
        self.save()?;
        Ok(true)
    }

    /// Remove every channel from the store.
    pub fn clear(&mut self) -> Result<()> {
        self.channels.clear();
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn list(&self) -> &[Channel] {
        &self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Stanza shape of one entry in a `Packages` index.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PackagesEntry {
    package: String,
    version: String,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    size: Option<String>,
    #[serde(rename = "Installed-Size", default)]
    installed_size: Option<String>,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    provides: Option<String>,
    #[serde(rename = "Pre-Depends", default)]
    pre_depends: Option<String>,
    #[serde(default)]
    depends: Option<String>,
    #[serde(default)]
    conflicts: Option<String>,
    #[serde(default)]
    breaks: Option<String>,
}

impl PackagesEntry {
    fn into_record(self) -> PackageRecord {
        let mut record = PackageRecord::new(self.package, self.version);
        record.section = self.section;
        if let Some(description) = self.description {
            let mut lines = description.lines();
            record.summary = lines.next().map(|line| line.trim().to_string());
            record.description = Some(description.clone());
        }
        record.size = self.size.and_then(|s| s.trim().parse().ok());
        record.installed_size = self.installed_size.and_then(|s| s.trim().parse().ok());
        record.filename = self.filename;
        record.provides = self.provides.map(|f| parse_provides(&f)).unwrap_or_default();
        record.pre_depends = self.pre_depends.map(|f| parse_depends(&f)).unwrap_or_default();
        record.depends = self.depends.map(|f| parse_depends(&f)).unwrap_or_default();
        record.conflicts = self.conflicts.map(|f| parse_depends(&f)).unwrap_or_default();
        record.breaks = self.breaks.map(|f| parse_depends(&f)).unwrap_or_default();
        record
    }
}

/// Parse the content of one `Packages` index.
pub fn parse_packages_index(content: &str) -> Result<Vec<PackageRecord>> {
    let entries: Vec<PackagesEntry> = rfc822_like::from_str(content)
        .map_err(|e| Error::Channel(format!("failed to parse Packages index: {}", e)))?;
    Ok(entries.into_iter().map(PackagesEntry::into_record).collect())
}

/// Loads package records from every configured channel.
pub struct ChannelLoader {
    client: reqwest::blocking::Client,
    architecture: String,
}

impl ChannelLoader {
    pub fn new(architecture: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| Error::Channel(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            architecture: architecture.into(),
        })
    }

    /// Fetch and parse every channel, returning the combined record set.
    ///
    /// Any fetch or parse failure fails the whole reload so the caller
    /// never observes a partially refreshed catalog.
    pub fn load(&self, channels: &[Channel]) -> Result<Vec<PackageRecord>> {
        let mut records = Vec::new();
        for channel in channels {
            let loaded = match channel.kind {
                ChannelKind::AptDeb => self.load_apt_deb(channel)?,
                ChannelKind::DebDir => self.load_deb_dir(Path::new(&channel.base_url))?,
            };
            debug!("Loaded {} records from channel {}", loaded.len(), channel);
            records.extend(loaded);
        }
        info!("Loaded {} package records from {} channels", records.len(), channels.len());
        Ok(records)
    }

    fn load_apt_deb(&self, channel: &Channel) -> Result<Vec<PackageRecord>> {
        let base = channel.base_url.trim_end_matches('/');
        let mut records = Vec::new();
        if channel.components.is_empty() {
            // Flat repository layout
            let dir = format!("{}/{}", base, channel.distribution.trim_end_matches('/'));
            records.extend(self.fetch_index(&dir)?);
        } else {
            for component in &channel.components {
                let dir = format!(
                    "{}/dists/{}/{}/binary-{}",
                    base, channel.distribution, component, self.architecture
                );
                records.extend(self.fetch_index(&dir)?);
            }
        }
        Ok(records)
    }

    /// Fetch `<dir>/Packages.gz`, falling back to the uncompressed index.
    fn fetch_index(&self, dir: &str) -> Result<Vec<PackageRecord>> {
        let gz_url = format!("{}/Packages.gz", dir);
        match self.fetch_bytes(&gz_url)? {
            Some(bytes) => {
                let mut decoder = GzDecoder::new(bytes.as_slice());
                let mut content = String::new();
                decoder
                    .read_to_string(&mut content)
                    .map_err(|e| Error::Channel(format!("failed to decompress {}: {}", gz_url, e)))?;
                parse_packages_index(&content)
            }
            None => {
                let plain_url = format!("{}/Packages", dir);
                warn!("{} not found, trying {}", gz_url, plain_url);
                match self.fetch_bytes(&plain_url)? {
                    Some(bytes) => {
                        let content = String::from_utf8(bytes).map_err(|e| {
                            Error::Channel(format!("invalid UTF-8 in {}: {}", plain_url, e))
                        })?;
                        parse_packages_index(&content)
                    }
                    None => Err(Error::Channel(format!("no Packages index under {}", dir))),
                }
            }
        }
    }

    /// GET a URL; `Ok(None)` on 404 so the caller can fall back.
    fn fetch_bytes(&self, url: &str) -> Result<Option<Vec<u8>>> {
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::Channel(format!("failed to fetch {}: {}", url, e)))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Error::Channel(format!("HTTP {} from {}", response.status(), url)));
        }
        let bytes = response
            .bytes()
            .map_err(|e| Error::Channel(format!("failed to read {}: {}", url, e)))?;
        Ok(Some(bytes.to_vec()))
    }

    fn load_deb_dir(&self, dir: &Path) -> Result<Vec<PackageRecord>> {
        let index = dir.join("Packages");
        let content = fs::read_to_string(&index)
            .map_err(|e| Error::Channel(format!("failed to read {}: {}", index.display(), e)))?;
        parse_packages_index(&content)
    }
}
