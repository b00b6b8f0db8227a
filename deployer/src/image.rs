//! Image tags and references.
//!
//! Every build is pushed under `{commit}-{timestamp}`, which is unique per build and
//! orders by push time. The floating `latest` tag is never used to select a rollout.

use crate::Error;
use std::{cmp::Ordering, fmt, str::FromStr};

/// Floating tag optionally published alongside the unique tag
pub const LATEST_TAG: &str = "latest";

/// Number of commit characters kept in a tag
pub const COMMIT_LENGTH: usize = 7;

/// A build tag, `{commit}-{timestamp}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImageTag {
    commit: String,
    timestamp: u64,
}

impl ImageTag {
    /// Creates a tag from a commit identifier (shortened to [COMMIT_LENGTH]) and a UNIX
    /// timestamp in seconds.
    pub fn new(commit: &str, timestamp: u64) -> Result<Self, Error> {
        let commit = commit.trim().to_ascii_lowercase();
        if commit.is_empty() || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidCommit(commit));
        }
        let commit = commit.chars().take(COMMIT_LENGTH).collect();
        Ok(Self { commit, timestamp })
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Resolves the most recently pushed tag, skipping tags that do not follow the
    /// `{commit}-{timestamp}` scheme (such as `latest`).
    pub fn latest<'a, I>(tags: I) -> Option<ImageTag>
    where
        I: IntoIterator<Item = &'a str>,
    {
        tags.into_iter().filter_map(|t| t.parse().ok()).max()
    }
}

impl Ord for ImageTag {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.commit.cmp(&other.commit))
    }
}

impl PartialOrd for ImageTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for ImageTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidImageTag(s.to_string());
        let (commit, timestamp) = s.rsplit_once('-').ok_or_else(invalid)?;
        if commit.is_empty()
            || commit.len() > COMMIT_LENGTH
            || !commit
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(invalid());
        }
        if timestamp.is_empty() || !timestamp.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let timestamp = timestamp.parse().map_err(|_| invalid())?;
        Ok(Self {
            commit: commit.to_string(),
            timestamp,
        })
    }
}

impl fmt::Display for ImageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.commit, self.timestamp)
    }
}

/// A repository plus tag, `registry/name:tag`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    repository: String,
    tag: String,
}

impl ImageRef {
    pub fn new(repository: &str, tag: &str) -> Result<Self, Error> {
        let repository = repository.trim_end_matches('/');
        let (_, name) = repository
            .split_once('/')
            .ok_or_else(|| Error::InvalidImageReference(repository.to_string()))?;
        if name.is_empty() || name.contains(':') || name.contains('@') {
            return Err(Error::InvalidImageReference(repository.to_string()));
        }
        if tag.is_empty() || tag.contains(':') || tag.contains('/') {
            return Err(Error::InvalidImageTag(tag.to_string()));
        }
        Ok(Self {
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Parses `registry/name:tag`.
    pub fn parse(uri: &str) -> Result<Self, Error> {
        let invalid = || Error::InvalidImageReference(uri.to_string());
        let slash = uri.rfind('/').ok_or_else(invalid)?;
        let colon = uri[slash..].rfind(':').ok_or_else(invalid)? + slash;
        Self::new(&uri[..colon], &uri[colon + 1..])
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Registry host (`123456789012.dkr.ecr.us-east-1.amazonaws.com`).
    pub fn registry(&self) -> &str {
        self.repository
            .split_once('/')
            .map(|(registry, _)| registry)
            .unwrap_or(&self.repository)
    }

    /// Repository name within the registry (`nodejs-app`).
    pub fn name(&self) -> &str {
        self.repository
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.repository)
    }

    /// The same repository under a different tag.
    pub fn with_tag(&self, tag: &str) -> Result<Self, Error> {
        Self::new(&self.repository, tag)
    }

    pub fn uri(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}
