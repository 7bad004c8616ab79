use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock, PoisonError};

use semver::{Version, VersionReq};
use serde::{Serialize, Serializer};

/// Error type for version parsing
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("Invalid version format: '{0}'")]
    InvalidFormat(String),
    #[error("Version parse error: {0}")]
    ParseError(String),
}

/// A catalogue version: an ordered semantic-version-like tuple parsed from a
/// string. A leading `v` is stripped; two-segment tags like `1.2` are padded
/// to `1.2.0` before evaluation. Strings that do not reduce to a semver
/// triple keep only their raw form and compare textually.
#[derive(Debug, Clone)]
pub struct PluginVersion {
    raw: String,
    parsed: Option<Version>,
}

impl PluginVersion {
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let parsed = lenient_semver(&raw);
        Self { raw, parsed }
    }

    /// The input string, leading `v` stripped
    pub fn as_str(&self) -> &str {
        self.raw.strip_prefix(['v', 'V']).unwrap_or(&self.raw)
    }

    /// The evaluated semver triple, when the string reduced to one
    pub fn semver(&self) -> Option<&Version> {
        self.parsed.as_ref()
    }
}

/// Pads or trims a loose version string into a `semver::Version`.
/// Accepts 1-3 numeric segments plus an optional pre-release tail.
fn lenient_semver(raw: &str) -> Option<Version> {
    let s = raw.strip_prefix(['v', 'V']).unwrap_or(raw);
    if s.is_empty() {
        return None;
    }
    if let Ok(v) = Version::parse(s) {
        return Some(v);
    }

    let (core, pre) = match s.split_once('-') {
        Some((c, p)) => (c, Some(p)),
        None => (s, None),
    };
    let core = core.split_once('+').map_or(core, |(c, _)| c);

    let mut nums = [0u64; 3];
    let segments: Vec<&str> = core.split('.').collect();
    if segments.is_empty() || segments.len() > 3 {
        return None;
    }
    for (i, seg) in segments.iter().enumerate() {
        nums[i] = seg.parse().ok()?;
    }

    let mut version = Version::new(nums[0], nums[1], nums[2]);
    if let Some(pre) = pre {
        version.pre = semver::Prerelease::new(pre).ok()?;
    }
    Some(version)
}

// Equality and ordering work on the parsed tuple when available, so that
// "1.0" == "v1.0.0"; unparsed versions fall back to the raw text.
impl PartialEq for PluginVersion {
    fn eq(&self, other: &Self) -> bool {
        match (&self.parsed, &other.parsed) {
            (Some(a), Some(b)) => a == b,
            _ => self.as_str() == other.as_str(),
        }
    }
}

impl Eq for PluginVersion {}

impl PartialOrd for PluginVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PluginVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (&self.parsed, &other.parsed) {
            (Some(a), Some(b)) => a.cmp(b),
            _ => self.as_str().cmp(other.as_str()),
        }
    }
}

impl fmt::Display for PluginVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PluginVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PluginVersion::new(s))
    }
}

/// A predicate over [`PluginVersion`]: a comma-separated conjunction of
/// comparator tokens (`>=`, `<=`, `>`, `<`, `=`, `^`, `~`, wildcards, bare
/// versions). An unparseable requirement degrades to "accept any", logged
/// once per distinct string.
#[derive(Debug, Clone)]
pub struct VersionRequirement {
    raw: String,
    /// `None` marks a degraded requirement (unparseable input)
    criteria: Option<Vec<VersionReq>>,
}

impl VersionRequirement {
    pub fn parse(raw: &str) -> Self {
        let criteria = parse_criteria(raw);
        if criteria.is_none() {
            log_degraded_once(raw);
        }
        Self {
            raw: raw.to_string(),
            criteria,
        }
    }

    /// Requirement that accepts every version
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            criteria: Some(Vec::new()),
        }
    }

    /// Evaluates the conjunction against a concrete version.
    /// A degraded requirement accepts everything; an intact requirement
    /// rejects versions that do not evaluate to a semver triple.
    pub fn accepts(&self, version: &PluginVersion) -> bool {
        match &self.criteria {
            None => true,
            Some(reqs) => match version.semver() {
                Some(v) => reqs.iter().all(|r| r.matches(v)),
                None => reqs.is_empty(),
            },
        }
    }

    /// True when the requirement failed to parse and accepts everything
    pub fn is_degraded(&self) -> bool {
        self.criteria.is_none()
    }

    /// The original requirement string
    pub fn constraint_string(&self) -> &str {
        &self.raw
    }
}

fn parse_criteria(raw: &str) -> Option<Vec<VersionReq>> {
    let mut reqs = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        if token.is_empty() || token == "*" || token == "x" {
            continue;
        }
        let candidate = if token.starts_with(['>', '<', '=', '^', '~']) || token.contains(['x', 'X', '*']) {
            VersionReq::parse(token)
        } else {
            // A bare version is an exact requirement in the catalogue grammar
            VersionReq::parse(&format!("={token}"))
        };
        reqs.push(candidate.ok()?);
    }
    Some(reqs)
}

fn log_degraded_once(raw: &str) {
    static LOGGED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    let mut seen = LOGGED
        .get_or_init(|| Mutex::new(HashSet::new()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if seen.insert(raw.to_string()) {
        log::warn!("Unparseable version requirement '{raw}', treating as accept-any");
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl FromStr for VersionRequirement {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(VersionRequirement::parse(s))
    }
}

impl Serialize for VersionRequirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}
