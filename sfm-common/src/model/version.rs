use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

static CONSTRAINT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([=><]+)\s*(.+)$").unwrap());
static COMPAT_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)\.(\d+)\.(\d+)(.+)$").unwrap());

/// Version comparison operator of a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparator {
    Equal,
    AtLeast,
    AtMost,
}

impl Comparator {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparator::Equal => "==",
            Comparator::AtLeast => ">=",
            Comparator::AtMost => "<=",
        }
    }

    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Comparator::Equal),
            ">=" => Some(Comparator::AtLeast),
            "<=" => Some(Comparator::AtMost),
            _ => None,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single comparator+tag restriction on the acceptable revisions of a
/// formula. The unconstrained value (no comparator, empty tag) means "take
/// the latest stable release".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionConstraint {
    pub comparator: Option<Comparator>,
    pub tag: String,
}

impl VersionConstraint {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn new(comparator: Comparator, tag: impl Into<String>) -> Self {
        Self {
            comparator: Some(comparator),
            tag: tag.into(),
        }
    }

    /// Parse a raw `<comparator><tag>` string. Anything that does not match
    /// the pattern, including the empty string, yields the unconstrained
    /// value rather than an error.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match CONSTRAINT_RE.captures(raw) {
            Some(caps) => match Comparator::from_symbol(&caps[1]) {
                Some(comparator) => Self {
                    comparator: Some(comparator),
                    tag: caps[2].trim().to_string(),
                },
                None => {
                    warn!("Ignoring constraint with unknown comparator '{raw}'");
                    Self::unconstrained()
                }
            },
            None => {
                if !raw.is_empty() {
                    warn!("Ignoring malformed constraint '{raw}'");
                }
                Self::unconstrained()
            }
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.comparator.is_none()
    }

    /// The tag with its leading `v` stripped, or `None` when the tag is not
    /// version-shaped and should be treated as a branch or SHA reference.
    pub fn version(&self) -> Option<&str> {
        self.tag.strip_prefix('v').filter(|v| !v.is_empty())
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.comparator {
            Some(comparator) => write!(f, "{}{}", comparator, self.tag),
            None => Ok(()),
        }
    }
}

/// Decomposition of a `vMAJOR.MINOR.PATCH(-POSTFIX)?` tag. Parsing is
/// all-or-nothing: a tag either yields all three numeric fields or it is not
/// a versioned tag at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemverTag {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub postfix: Option<String>,
    compliant: bool,
}

impl SemverTag {
    /// Try the strict release and prerelease forms first (via the `semver`
    /// crate), then fall back to the lenient `vX.Y.Z<anything>` form seen in
    /// the wild (e.g. `v1.2.3rc1`).
    pub fn parse(tag: &str) -> Option<Self> {
        let bare = tag.strip_prefix('v').unwrap_or(tag);

        if let Ok(version) = semver::Version::parse(bare) {
            let (postfix, compliant) = if !version.pre.is_empty() {
                (Some(version.pre.as_str().to_string()), true)
            } else if !version.build.is_empty() {
                // Build metadata makes it neither a plain release nor a
                // semver prerelease; classify like the lenient form.
                (Some(format!("+{}", version.build)), false)
            } else {
                (None, true)
            };
            return Some(Self {
                major: version.major,
                minor: version.minor,
                patch: version.patch,
                postfix,
                compliant,
            });
        }

        let caps = COMPAT_TAG_RE.captures(bare)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
            postfix: Some(caps[4].to_string()),
            compliant: false,
        })
    }

    pub fn is_release(&self) -> bool {
        self.postfix.is_none()
    }

    pub fn is_prerelease(&self) -> bool {
        self.postfix.is_some()
    }

    /// A semver-compliant prerelease (`v1.2.3-rc1`), as opposed to the
    /// lenient `v1.2.3rc1` form. Only these qualify for "latest tag
    /// including prereleases" selection.
    pub fn is_compliant_prerelease(&self) -> bool {
        self.compliant && self.postfix.is_some()
    }
}

impl Ord for SemverTag {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.postfix, &other.postfix) {
                // A release outranks any prerelease of the same version.
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
            .then_with(|| self.compliant.cmp(&other.compliant))
    }
}

impl PartialOrd for SemverTag {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

pub fn is_tag_release(tag: &str) -> bool {
    SemverTag::parse(tag).map(|t| t.is_release()).unwrap_or(false)
}

pub fn is_tag_prerelease(tag: &str) -> bool {
    SemverTag::parse(tag)
        .map(|t| t.is_prerelease())
        .unwrap_or(false)
}

/// Latest version from a list of bare version strings (`"1.2.3"`). Releases
/// always qualify; semver-compliant prereleases qualify only when
/// `include_prereleases` is set; anything else never does.
pub fn latest_tag(versions: &[String], include_prereleases: bool) -> Option<String> {
    let mut parsed: Vec<(SemverTag, &String)> = versions
        .iter()
        .filter_map(|v| SemverTag::parse(v).map(|t| (t, v)))
        .collect();
    parsed.sort_by(|a, b| a.0.cmp(&b.0));

    for (tag, version) in parsed.iter().rev() {
        if tag.is_release() || (include_prereleases && tag.is_compliant_prerelease()) {
            return Some((*version).clone());
        }
    }
    None
}

/// Order two bare version strings, semantically when both parse as
/// versioned tags and lexicographically otherwise.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (SemverTag::parse(a), SemverTag::parse(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}
