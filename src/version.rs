use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Written into the local manifest by the Classic launcher while an update is pending.
pub const PENDING_UPDATE_SENTINEL: &str = "--";

/// Dotted-integer game version (`major.minor[.build[.revision]]`).
///
/// Components compare numerically, and missing trailing components count as
/// zero, so `1.2` and `1.2.0` are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct GameVersion {
    parts: Vec<u32>,
}

impl GameVersion {
    pub fn zero() -> Self {
        Self { parts: vec![0, 0] }
    }

    fn component(&self, idx: usize) -> u32 {
        self.parts.get(idx).copied().unwrap_or(0)
    }
}

impl FromStr for GameVersion {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let parts = raw
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(format!("invalid version component '{part}' in '{raw}'"));
                }
                part.parse::<u32>()
                    .map_err(|e| format!("invalid version component '{part}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if !(2..=4).contains(&parts.len()) {
            return Err(format!("expected 2 to 4 version components in '{raw}'"));
        }

        Ok(Self { parts })
    }
}

impl TryFrom<String> for GameVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GameVersion> for String {
    fn from(value: GameVersion) -> Self {
        value.to_string()
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".");
        f.write_str(&joined)
    }
}

impl Ord for GameVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        (0..len)
            .map(|idx| self.component(idx).cmp(&other.component(idx)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for GameVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GameVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GameVersion {}

/// What the installed game reports about its own version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "version")]
pub enum LocalVersion {
    Known(GameVersion),
    /// The launcher already knows an update is waiting but not which one.
    PendingUpdate,
}

impl LocalVersion {
    /// `None` for anything that is neither a version nor the pending sentinel.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == PENDING_UPDATE_SENTINEL {
            return Some(LocalVersion::PendingUpdate);
        }
        raw.parse().ok().map(LocalVersion::Known)
    }

    pub fn is_older_than(&self, remote: &GameVersion) -> bool {
        match self {
            LocalVersion::Known(local) => remote > local,
            LocalVersion::PendingUpdate => *remote > GameVersion::zero(),
        }
    }
}

impl fmt::Display for LocalVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalVersion::Known(version) => version.fmt(f),
            LocalVersion::PendingUpdate => f.write_str("unknown (update pending)"),
        }
    }
}

/// Pulls the first `"key": "value"` string out of a JSON-ish document.
///
/// This is a structural scan rather than a parse: it accepts truncated or
/// otherwise malformed documents as long as the field itself is intact.
pub fn read_json_string(json: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let idx = json.find(&needle)?;

    let rest = json[idx + needle.len()..].trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;

    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(raw: &str) -> GameVersion {
        raw.parse().unwrap()
    }

    #[test]
    fn compares_numerically_per_segment() {
        assert!(v("1.10.0") > v("1.9.9"));
        assert!(v("2.0") > v("1.99.99.99"));
        assert!(v("1.2.3.4") > v("1.2.3"));
        assert_eq!(v("1.2"), v("1.2.0.0"));
    }

    #[test]
    fn rejects_malformed_versions() {
        for raw in ["", "1", "1.2.3.4.5", "1..2", "1.x", "v1.2", "-1.2", "1.2 beta"] {
            assert!(raw.parse::<GameVersion>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn local_version_sentinel_means_pending() {
        assert_eq!(LocalVersion::parse("--"), Some(LocalVersion::PendingUpdate));
        assert_eq!(LocalVersion::parse(" 1.8.2 "), Some(LocalVersion::Known(v("1.8.2"))));
        assert_eq!(LocalVersion::parse("garbage"), None);
    }

    #[test]
    fn pending_update_is_older_than_any_real_release() {
        assert!(LocalVersion::PendingUpdate.is_older_than(&v("0.0.1")));
        assert!(!LocalVersion::PendingUpdate.is_older_than(&v("0.0")));
        assert!(!LocalVersion::Known(v("1.9.0")).is_older_than(&v("1.9")));
        assert!(LocalVersion::Known(v("1.9.0")).is_older_than(&v("1.10")));
    }

    #[test]
    fn json_scan_tolerates_whitespace_and_truncation() {
        let doc = r#"{"Name":"cbjq", "GameVersion" :  "2.4.0.1", "Patch": {"#;
        assert_eq!(read_json_string(doc, "GameVersion").as_deref(), Some("2.4.0.1"));
        assert_eq!(read_json_string(doc, "Name").as_deref(), Some("cbjq"));
    }

    #[test]
    fn json_scan_rejects_non_string_or_broken_fields() {
        assert_eq!(read_json_string(r#"{"GameVersion": 2}"#, "GameVersion"), None);
        assert_eq!(read_json_string(r#"{"GameVersion" "2.0"}"#, "GameVersion"), None);
        assert_eq!(read_json_string(r#"{"GameVersion": "2.0"#, "GameVersion"), None);
        assert_eq!(read_json_string("<html>502</html>", "GameVersion"), None);
        assert_eq!(read_json_string(r#"{"GameVersion":"#, "GameVersion"), None);
    }
}
