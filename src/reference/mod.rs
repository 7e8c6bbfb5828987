// src/reference/mod.rs

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::info;

const BUILTIN_TABLES: &str = include_str!("sanctions.toml");

/// Ordered risk scale. `Ord` follows declaration order: LOW < MEDIUM < HIGH < CRITICAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SanctionStatus {
    ComprehensiveSanctions,
    SectoralSanctions,
    RegionalSanctions,
    TargetedSanctions,
    PartialSanctions,
}

impl fmt::Display for SanctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SanctionStatus::ComprehensiveSanctions => "COMPREHENSIVE_SANCTIONS",
            SanctionStatus::SectoralSanctions => "SECTORAL_SANCTIONS",
            SanctionStatus::RegionalSanctions => "REGIONAL_SANCTIONS",
            SanctionStatus::TargetedSanctions => "TARGETED_SANCTIONS",
            SanctionStatus::PartialSanctions => "PARTIAL_SANCTIONS",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanctionEntry {
    #[serde(rename = "name")]
    pub canonical_name: String,
    pub status: SanctionStatus,
    pub risk_level: RiskLevel,
    pub blocked: bool,
    #[serde(default)]
    pub authorities: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub details: String,
}

/// Ports only carry the two upper levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortRisk {
    High,
    Critical,
}

impl PortRisk {
    pub fn level(self) -> RiskLevel {
        match self {
            PortRisk::High => RiskLevel::High,
            PortRisk::Critical => RiskLevel::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortRiskEntry {
    pub country: String,
    #[serde(rename = "risk")]
    pub risk_level: PortRisk,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("failed to read reference tables {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse reference tables: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("'{0}' is blocked but not rated CRITICAL")]
    BlockedBelowCritical(String),

    #[error("dual-use keyword list contains an empty entry")]
    EmptyKeyword,
}

#[derive(Deserialize)]
struct TableFile {
    #[serde(default)]
    dual_use_keywords: Vec<String>,
    #[serde(default)]
    countries: BTreeMap<String, SanctionEntry>,
    #[serde(default)]
    ports: BTreeMap<String, PortRiskEntry>,
}

/// Lowercase + trim, the only normalization applied to country and port names.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Read-only lookup tables for the compliance check. Built once and handed to
/// the evaluator; tests substitute their own tables through [`ReferenceData::from_toml`].
#[derive(Debug, Clone)]
pub struct ReferenceData {
    countries: HashMap<String, SanctionEntry>,
    ports: HashMap<String, PortRiskEntry>,
    dual_use_keywords: Vec<String>,
}

impl ReferenceData {
    /// The tables shipped with the crate.
    pub fn builtin() -> Result<Self, ReferenceError> {
        Self::from_toml(BUILTIN_TABLES)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ReferenceError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let data = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            countries = data.countries.len(),
            ports = data.ports.len(),
            keywords = data.dual_use_keywords.len(),
            "Loaded reference tables"
        );
        Ok(data)
    }

    pub fn from_toml(content: &str) -> Result<Self, ReferenceError> {
        let file: TableFile = toml::from_str(content)?;

        let mut countries = HashMap::new();
        for (key, entry) in file.countries {
            if entry.blocked && entry.risk_level != RiskLevel::Critical {
                return Err(ReferenceError::BlockedBelowCritical(entry.canonical_name));
            }
            countries.insert(normalize_name(&key), entry);
        }

        let ports = file
            .ports
            .into_iter()
            .map(|(key, entry)| (normalize_name(&key), entry))
            .collect();

        let dual_use_keywords = file
            .dual_use_keywords
            .iter()
            .map(|k| normalize_name(k))
            .collect::<Vec<_>>();
        if dual_use_keywords.iter().any(String::is_empty) {
            return Err(ReferenceError::EmptyKeyword);
        }

        Ok(Self {
            countries,
            ports,
            dual_use_keywords,
        })
    }

    /// A miss means "no known sanction", not an error.
    pub fn country(&self, name: &str) -> Option<&SanctionEntry> {
        self.countries.get(&normalize_name(name))
    }

    pub fn port(&self, name: &str) -> Option<&PortRiskEntry> {
        self.ports.get(&normalize_name(name))
    }

    /// First dual-use keyword contained in the description, if any.
    pub fn dual_use_match(&self, product_description: &str) -> Option<&str> {
        let lowered = product_description.to_lowercase();
        self.dual_use_keywords
            .iter()
            .find(|k| lowered.contains(k.as_str()))
            .map(String::as_str)
    }

    pub fn dual_use_keywords(&self) -> &[String] {
        &self.dual_use_keywords
    }

    /// Display names of every sanctioned country, deduplicated and sorted.
    pub fn sanctioned_country_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .countries
            .values()
            .map(|e| e.canonical_name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn critical_risk_countries(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .countries
            .values()
            .filter(|e| e.risk_level == RiskLevel::Critical)
            .map(|e| e.canonical_name.as_str())
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_tables_parse() {
        let data = ReferenceData::builtin().unwrap();
        let iran = data.country("Iran").unwrap();
        assert_eq!(iran.risk_level, RiskLevel::Critical);
        assert!(iran.blocked);
        assert!(!iran.sources.is_empty());
        assert_eq!(
            data.port("  Bandar Abbas ").unwrap().risk_level,
            PortRisk::Critical
        );
        assert_eq!(data.dual_use_keywords().len(), 16);
    }

    #[test]
    fn test_lookup_miss_is_none() {
        let data = ReferenceData::builtin().unwrap();
        assert!(data.country("United Arab Emirates").is_none());
        assert!(data.port("Jebel Ali").is_none());
        assert!(data.country("").is_none());
    }

    #[test]
    fn test_risk_ordering() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
        assert_eq!(RiskLevel::High.max(RiskLevel::Medium), RiskLevel::High);
    }

    #[test]
    fn test_dual_use_substring_match() {
        let data = ReferenceData::builtin().unwrap();
        assert_eq!(data.dual_use_match("Military Drone components"), Some("military"));
        assert_eq!(data.dual_use_match("Cotton yarn"), None);
    }

    #[test]
    fn test_listings() {
        let data = ReferenceData::builtin().unwrap();
        let names = data.sanctioned_country_names();
        assert_eq!(
            names.iter().filter(|n| **n == "Myanmar (Burma)").count(),
            1
        );
        let critical = data.critical_risk_countries();
        assert!(critical.contains(&"Iran"));
        assert!(!critical.contains(&"Russia"));
    }

    #[test]
    fn test_fixture_tables() {
        let data = ReferenceData::from_toml(
            r#"
            dual_use_keywords = ["Laser"]

            [countries."Atlantis "]
            name = "Atlantis"
            status = "TARGETED_SANCTIONS"
            risk_level = "MEDIUM"
            blocked = false

            [ports.Poseidonia]
            country = "Atlantis"
            risk = "HIGH"
            reason = "Fixture port"
            "#,
        )
        .unwrap();
        assert_eq!(data.country("atlantis").unwrap().canonical_name, "Atlantis");
        assert!(data.port("poseidonia").is_some());
        assert_eq!(data.dual_use_match("industrial LASER cutter"), Some("laser"));
    }

    #[test]
    fn test_blocked_must_be_critical() {
        let err = ReferenceData::from_toml(
            r#"
            [countries.nowhere]
            name = "Nowhere"
            status = "SECTORAL_SANCTIONS"
            risk_level = "HIGH"
            blocked = true
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ReferenceError::BlockedBelowCritical(_)));
    }
}
