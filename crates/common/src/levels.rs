use serde::{Deserialize, Serialize};

/// Urgency attached to a stock-low signal.
///
/// Unrecognised values are kept verbatim in [`UrgencyLevel::Other`] so that
/// they survive a round trip and can be grouped in statistics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
    Other(String),
}

impl UrgencyLevel {
    pub fn as_str(&self) -> &str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
            UrgencyLevel::Other(value) => value,
        }
    }
}

impl From<String> for UrgencyLevel {
    fn from(value: String) -> Self {
        match value.as_str() {
            "low" => UrgencyLevel::Low,
            "medium" => UrgencyLevel::Medium,
            "high" => UrgencyLevel::High,
            "critical" => UrgencyLevel::Critical,
            _ => UrgencyLevel::Other(value),
        }
    }
}

impl From<&str> for UrgencyLevel {
    fn from(value: &str) -> Self {
        UrgencyLevel::from(value.to_string())
    }
}

impl From<UrgencyLevel> for String {
    fn from(level: UrgencyLevel) -> Self {
        match level {
            UrgencyLevel::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a cold-chain failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    Other(String),
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
            Severity::Other(value) => value,
        }
    }
}

impl From<String> for Severity {
    fn from(value: String) -> Self {
        match value.as_str() {
            "low" => Severity::Low,
            "medium" => Severity::Medium,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Other(value),
        }
    }
}

impl From<&str> for Severity {
    fn from(value: &str) -> Self {
        Severity::from(value.to_string())
    }
}

impl From<Severity> for String {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Other(value) => value,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_urgency_levels_parse() {
        assert_eq!(UrgencyLevel::from("low"), UrgencyLevel::Low);
        assert_eq!(UrgencyLevel::from("medium"), UrgencyLevel::Medium);
        assert_eq!(UrgencyLevel::from("high"), UrgencyLevel::High);
        assert_eq!(UrgencyLevel::from("critical"), UrgencyLevel::Critical);
    }

    #[test]
    fn unknown_urgency_is_preserved() {
        let level: UrgencyLevel = serde_json::from_str("\"asap\"").unwrap();
        assert_eq!(level, UrgencyLevel::Other("asap".to_string()));
        assert_eq!(serde_json::to_string(&level).unwrap(), "\"asap\"");
    }

    #[test]
    fn severity_parses_from_str() {
        assert_eq!(Severity::from("high"), Severity::High);
        assert_eq!(Severity::from("extreme"), Severity::Other("extreme".to_string()));
    }

    #[test]
    fn severity_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
        let parsed: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }
}
