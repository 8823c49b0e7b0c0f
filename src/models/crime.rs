use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Street {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeLocation {
    pub latitude: String,
    pub longitude: String,
    pub street: Street,
}

/// One street-level crime report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeRecord {
    pub category: String,
    pub location: CrimeLocation,
    #[serde(default)]
    pub context: Option<String>,
    pub id: i64,
    pub month: String,
}

/// Risk band derived from the number of reports near a postcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CrimeRisk {
    Low,
    Moderate,
    High,
    VeryHigh,
    Extreme,
}

impl CrimeRisk {
    pub fn from_count(count: usize) -> Self {
        match count {
            0..50 => Self::Low,
            50..150 => Self::Moderate,
            150..300 => Self::High,
            300..500 => Self::VeryHigh,
            _ => Self::Extreme,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Low => "Low crime risk in the area.",
            Self::Moderate => "Moderate crime risk.",
            Self::High => "High crime risk.",
            Self::VeryHigh => "Very high crime risk.",
            Self::Extreme => "Extremely high crime risk.",
        }
    }
}

/// Crime counts per category, in the order categories first appear.
#[derive(Debug, Clone, PartialEq)]
pub struct CrimeSummary {
    pub risk: CrimeRisk,
    pub total: usize,
    pub categories: IndexMap<String, usize>,
}

impl CrimeSummary {
    pub fn from_records(records: &[CrimeRecord]) -> Self {
        let mut categories: IndexMap<String, usize> = IndexMap::new();
        for record in records {
            *categories.entry(record.category.clone()).or_default() += 1;
        }

        Self {
            risk: CrimeRisk::from_count(records.len()),
            total: records.len(),
            categories,
        }
    }
}

impl fmt::Display for CrimeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} reports)", self.risk.message(), self.total)?;
        for (category, count) in &self.categories {
            write!(f, "\n- {}: {}", category, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(category: &str) -> CrimeRecord {
        CrimeRecord {
            category: category.to_string(),
            location: CrimeLocation {
                latitude: "52.95".to_string(),
                longitude: "-1.15".to_string(),
                street: Street {
                    id: 1,
                    name: "On or near Parking Area".to_string(),
                },
            },
            context: None,
            id: 7,
            month: "2024-12".to_string(),
        }
    }

    #[test]
    fn test_risk_band_edges() {
        assert_eq!(CrimeRisk::from_count(0), CrimeRisk::Low);
        assert_eq!(CrimeRisk::from_count(49), CrimeRisk::Low);
        assert_eq!(CrimeRisk::from_count(50), CrimeRisk::Moderate);
        assert_eq!(CrimeRisk::from_count(149), CrimeRisk::Moderate);
        assert_eq!(CrimeRisk::from_count(150), CrimeRisk::High);
        assert_eq!(CrimeRisk::from_count(299), CrimeRisk::High);
        assert_eq!(CrimeRisk::from_count(300), CrimeRisk::VeryHigh);
        assert_eq!(CrimeRisk::from_count(499), CrimeRisk::VeryHigh);
        assert_eq!(CrimeRisk::from_count(500), CrimeRisk::Extreme);
    }

    #[test]
    fn test_summary_counts_categories_in_first_seen_order() {
        let records = vec![
            record("burglary"),
            record("anti-social-behaviour"),
            record("burglary"),
        ];

        let summary = CrimeSummary::from_records(&records);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.risk, CrimeRisk::Low);
        let categories: Vec<(&str, usize)> = summary
            .categories
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(categories, vec![("burglary", 2), ("anti-social-behaviour", 1)]);
    }

    #[test]
    fn test_record_without_context_field() {
        let json = r#"{
            "category": "vehicle-crime",
            "location": {"latitude": "52.9", "longitude": "-1.1", "street": {"id": 5, "name": "High St"}},
            "id": 99,
            "month": "2025-01"
        }"#;

        let record: CrimeRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.context, None);
        assert_eq!(record.location.street.name, "High St");
    }
}
