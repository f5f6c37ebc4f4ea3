//! Pattern-based PHI detection, scoring and masking.
//!
//! Each category contributes its weight once, however many times it matches.
//! Scores are summed in hundredths and capped at 1.0.

use regex::Regex;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhiCategory {
    IdentifierNumber,
    DateOfBirth,
    Phone,
    Email,
    PostalCode,
    MedicalRecordNumber,
    MentalHealth,
    NameWithTitle,
}

impl PhiCategory {
    /// Tag used inside redaction markers.
    pub fn tag(self) -> &'static str {
        match self {
            PhiCategory::IdentifierNumber => "SSN",
            PhiCategory::DateOfBirth => "DOB",
            PhiCategory::Phone => "PHONE",
            PhiCategory::Email => "EMAIL",
            PhiCategory::PostalCode => "POSTAL_CODE",
            PhiCategory::MedicalRecordNumber => "MRN",
            PhiCategory::MentalHealth => "MENTAL_HEALTH",
            PhiCategory::NameWithTitle => "NAME",
        }
    }

    /// Risk weight in hundredths.
    fn weight(self) -> u32 {
        match self {
            PhiCategory::IdentifierNumber => 50,
            PhiCategory::DateOfBirth => 30,
            PhiCategory::Phone => 20,
            PhiCategory::Email => 20,
            PhiCategory::PostalCode => 10,
            PhiCategory::MedicalRecordNumber => 50,
            PhiCategory::MentalHealth => 30,
            PhiCategory::NameWithTitle => 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Minimal,
    Moderate,
    High,
    Critical,
}

impl RiskLevel {
    fn from_hundredths(score: u32) -> Self {
        if score >= 80 {
            RiskLevel::Critical
        } else if score >= 50 {
            RiskLevel::High
        } else if score >= 30 {
            RiskLevel::Moderate
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Minimal => "minimal",
            RiskLevel::Moderate => "moderate",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub types: Vec<PhiCategory>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub masked_content: String,
}

impl Detection {
    pub fn phi_detected(&self) -> bool {
        !self.types.is_empty()
    }
}

pub struct PhiDetector {
    patterns: Vec<(PhiCategory, Regex)>,
}

impl PhiDetector {
    pub fn new() -> Result<Self, regex::Error> {
        let table: [(PhiCategory, &str); 8] = [
            (PhiCategory::IdentifierNumber, r"\b\d{3}[- ]\d{2}[- ]\d{4}\b"),
            (
                PhiCategory::DateOfBirth,
                r"(?i)\b(?:(?:dob|date of birth|born(?: on)?)\s*[:\-]?\s*)?(?:\d{1,2}[/-]\d{1,2}[/-]\d{4}|\d{4}-\d{2}-\d{2})\b",
            ),
            (
                PhiCategory::Phone,
                r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b",
            ),
            (PhiCategory::Email, r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"),
            (
                PhiCategory::PostalCode,
                r"(?i)\b(?:zip(?: code)?|postal code|postcode)\s*[:#]?\s*\d{5}(?:-\d{4})?\b",
            ),
            (
                PhiCategory::MedicalRecordNumber,
                r"(?i)\b(?:mrn|medical record(?: number| no\.?)?|patient id)\s*[:#]?\s*[A-Z0-9][A-Z0-9-]{3,}\b",
            ),
            (
                PhiCategory::MentalHealth,
                r"(?i)\b(?:depress(?:ion|ed)|anxiety|suicid(?:e|al)|bipolar|schizophreni[ac]|ptsd|self[- ]harm|panic attacks?|eating disorder)\b",
            ),
            (
                PhiCategory::NameWithTitle,
                r"\b(?:Mr|Mrs|Ms|Miss|Dr|Prof)\.?\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?\b",
            ),
        ];

        let patterns = table
            .into_iter()
            .map(|(category, pattern)| Ok((category, Regex::new(pattern)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { patterns })
    }

    pub fn detect(&self, content: &str) -> Detection {
        let mut spans: Vec<(usize, usize, PhiCategory)> = Vec::new();
        let mut types: Vec<PhiCategory> = Vec::new();

        for (category, regex) in &self.patterns {
            let before = spans.len();
            spans.extend(regex.find_iter(content).map(|m| (m.start(), m.end(), *category)));
            if spans.len() > before {
                types.push(*category);
            }
        }

        let score: u32 = types.iter().map(|c| c.weight()).sum::<u32>().min(100);
        Detection {
            masked_content: mask(content, spans),
            risk_score: f64::from(score) / 100.0,
            risk_level: RiskLevel::from_hundredths(score),
            types,
        }
    }
}

/// Replace matched spans with `[REDACTED:<TAG>]`. Overlapping spans are merged
/// into the earliest (longest on ties) match.
fn mask(content: &str, mut spans: Vec<(usize, usize, PhiCategory)>) -> String {
    if spans.is_empty() {
        return content.to_string();
    }
    spans.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for (start, end, category) in spans {
        if start < cursor {
            cursor = cursor.max(end);
            continue;
        }
        out.push_str(&content[cursor..start]);
        out.push_str("[REDACTED:");
        out.push_str(category.tag());
        out.push(']');
        cursor = end;
    }
    out.push_str(&content[cursor..]);
    out
}
