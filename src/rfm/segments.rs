//! Behavioral segment and churn-risk classification.
//!
//! Maps a customer's (recency, frequency, monetary) quartile scores to a
//! named segment and a churn-risk tier. Segments come from an ordered rule
//! table scanned first-match-wins; churn risk uses a separate, shorter
//! ladder driven by recency and frequency only.

use serde::{Deserialize, Serialize};

/// Named behavioral segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    Champions,
    LoyalCustomers,
    PotentialLoyalists,
    NewCustomers,
    Promising,
    NeedAttention,
    AboutToSleep,
    AtRisk,
    CannotLoseThem,
    Hibernating,
    Lost,
    /// Fallback when no rule matches.
    Other,
}

impl Segment {
    /// Display name, as stored and reported.
    pub fn name(&self) -> &'static str {
        match self {
            Segment::Champions => "Champions",
            Segment::LoyalCustomers => "Loyal Customers",
            Segment::PotentialLoyalists => "Potential Loyalists",
            Segment::NewCustomers => "New Customers",
            Segment::Promising => "Promising",
            Segment::NeedAttention => "Need Attention",
            Segment::AboutToSleep => "About to Sleep",
            Segment::AtRisk => "At Risk",
            Segment::CannotLoseThem => "Cannot Lose Them",
            Segment::Hibernating => "Hibernating",
            Segment::Lost => "Lost",
            Segment::Other => "Other",
        }
    }

    /// Parse the display name back into a segment.
    pub fn parse(s: &str) -> Option<Self> {
        ALL_SEGMENTS.iter().copied().find(|seg| seg.name() == s)
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Every segment, fallback included.
pub const ALL_SEGMENTS: &[Segment] = &[
    Segment::Champions,
    Segment::LoyalCustomers,
    Segment::PotentialLoyalists,
    Segment::NewCustomers,
    Segment::Promising,
    Segment::NeedAttention,
    Segment::AboutToSleep,
    Segment::AtRisk,
    Segment::CannotLoseThem,
    Segment::Hibernating,
    Segment::Lost,
    Segment::Other,
];

/// Churn-risk tier, derived from recency and frequency scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChurnRisk {
    HighRisk,
    MediumRisk,
    LowRisk,
    NoRisk,
}

impl ChurnRisk {
    /// Display name, as stored and reported.
    pub fn name(&self) -> &'static str {
        match self {
            ChurnRisk::HighRisk => "High Risk",
            ChurnRisk::MediumRisk => "Medium Risk",
            ChurnRisk::LowRisk => "Low Risk",
            ChurnRisk::NoRisk => "No Risk",
        }
    }

    /// Parse the display name back into a risk tier.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "High Risk" => Some(ChurnRisk::HighRisk),
            "Medium Risk" => Some(ChurnRisk::MediumRisk),
            "Low Risk" => Some(ChurnRisk::LowRisk),
            "No Risk" => Some(ChurnRisk::NoRisk),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChurnRisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One entry in the ordered segment rule table.
pub struct SegmentRule {
    /// Segment assigned when the predicate matches.
    pub segment: Segment,
    /// Predicate over (recency_score, frequency_score, monetary_score).
    pub matches: fn(u8, u8, u8) -> bool,
}

/// The segment rule table, scanned top to bottom, first match wins.
///
/// Hibernating (M 1..=3) sits above Lost (M <= 2), so the Lost rule is
/// shadowed for every score it covers. The published table orders them this
/// way; the order is kept as-is rather than repaired.
pub const SEGMENT_RULES: &[SegmentRule] = &[
    SegmentRule {
        segment: Segment::Champions,
        matches: |r, f, m| r >= 3 && f >= 3 && m >= 3,
    },
    SegmentRule {
        segment: Segment::LoyalCustomers,
        matches: |r, f, m| f >= 3 && m >= 3 && (1..=2).contains(&r),
    },
    SegmentRule {
        segment: Segment::PotentialLoyalists,
        matches: |r, f, m| r >= 3 && (2..=3).contains(&f) && (2..=3).contains(&m),
    },
    SegmentRule {
        segment: Segment::NewCustomers,
        matches: |r, f, m| r >= 3 && f <= 2 && m <= 2,
    },
    SegmentRule {
        segment: Segment::Promising,
        matches: |r, f, m| (2..=3).contains(&r) && f <= 2 && (2..=3).contains(&m),
    },
    SegmentRule {
        segment: Segment::NeedAttention,
        matches: |r, f, m| (2..=3).contains(&r) && (2..=3).contains(&f) && m <= 2,
    },
    SegmentRule {
        segment: Segment::AboutToSleep,
        matches: |r, f, m| r <= 2 && (2..=3).contains(&f) && (2..=3).contains(&m),
    },
    SegmentRule {
        segment: Segment::AtRisk,
        matches: |r, f, m| r <= 2 && (2..=3).contains(&f) && m >= 3,
    },
    SegmentRule {
        segment: Segment::CannotLoseThem,
        matches: |r, f, m| r <= 2 && f >= 3 && m >= 3,
    },
    SegmentRule {
        segment: Segment::Hibernating,
        matches: |r, f, m| r <= 2 && f <= 2 && (1..=3).contains(&m),
    },
    SegmentRule {
        segment: Segment::Lost,
        matches: |r, f, m| r <= 2 && f <= 2 && m <= 2,
    },
];

/// Classifies quartile scores into segments and churn-risk tiers.
pub struct SegmentClassifier;

impl SegmentClassifier {
    /// Create a new classifier.
    pub fn new() -> Self {
        Self
    }

    /// Classify a score triple into (segment, churn risk).
    pub fn classify(&self, r: u8, f: u8, m: u8) -> (Segment, ChurnRisk) {
        (self.segment_for(r, f, m), self.churn_risk_for(r, f))
    }

    /// First matching rule in [`SEGMENT_RULES`], or `Other`.
    pub fn segment_for(&self, r: u8, f: u8, m: u8) -> Segment {
        SEGMENT_RULES
            .iter()
            .find(|rule| (rule.matches)(r, f, m))
            .map(|rule| rule.segment)
            .unwrap_or(Segment::Other)
    }

    /// Churn-risk ladder over recency and frequency, first match wins.
    pub fn churn_risk_for(&self, r: u8, f: u8) -> ChurnRisk {
        if r <= 2 && f <= 2 {
            ChurnRisk::HighRisk
        } else if r <= 2 && f == 3 {
            ChurnRisk::MediumRisk
        } else if r == 3 && f <= 2 {
            ChurnRisk::LowRisk
        } else {
            ChurnRisk::NoRisk
        }
    }
}

impl Default for SegmentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_champions() {
        let classifier = SegmentClassifier::new();
        assert_eq!(classifier.segment_for(4, 4, 4), Segment::Champions);
        assert_eq!(classifier.segment_for(3, 3, 3), Segment::Champions);
        assert_eq!(classifier.churn_risk_for(4, 4), ChurnRisk::NoRisk);
    }

    #[test]
    fn test_loyal_vs_cannot_lose_order() {
        let classifier = SegmentClassifier::new();
        // (2,4,4) matches Loyal Customers (rule 2) before Cannot Lose Them
        // (rule 9); order decides.
        assert_eq!(classifier.segment_for(2, 4, 4), Segment::LoyalCustomers);
    }

    #[test]
    fn test_hibernating_shadows_lost() {
        let classifier = SegmentClassifier::new();
        // Everything the Lost rule covers is already claimed by Hibernating.
        assert_eq!(classifier.segment_for(1, 1, 1), Segment::Hibernating);
        assert_eq!(classifier.segment_for(1, 1, 2), Segment::Hibernating);
        assert_eq!(classifier.segment_for(2, 2, 2), Segment::Hibernating);
        for r in 1..=4u8 {
            for f in 1..=4u8 {
                for m in 1..=4u8 {
                    assert_ne!(classifier.segment_for(r, f, m), Segment::Lost);
                }
            }
        }
    }

    #[test]
    fn test_classification_is_total() {
        let classifier = SegmentClassifier::new();
        for r in 1..=4u8 {
            for f in 1..=4u8 {
                for m in 1..=4u8 {
                    let (segment, risk) = classifier.classify(r, f, m);
                    assert!(ALL_SEGMENTS.contains(&segment), "({},{},{})", r, f, m);
                    assert!(ChurnRisk::parse(risk.name()).is_some());
                }
            }
        }
    }

    #[test]
    fn test_selected_segments() {
        let classifier = SegmentClassifier::new();
        assert_eq!(classifier.segment_for(4, 2, 3), Segment::PotentialLoyalists);
        assert_eq!(classifier.segment_for(4, 1, 1), Segment::NewCustomers);
        assert_eq!(classifier.segment_for(2, 1, 3), Segment::Promising);
        assert_eq!(classifier.segment_for(2, 3, 1), Segment::NeedAttention);
        assert_eq!(classifier.segment_for(1, 2, 2), Segment::AboutToSleep);
        assert_eq!(classifier.segment_for(1, 2, 4), Segment::AtRisk);
        // High spend but dormant and infrequent falls through every rule
        assert_eq!(classifier.segment_for(1, 1, 4), Segment::Other);
    }

    #[test]
    fn test_loyal_shadows_cannot_lose_them() {
        let classifier = SegmentClassifier::new();
        // Rule 2 covers the same region as rule 9, so Cannot Lose Them can
        // only surface if the table order changes.
        assert_eq!(classifier.segment_for(1, 4, 4), Segment::LoyalCustomers);
        for r in 1..=4u8 {
            for f in 1..=4u8 {
                for m in 1..=4u8 {
                    assert_ne!(classifier.segment_for(r, f, m), Segment::CannotLoseThem);
                }
            }
        }
    }

    #[test]
    fn test_churn_risk_ladder() {
        let classifier = SegmentClassifier::new();
        assert_eq!(classifier.churn_risk_for(1, 1), ChurnRisk::HighRisk);
        assert_eq!(classifier.churn_risk_for(2, 2), ChurnRisk::HighRisk);
        assert_eq!(classifier.churn_risk_for(2, 3), ChurnRisk::MediumRisk);
        assert_eq!(classifier.churn_risk_for(3, 2), ChurnRisk::LowRisk);
        assert_eq!(classifier.churn_risk_for(3, 3), ChurnRisk::NoRisk);
        // Dormant but very frequent is not on the ladder
        assert_eq!(classifier.churn_risk_for(1, 4), ChurnRisk::NoRisk);
    }

    #[test]
    fn test_name_round_trip() {
        for segment in ALL_SEGMENTS {
            assert_eq!(Segment::parse(segment.name()), Some(*segment));
        }
        assert_eq!(Segment::parse("Nope"), None);

        for risk in [
            ChurnRisk::HighRisk,
            ChurnRisk::MediumRisk,
            ChurnRisk::LowRisk,
            ChurnRisk::NoRisk,
        ] {
            assert_eq!(ChurnRisk::parse(risk.name()), Some(risk));
        }
    }
}
