//! Weighted combination of the SRP signals.

use crate::models::{Severity, SrpScoreBreakdown};

pub const SEMANTIC_WEIGHT: f64 = 0.4;
pub const DEPENDENCY_WEIGHT: f64 = 0.3;
pub const NAMING_WEIGHT: f64 = 0.2;
pub const METHOD_COUNT_WEIGHT: f64 = 0.1;
pub const LAYER_VIOLATION_BOOST: f64 = 0.2;

pub const VIOLATION_THRESHOLD: f64 = 0.7;
const HIGH_THRESHOLD: f64 = 0.8;
const CRITICAL_THRESHOLD: f64 = 0.9;
const SIGNAL_REPORT_THRESHOLD: f64 = 0.5;

/// Raw inputs for one type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SrpSignals {
    pub semantic_diversity: f64,
    pub dependency_diversity: f64,
    pub naming_diversity: f64,
    pub method_count: usize,
    pub expected_tolerance: u32,
    pub num_semantic_clusters: usize,
    pub num_dependency_concerns: usize,
    pub num_naming_categories: usize,
    pub layer_violations: Vec<String>,
}

pub fn method_count_score(method_count: usize, tolerance: u32) -> f64 {
    if tolerance == 0 {
        return 0.0;
    }
    let ratio = method_count as f64 / tolerance as f64;
    if ratio <= 1.0 {
        0.0
    } else if ratio <= 2.0 {
        0.3
    } else {
        (0.6 + (ratio - 2.0) * 0.1).min(1.0)
    }
}

pub fn calculate_score(signals: SrpSignals) -> SrpScoreBreakdown {
    let count_score = method_count_score(signals.method_count, signals.expected_tolerance);
    let boost = if signals.layer_violations.is_empty() {
        0.0
    } else {
        LAYER_VIOLATION_BOOST
    };
    let total = SEMANTIC_WEIGHT * signals.semantic_diversity
        + DEPENDENCY_WEIGHT * signals.dependency_diversity
        + NAMING_WEIGHT * signals.naming_diversity
        + METHOD_COUNT_WEIGHT * count_score
        + boost;

    SrpScoreBreakdown {
        total: total.clamp(0.0, 1.0),
        semantic: signals.semantic_diversity,
        dependency: signals.dependency_diversity,
        naming: signals.naming_diversity,
        method_count_score: count_score,
        num_methods: signals.method_count,
        num_semantic_clusters: signals.num_semantic_clusters,
        num_dependency_concerns: signals.num_dependency_concerns,
        num_naming_categories: signals.num_naming_categories,
        layer_violations: signals.layer_violations,
    }
}

impl SrpScoreBreakdown {
    pub fn is_violation(&self) -> bool {
        self.total >= VIOLATION_THRESHOLD
    }

    /// `None` below the reporting threshold.
    pub fn severity(&self) -> Option<Severity> {
        if self.total >= CRITICAL_THRESHOLD {
            Some(Severity::Critical)
        } else if self.total >= HIGH_THRESHOLD {
            Some(Severity::High)
        } else if self.total >= VIOLATION_THRESHOLD {
            Some(Severity::Medium)
        } else {
            None
        }
    }

    pub fn explanation(&self) -> String {
        let mut reasons = Vec::new();
        if self.semantic > SIGNAL_REPORT_THRESHOLD {
            reasons.push(format!(
                "methods from {} distinct semantic clusters",
                self.num_semantic_clusters
            ));
        }
        if self.dependency > SIGNAL_REPORT_THRESHOLD {
            reasons.push(format!(
                "imports span {} concern domains",
                self.num_dependency_concerns
            ));
        }
        if self.naming > SIGNAL_REPORT_THRESHOLD {
            reasons.push(format!(
                "methods use {} different verb categories",
                self.num_naming_categories
            ));
        }
        if !self.layer_violations.is_empty() {
            reasons.push(format!(
                "violates architectural layers: {}",
                self.layer_violations.join(", ")
            ));
        }
        if reasons.is_empty() {
            return "Class appears to have a single, cohesive responsibility".to_string();
        }
        format!("Likely multiple responsibilities: {}", reasons.join("; "))
    }
}
