//! Generic "metric exceeds threshold" rules.

use crate::errors::SmellResult;
use crate::models::{Severity, Violation};
use crate::rules::{ContextKey, Rule, RuleContext};

/// One measured item drawn from a [`RuleContext`].
#[derive(Clone, Debug, PartialEq)]
pub struct Measured<'a> {
    pub name: &'a str,
    pub line: i64,
    pub value: i64,
    pub source: Option<&'a str>,
}

/// What a threshold rule measures and how it words its findings.
pub trait ThresholdMetric: Send + Sync {
    fn rule_name(&self) -> &'static str;

    fn context_key(&self) -> ContextKey;

    fn measure<'a>(&self, context: &'a RuleContext) -> Vec<Measured<'a>>;

    fn description(&self, threshold: i64) -> String;

    fn format_snippet(&self, name: &str) -> String;

    fn format_message(&self, value: i64, threshold: i64) -> String;
}

/// Severity band for `value` against `threshold`; `None` when not exceeded.
pub fn severity_for(value: i64, threshold: i64) -> Option<Severity> {
    if value > threshold.saturating_mul(3) {
        Some(Severity::Critical)
    } else if value > threshold.saturating_mul(2) {
        Some(Severity::High)
    } else if value > threshold {
        Some(Severity::Medium)
    } else {
        None
    }
}

pub struct ThresholdRule<M> {
    metric: M,
    threshold: i64,
}

impl<M: ThresholdMetric> ThresholdRule<M> {
    pub fn new(metric: M, threshold: i64) -> Self {
        Self { metric, threshold }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

impl<M: ThresholdMetric> Rule for ThresholdRule<M> {
    fn name(&self) -> &str {
        self.metric.rule_name()
    }

    fn description(&self) -> String {
        self.metric.description(self.threshold)
    }

    fn analyze(&self, file_path: &str, context: &RuleContext) -> SmellResult<Vec<Violation>> {
        let label = self.metric.context_key().label();
        let violations = self
            .metric
            .measure(context)
            .into_iter()
            .filter_map(|item| {
                let severity = severity_for(item.value, self.threshold)?;
                let snippet = match item.source {
                    Some(text) if !text.trim().is_empty() => text.to_string(),
                    _ => self.metric.format_snippet(item.name),
                };
                Some(
                    Violation::new(
                        self.metric.rule_name(),
                        severity,
                        file_path,
                        item.line,
                        snippet,
                        self.metric.format_message(item.value, self.threshold),
                    )
                    .with_context(format!("{label}: {}", item.name)),
                )
            })
            .collect();
        Ok(violations)
    }
}

// ---------------------------------------------------------------------------
// Instances
// ---------------------------------------------------------------------------

/// Cyclomatic complexity per function.
pub struct ComplexityMetric;

impl ThresholdMetric for ComplexityMetric {
    fn rule_name(&self) -> &'static str {
        "COMPLEXITY"
    }

    fn context_key(&self) -> ContextKey {
        ContextKey::Functions
    }

    fn measure<'a>(&self, context: &'a RuleContext) -> Vec<Measured<'a>> {
        context
            .functions
            .iter()
            .map(|f| Measured {
                name: &f.record.name,
                line: f.record.start_line,
                value: f.record.cyclomatic_complexity,
                source: f.source.as_deref(),
            })
            .collect()
    }

    fn description(&self, threshold: i64) -> String {
        format!("Functions should have cyclomatic complexity <= {threshold}")
    }

    fn format_snippet(&self, name: &str) -> String {
        format!("def {name}(...):")
    }

    fn format_message(&self, value: i64, threshold: i64) -> String {
        format!("Function has complexity {value} (threshold: {threshold})")
    }
}

/// Method count per type.
pub struct GodObjectMetric;

impl ThresholdMetric for GodObjectMetric {
    fn rule_name(&self) -> &'static str {
        "GOD_CLASS"
    }

    fn context_key(&self) -> ContextKey {
        ContextKey::Types
    }

    fn measure<'a>(&self, context: &'a RuleContext) -> Vec<Measured<'a>> {
        context
            .types
            .iter()
            .map(|t| Measured {
                name: &t.record.name,
                line: t.record.start_line,
                value: t.record.method_count,
                source: t.source.as_deref(),
            })
            .collect()
    }

    fn description(&self, threshold: i64) -> String {
        format!("Classes should have <= {threshold} methods")
    }

    fn format_snippet(&self, name: &str) -> String {
        format!("class {name}:")
    }

    fn format_message(&self, value: i64, threshold: i64) -> String {
        format!("Class has {value} methods (threshold: {threshold})")
    }
}
