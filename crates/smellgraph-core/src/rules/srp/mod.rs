//! Composite single-responsibility rule.
//!
//! A type is only scored once its method count exceeds three times the
//! concern tolerance of its layer. Four signals are then combined:
//! semantic clusters of method signatures, concern domains of the file's
//! imports, verb categories of method names, and the raw method-count ratio.

pub mod dependency;
pub mod naming;
pub mod scorer;
pub mod semantic;

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::embedding::Embedder;
use crate::errors::SmellResult;
use crate::models::{SrpScoreBreakdown, Violation};
use crate::rules::{Rule, RuleContext, TypeItem};

use scorer::{calculate_score, SrpSignals};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tolerance {
    /// The layer is never checked.
    Exempt,
    Expected(u32),
}

pub struct SrpRule {
    layer_tolerances: IndexMap<String, u32>,
    exempt_layers: Vec<String>,
    default_tolerance: u32,
    embedder: Arc<dyn Embedder>,
}

impl SrpRule {
    pub fn from_config(config: &AnalysisConfig, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            layer_tolerances: config.layer_tolerances.clone(),
            exempt_layers: config.exempt_layers.clone(),
            default_tolerance: config.default_tolerance.max(1),
            embedder,
        }
    }

    /// Tolerance implied by path keywords. Exempt layers win over every
    /// other keyword; otherwise the first configured layer found applies.
    pub fn tolerance_for(&self, file_path: &str) -> Tolerance {
        let path = file_path.to_lowercase();
        if self
            .exempt_layers
            .iter()
            .any(|layer| path.contains(&layer.to_lowercase()))
        {
            return Tolerance::Exempt;
        }
        self.layer_tolerances
            .iter()
            .find(|(layer, _)| path.contains(&layer.to_lowercase()))
            .map(|(_, tolerance)| Tolerance::Expected(*tolerance))
            .unwrap_or(Tolerance::Expected(self.default_tolerance))
    }

    pub fn layer_name(&self, file_path: &str) -> &str {
        let path = file_path.to_lowercase();
        self.layer_tolerances
            .keys()
            .find(|layer| path.contains(&layer.to_lowercase()))
            .map(String::as_str)
            .unwrap_or("default")
    }

    /// Score one type against the imports of its file.
    pub fn score_type(
        &self,
        item: &TypeItem,
        tolerance: u32,
        file_path: &str,
        imports: &[String],
    ) -> SrpScoreBreakdown {
        let clusters = semantic::analyze_methods(self.embedder.as_ref(), &item.method_names);
        let concerns = dependency::analyze_imports(imports);
        let categories = naming::extract_verb_categories(&item.method_names);

        calculate_score(SrpSignals {
            semantic_diversity: clusters.diversity,
            dependency_diversity: dependency::dependency_diversity(concerns.len()),
            naming_diversity: naming::naming_diversity(&categories),
            method_count: item.record.method_count.max(0) as usize,
            expected_tolerance: tolerance,
            num_semantic_clusters: clusters.cluster_count,
            num_dependency_concerns: concerns.len(),
            num_naming_categories: categories.len(),
            layer_violations: dependency::check_layer_violations(file_path, imports),
        })
    }
}

impl Rule for SrpRule {
    fn name(&self) -> &str {
        "SRP"
    }

    fn description(&self) -> String {
        "Single Responsibility Principle - classes should have one reason to change".to_string()
    }

    fn analyze(&self, file_path: &str, context: &RuleContext) -> SmellResult<Vec<Violation>> {
        let tolerance = match self.tolerance_for(file_path) {
            Tolerance::Exempt => {
                debug!("Skipping SRP for exempt layer file {file_path}");
                return Ok(Vec::new());
            }
            Tolerance::Expected(tolerance) => tolerance,
        };
        let imports = context.import_modules();

        let mut violations = Vec::new();
        for item in &context.types {
            if item.record.method_count <= i64::from(tolerance) * 3 {
                continue;
            }
            let score = self.score_type(item, tolerance, file_path, &imports);
            let Some(severity) = score.severity() else {
                continue;
            };
            let snippet = match item.source.as_deref() {
                Some(text) if !text.trim().is_empty() => text.to_string(),
                _ => format!("class {}:", item.record.name),
            };
            violations.push(
                Violation::new(
                    self.name(),
                    severity,
                    file_path,
                    item.record.start_line,
                    snippet,
                    score.explanation(),
                )
                .with_context(format!(
                    "Expected tolerance: {tolerance} concerns in {} layer, SRP score: {:.2}",
                    self.layer_name(file_path),
                    score.total
                )),
            );
        }
        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImportStatement, Severity, TypeRecord};
    use crate::rules::srp::semantic::tests::AxisEmbedder;

    fn rule() -> SrpRule {
        SrpRule::from_config(&AnalysisConfig::default(), Arc::new(AxisEmbedder))
    }

    fn item(name: &str, methods: &[&str]) -> TypeItem {
        let mut record = TypeRecord::new("x.py", name, 4, 80);
        record.method_count = methods.len() as i64;
        TypeItem {
            record,
            method_names: methods.iter().map(|m| m.to_string()).collect(),
            source: None,
        }
    }

    fn imports(modules: &[&str]) -> Vec<ImportStatement> {
        modules
            .iter()
            .map(|m| ImportStatement::new(*m, vec![m.to_string()]))
            .collect()
    }

    #[test]
    fn tolerance_from_path_keywords() {
        let rule = rule();
        assert_eq!(rule.tolerance_for("app/domain/order.py"), Tolerance::Expected(1));
        assert_eq!(rule.tolerance_for("app/Entity/user.py"), Tolerance::Expected(1));
        assert_eq!(rule.tolerance_for("app/controllers/api.py"), Tolerance::Expected(3));
        assert_eq!(rule.tolerance_for("app/services/billing.py"), Tolerance::Expected(5));
        assert_eq!(rule.tolerance_for("app/utils.py"), Tolerance::Expected(3));
        assert_eq!(rule.tolerance_for("legacy/domain/order.py"), Tolerance::Exempt);
        assert_eq!(rule.layer_name("app/services/billing.py"), "service");
    }

    #[test]
    fn exempt_layer_is_skipped_entirely() {
        let mut ctx = RuleContext::new("legacy/big.py");
        ctx.types = vec![item("Big", &["save_a"; 40])];
        assert!(rule().analyze("legacy/big.py", &ctx).unwrap().is_empty());
    }

    #[test]
    fn small_types_are_not_scored() {
        let mut ctx = RuleContext::new("app/services/billing.py");
        ctx.types = vec![item("Billing", &["save_a", "send_b", "validate_c", "run_d"])];
        ctx.imports = imports(&["sqlalchemy", "requests", "json", "redis"]);
        assert!(rule().analyze("app/services/billing.py", &ctx).unwrap().is_empty());
    }

    #[test]
    fn scattered_controller_type_is_reported() {
        let methods = [
            "save_user",
            "load_user",
            "send_email",
            "notify_admin",
            "validate_email",
            "check_quota",
            "run_report",
            "handle_hook",
            "save_audit",
            "send_sms",
            "validate_phone",
            "handle_retry",
        ];
        let mut ctx = RuleContext::new("app/controllers/users.py");
        ctx.types = vec![item("UserController", &methods)];
        ctx.imports = imports(&["sqlalchemy.orm", "requests", "json", "redis"]);

        let found = rule().analyze("app/controllers/users.py", &ctx).unwrap();
        assert_eq!(found.len(), 1);
        let violation = &found[0];
        assert_eq!(violation.rule_name, "SRP");
        // Layer violation boost pushes this past 0.9.
        assert_eq!(violation.severity, Severity::Critical);
        assert!(violation.message.starts_with("Likely multiple responsibilities: "));
        assert!(violation
            .message
            .contains("Controller imports database directly: sqlalchemy.orm"));
        assert_eq!(violation.code_snippet, "class UserController:");
        assert_eq!(violation.line_number, 4);
    }
}
