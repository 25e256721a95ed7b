//! Render model for the dashboard: cost estimate, prioritized findings and
//! negotiation guide derived from a stored analysis.

use std::collections::BTreeMap;

use serde::Serialize;

use super::analysis::{Category, Finding, InspectionAnalysis, MAX_URGENCY, MIN_URGENCY};

/// Findings at or above this urgency are worth a repair credit request
pub const NEGOTIATION_URGENCY_THRESHOLD: i32 = 4;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportView {
    pub property_address: String,
    pub cost_estimate: CostEstimate,
    pub prioritized_findings: Vec<PrioritizedFinding>,
    pub negotiation_guide: NegotiationGuide,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub total: i64,
    /// Descending by amount
    pub by_category: Vec<CategoryTotal>,
    /// Ascending by urgency, every level present
    pub by_urgency: Vec<UrgencyTotal>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: Category,
    pub total: i64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UrgencyTotal {
    pub urgency: i32,
    pub total: i64,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrioritizedFinding {
    pub priority: &'static str,
    #[serde(flatten)]
    pub finding: Finding,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationGuide {
    pub recommended_credit: i64,
    pub leverage_points: Vec<Finding>,
    pub talking_points: Vec<String>,
}

pub fn priority_label(urgency: i32) -> &'static str {
    match urgency {
        u if u >= 5 => "critical",
        4 => "high",
        3 => "medium",
        2 => "low",
        _ => "cosmetic",
    }
}

impl ReportView {
    pub fn from_analysis(analysis: &InspectionAnalysis) -> Self {
        let mut ordered = analysis.findings.clone();
        // Stable sort keeps report order among equal findings
        ordered.sort_by(|a, b| {
            b.urgency
                .cmp(&a.urgency)
                .then_with(|| b.estimate.cmp(&a.estimate))
        });

        let leverage_points: Vec<Finding> = ordered
            .iter()
            .filter(|f| f.urgency >= NEGOTIATION_URGENCY_THRESHOLD)
            .cloned()
            .collect();

        let talking_points = leverage_points
            .iter()
            .map(|f| {
                format!(
                    "{}: {}. Recommended: {} (estimated ${}).",
                    f.item,
                    f.issue.trim_end_matches('.'),
                    f.recommendation.trim_end_matches('.'),
                    f.estimate
                )
            })
            .collect();

        let negotiation_guide = NegotiationGuide {
            recommended_credit: sum_estimates(leverage_points.iter()),
            leverage_points,
            talking_points,
        };

        let prioritized_findings = ordered
            .into_iter()
            .map(|finding| PrioritizedFinding {
                priority: priority_label(finding.urgency),
                finding,
            })
            .collect();

        ReportView {
            property_address: analysis.property.address.clone(),
            cost_estimate: cost_estimate(&analysis.findings),
            prioritized_findings,
            negotiation_guide,
        }
    }
}

fn sum_estimates<'a>(findings: impl Iterator<Item = &'a Finding>) -> i64 {
    findings.fold(0i64, |total, f| total.saturating_add(f.estimate))
}

fn cost_estimate(findings: &[Finding]) -> CostEstimate {
    let mut categories: BTreeMap<Category, (i64, usize)> = BTreeMap::new();
    for finding in findings {
        let entry = categories.entry(finding.category).or_default();
        entry.0 = entry.0.saturating_add(finding.estimate);
        entry.1 += 1;
    }

    let mut by_category: Vec<CategoryTotal> = categories
        .into_iter()
        .map(|(category, (total, count))| CategoryTotal {
            category,
            total,
            count,
        })
        .collect();
    by_category.sort_by(|a, b| b.total.cmp(&a.total));

    let by_urgency = (MIN_URGENCY..=MAX_URGENCY)
        .map(|urgency| {
            let matching = findings.iter().filter(|f| f.urgency == urgency);
            UrgencyTotal {
                urgency,
                total: sum_estimates(matching.clone()),
                count: matching.count(),
            }
        })
        .collect();

    CostEstimate {
        total: sum_estimates(findings.iter()),
        by_category,
        by_urgency,
    }
}
