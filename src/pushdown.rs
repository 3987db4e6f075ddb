//! Rewrites document filters into range/point predicates over shredded
//! columns, then uses row-group statistics to decide which row groups can
//! be skipped without reading them.

use crate::filter::{CompareOp, Filter};
use serde_json::Value;
use std::collections::HashMap;

/// A predicate over one shredded statistics path: a closed/open range, a
/// point set, or "unsupported" (pass through to the residual filter).
#[derive(Debug, Clone)]
pub enum RangePredicate {
    Range { min: Option<Value>, max: Option<Value>, min_inclusive: bool, max_inclusive: bool },
    Points(Vec<Value>),
}

impl RangePredicate {
    fn from_op(op: &CompareOp) -> Option<RangePredicate> {
        match op {
            CompareOp::Eq(v) => Some(RangePredicate::Range {
                min: Some(v.clone()),
                max: Some(v.clone()),
                min_inclusive: true,
                max_inclusive: true,
            }),
            CompareOp::Gt(v) => Some(RangePredicate::Range {
                min: Some(v.clone()),
                max: None,
                min_inclusive: false,
                max_inclusive: true,
            }),
            CompareOp::Gte(v) => Some(RangePredicate::Range {
                min: Some(v.clone()),
                max: None,
                min_inclusive: true,
                max_inclusive: true,
            }),
            CompareOp::Lt(v) => Some(RangePredicate::Range {
                min: None,
                max: Some(v.clone()),
                min_inclusive: true,
                max_inclusive: false,
            }),
            CompareOp::Lte(v) => Some(RangePredicate::Range {
                min: None,
                max: Some(v.clone()),
                min_inclusive: true,
                max_inclusive: true,
            }),
            CompareOp::In(values) => Some(RangePredicate::Points(values.clone())),
            _ => None,
        }
    }

    /// True iff `[stats_min, stats_max]` has no overlap with this predicate,
    /// meaning the row group can be skipped.
    fn excludes(&self, stats_min: &Value, stats_max: &Value) -> bool {
        match self {
            RangePredicate::Range { min, max, min_inclusive, max_inclusive } => {
                if let Some(min) = min {
                    let below = if *min_inclusive {
                        as_f64(stats_max) < as_f64(min)
                    } else {
                        as_f64(stats_max) <= as_f64(min)
                    };
                    if below {
                        return true;
                    }
                }
                if let Some(max) = max {
                    let above = if *max_inclusive {
                        as_f64(stats_min) > as_f64(max)
                    } else {
                        as_f64(stats_min) >= as_f64(max)
                    };
                    if above {
                        return true;
                    }
                }
                false
            }
            RangePredicate::Points(values) => values
                .iter()
                .all(|v| as_f64(v) < as_f64(stats_min) || as_f64(v) > as_f64(stats_max)),
        }
    }
}

fn as_f64(v: &Value) -> f64 {
    v.as_f64().unwrap_or(f64::NAN)
}

/// Per-leaf row group statistics: `(min, max)`.
pub type RowGroupStats = HashMap<String, (Value, Value)>;

/// A rewritten leaf, keyed by its shredded statistics path.
#[derive(Debug, Clone)]
pub struct PushedPredicate {
    pub stats_path: String,
    pub predicate: RangePredicate,
}

#[derive(Debug, Clone, Default)]
pub struct PushdownPlan {
    pub pushed: Vec<PushedPredicate>,
    pub residual: Vec<Filter>,
    pub total_conditions: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Effectiveness {
    pub total_conditions: usize,
    pub shredded_conditions: usize,
    pub effectiveness: f64,
    pub is_effective: bool,
}

pub struct PredicatePushdown {
    /// Map from `<root>.<field>` dotted document path to its shredded
    /// statistics path, as produced by shredding planning.
    shredded_paths: HashMap<String, String>,
    effectiveness_threshold: f64,
}

impl PredicatePushdown {
    pub fn new(shredded_paths: HashMap<String, String>) -> Self {
        Self {
            shredded_paths,
            effectiveness_threshold: 0.5,
        }
    }

    /// Walk `filter` and rewrite every leaf whose field is shredded into a
    /// range predicate over its statistics path; leaves that aren't
    /// shredded, or whose operator has no range form, pass through as
    /// residual filters for post-materialization evaluation.
    pub fn plan(&self, filter: &Filter) -> PushdownPlan {
        let mut plan = PushdownPlan::default();
        self.walk(filter, &mut plan);
        plan
    }

    fn walk(&self, filter: &Filter, plan: &mut PushdownPlan) {
        match filter {
            Filter::And(children) | Filter::Or(children) | Filter::Nor(children) => {
                for child in children {
                    self.walk(child, plan);
                }
            }
            Filter::Not(child) => self.walk(child, plan),
            Filter::Leaf { field, op } => {
                plan.total_conditions += 1;
                match (self.shredded_paths.get(field), RangePredicate::from_op(op)) {
                    (Some(stats_path), Some(predicate)) => {
                        plan.pushed.push(PushedPredicate {
                            stats_path: stats_path.clone(),
                            predicate,
                        });
                    }
                    _ => plan.residual.push(filter.clone()),
                }
            }
        }
    }

    /// True iff any pushed predicate's range has no overlap with the row
    /// group's recorded min/max for that statistics path — the row group
    /// can be skipped without reading it.
    pub fn should_skip_row_group(&self, plan: &PushdownPlan, stats: &RowGroupStats) -> bool {
        plan.pushed.iter().any(|p| match stats.get(&p.stats_path) {
            Some((min, max)) => p.predicate.excludes(min, max),
            None => false,
        })
    }

    pub fn effectiveness(&self, plan: &PushdownPlan) -> Effectiveness {
        let shredded = plan.pushed.len();
        let total = plan.total_conditions;
        let effectiveness = if total == 0 { 0.0 } else { shredded as f64 / total as f64 };
        Effectiveness {
            total_conditions: total,
            shredded_conditions: shredded,
            effectiveness,
            is_effective: effectiveness >= self.effectiveness_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pushdown() -> PredicatePushdown {
        let mut paths = HashMap::new();
        paths.insert("$data.year".to_string(), "$data.typed_value.year.typed_value".to_string());
        paths.insert("$data.rating".to_string(), "$data.typed_value.rating.typed_value".to_string());
        PredicatePushdown::new(paths)
    }

    #[test]
    fn effectiveness_matches_literal_scenario() {
        let pd = pushdown();
        let filter = Filter::And(vec![
            Filter::Leaf { field: "$data.year".into(), op: CompareOp::Gte(json!(2020)) },
            Filter::Leaf { field: "$data.rating".into(), op: CompareOp::Gt(json!(8.0)) },
            Filter::Leaf { field: "name".into(), op: CompareOp::Eq(json!("Test")) },
        ]);
        let plan = pd.plan(&filter);
        let eff = pd.effectiveness(&plan);
        assert_eq!(eff.total_conditions, 3);
        assert_eq!(eff.shredded_conditions, 2);
        assert!((eff.effectiveness - 0.667).abs() < 0.01);
    }

    #[test]
    fn row_group_skipped_when_range_excluded() {
        let pd = pushdown();
        let filter = Filter::Leaf { field: "$data.year".into(), op: CompareOp::Gte(json!(2020)) };
        let plan = pd.plan(&filter);

        let mut stats = RowGroupStats::new();
        stats.insert(
            "$data.typed_value.year.typed_value".into(),
            (json!(2010), json!(2015)),
        );
        assert!(pd.should_skip_row_group(&plan, &stats));

        stats.insert(
            "$data.typed_value.year.typed_value".into(),
            (json!(2018), json!(2022)),
        );
        assert!(!pd.should_skip_row_group(&plan, &stats));
    }

    #[test]
    fn no_false_prunes_for_overlapping_point_set() {
        let pd = pushdown();
        let filter = Filter::Leaf {
            field: "$data.year".into(),
            op: CompareOp::In(vec![json!(2019), json!(2021)]),
        };
        let plan = pd.plan(&filter);
        let mut stats = RowGroupStats::new();
        stats.insert(
            "$data.typed_value.year.typed_value".into(),
            (json!(2020), json!(2025)),
        );
        assert!(!pd.should_skip_row_group(&plan, &stats));
    }
}
