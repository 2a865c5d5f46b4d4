//! Rule-based plan rewriting.
//!
//! Rules carry explicit priorities (higher fires first) and run in a
//! bounded fixpoint loop: whenever a rule fires, the loop restarts from
//! the highest priority. Every rule is idempotent on its own output, and
//! the pass budget guarantees termination regardless.

use crate::{IndexPredicate, Plan, ResolvedExpr};
use catalog::Catalog;
use expr::BinaryOp;
use std::ops::Bound;
use types::Value;

const MAX_PASSES: usize = 10;

trait Rule {
    fn name(&self) -> &'static str;
    fn priority(&self) -> u8;
    /// Rewrite the plan, returning the (possibly unchanged) plan and
    /// whether anything fired.
    fn apply(&self, plan: Plan, catalog: &Catalog) -> (Plan, bool);
}

pub struct Optimizer {
    rules: Vec<Box<dyn Rule>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    pub fn new() -> Self {
        let mut rules: Vec<Box<dyn Rule>> = vec![
            Box::new(IndexSelection),
            Box::new(PredicatePushdown),
            Box::new(RedundantProjectElimination),
        ];
        rules.sort_by(|a, b| b.priority().cmp(&a.priority()));
        Self { rules }
    }

    pub fn optimize(&self, mut plan: Plan, catalog: &Catalog) -> Plan {
        for _ in 0..MAX_PASSES {
            let mut fired = false;
            for rule in &self.rules {
                let (next, rule_fired) = rule.apply(plan, catalog);
                plan = next;
                if rule_fired {
                    tracing::debug!(rule = rule.name(), "optimizer rule fired");
                    fired = true;
                    break;
                }
            }
            if !fired {
                break;
            }
        }
        plan
    }
}

/// Rebuild `plan` by applying `f` to every node bottom-up.
fn rewrite_bottom_up(plan: Plan, f: &mut impl FnMut(Plan) -> (Plan, bool)) -> (Plan, bool) {
    let mut fired = false;
    let plan = match plan {
        Plan::Filter { input, predicate } => {
            let (input, child_fired) = rewrite_bottom_up(*input, f);
            fired |= child_fired;
            Plan::Filter {
                input: Box::new(input),
                predicate,
            }
        }
        Plan::Project { input, exprs } => {
            let (input, child_fired) = rewrite_bottom_up(*input, f);
            fired |= child_fired;
            Plan::Project {
                input: Box::new(input),
                exprs,
            }
        }
        Plan::OrderBy { input, items } => {
            let (input, child_fired) = rewrite_bottom_up(*input, f);
            fired |= child_fired;
            Plan::OrderBy {
                input: Box::new(input),
                items,
            }
        }
        Plan::GroupBy {
            input,
            group_exprs,
            select_exprs,
        } => {
            let (input, child_fired) = rewrite_bottom_up(*input, f);
            fired |= child_fired;
            Plan::GroupBy {
                input: Box::new(input),
                group_exprs,
                select_exprs,
            }
        }
        Plan::NestedLoopJoin {
            left,
            right,
            join_type,
            condition,
            schema,
        } => {
            let (left, left_fired) = rewrite_bottom_up(*left, f);
            let (right, right_fired) = rewrite_bottom_up(*right, f);
            fired |= left_fired | right_fired;
            Plan::NestedLoopJoin {
                left: Box::new(left),
                right: Box::new(right),
                join_type,
                condition,
                schema,
            }
        }
        leaf => leaf,
    };

    let (plan, self_fired) = f(plan);
    (plan, fired || self_fired)
}

/// Priority 10: `Filter(SeqScan)` whose predicate is `col OP literal`
/// (or an AND of a lower and an upper comparison over one column) with a
/// canonically-named index available becomes an `IndexScan`; the filter
/// disappears.
struct IndexSelection;

impl Rule for IndexSelection {
    fn name(&self) -> &'static str {
        "IndexSelection"
    }

    fn priority(&self) -> u8 {
        10
    }

    fn apply(&self, plan: Plan, catalog: &Catalog) -> (Plan, bool) {
        rewrite_bottom_up(plan, &mut |node| match node {
            Plan::Filter { input, predicate } => match *input {
                Plan::SeqScan {
                    table,
                    schema,
                    predicate: None,
                } => {
                    match match_index_predicate(&predicate, &table, &schema, catalog) {
                        Some((index, index_predicate)) => (
                            Plan::IndexScan {
                                table,
                                index,
                                schema,
                                predicate: index_predicate,
                            },
                            true,
                        ),
                        None => (
                            Plan::Filter {
                                input: Box::new(Plan::SeqScan {
                                    table,
                                    schema,
                                    predicate: None,
                                }),
                                predicate,
                            },
                            false,
                        ),
                    }
                }
                other => (
                    Plan::Filter {
                        input: Box::new(other),
                        predicate,
                    },
                    false,
                ),
            },
            other => (other, false),
        })
    }
}

/// Priority 5: a remaining `Filter(SeqScan)` pushes its predicate into
/// the scan, which evaluates it while producing rows.
struct PredicatePushdown;

impl Rule for PredicatePushdown {
    fn name(&self) -> &'static str {
        "PredicatePushdown"
    }

    fn priority(&self) -> u8 {
        5
    }

    fn apply(&self, plan: Plan, _catalog: &Catalog) -> (Plan, bool) {
        rewrite_bottom_up(plan, &mut |node| match node {
            Plan::Filter { input, predicate } => match *input {
                Plan::SeqScan {
                    table,
                    schema,
                    predicate: None,
                } => (
                    Plan::SeqScan {
                        table,
                        schema,
                        predicate: Some(predicate),
                    },
                    true,
                ),
                other => (
                    Plan::Filter {
                        input: Box::new(other),
                        predicate,
                    },
                    false,
                ),
            },
            other => (other, false),
        })
    }
}

/// Priority 3: `Project(Project(x))` merges by substituting the inner
/// expressions into the outer column references.
struct RedundantProjectElimination;

impl Rule for RedundantProjectElimination {
    fn name(&self) -> &'static str {
        "RedundantProjectElimination"
    }

    fn priority(&self) -> u8 {
        3
    }

    fn apply(&self, plan: Plan, _catalog: &Catalog) -> (Plan, bool) {
        rewrite_bottom_up(plan, &mut |node| match node {
            Plan::Project { input, exprs } => match *input {
                Plan::Project {
                    input: inner_input,
                    exprs: inner_exprs,
                } => {
                    let merged = exprs
                        .into_iter()
                        .map(|(name, expr)| (name, substitute(expr, &inner_exprs)))
                        .collect();
                    (
                        Plan::Project {
                            input: inner_input,
                            exprs: merged,
                        },
                        true,
                    )
                }
                other => (
                    Plan::Project {
                        input: Box::new(other),
                        exprs,
                    },
                    false,
                ),
            },
            other => (other, false),
        })
    }
}

/// Replace column references with the inner projection's expressions.
fn substitute(expr: ResolvedExpr, inner: &[(String, ResolvedExpr)]) -> ResolvedExpr {
    match expr {
        ResolvedExpr::Column(ordinal) => inner
            .get(ordinal)
            .map(|(_, e)| e.clone())
            .unwrap_or(ResolvedExpr::Column(ordinal)),
        ResolvedExpr::Unary { op, expr } => ResolvedExpr::Unary {
            op,
            expr: Box::new(substitute(*expr, inner)),
        },
        ResolvedExpr::Binary { left, op, right } => ResolvedExpr::Binary {
            left: Box::new(substitute(*left, inner)),
            op,
            right: Box::new(substitute(*right, inner)),
        },
        ResolvedExpr::Aggregate { func, arg } => ResolvedExpr::Aggregate {
            func,
            arg: arg.map(|e| Box::new(substitute(*e, inner))),
        },
        literal => literal,
    }
}

/// One half of a range predicate: `(column ordinal, op, literal)`.
fn comparison_parts(expr: &ResolvedExpr) -> Option<(usize, BinaryOp, &Value)> {
    match expr {
        ResolvedExpr::Binary { left, op, right } if op.is_comparison() => {
            match (left.as_ref(), right.as_ref()) {
                (ResolvedExpr::Column(ordinal), ResolvedExpr::Literal(value)) => {
                    Some((*ordinal, *op, value))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Try the canonical index names for `(table, column)` in order.
fn find_index(table: &str, column: &str, catalog: &Catalog) -> Option<String> {
    let candidates = [
        format!("pk_{table}_{column}"),
        format!("idx_{column}"),
        format!("{table}_{column}_idx"),
    ];
    let meta = catalog.table(table).ok()?;
    candidates
        .into_iter()
        .find(|name| meta.index(name).is_some())
}

/// Map a filter predicate onto an index access path, if its shape and an
/// available index allow it.
fn match_index_predicate(
    predicate: &ResolvedExpr,
    table: &str,
    schema: &[String],
    catalog: &Catalog,
) -> Option<(String, IndexPredicate)> {
    // Single comparison: col OP literal.
    if let Some((ordinal, op, value)) = comparison_parts(predicate) {
        let column = schema.get(ordinal)?;
        let column = column.rsplit('.').next().unwrap_or(column);
        let index = find_index(table, column, catalog)?;
        let index_predicate = match op {
            BinaryOp::Eq => IndexPredicate::Key(value.clone()),
            BinaryOp::Gt => IndexPredicate::Range {
                start: Bound::Excluded(value.clone()),
                end: Bound::Unbounded,
            },
            BinaryOp::Ge => IndexPredicate::Range {
                start: Bound::Included(value.clone()),
                end: Bound::Unbounded,
            },
            BinaryOp::Lt => IndexPredicate::Range {
                start: Bound::Unbounded,
                end: Bound::Excluded(value.clone()),
            },
            BinaryOp::Le => IndexPredicate::Range {
                start: Bound::Unbounded,
                end: Bound::Included(value.clone()),
            },
            _ => return None,
        };
        return Some((index, index_predicate));
    }

    // AND of a lower and an upper comparison over the same column.
    if let ResolvedExpr::Binary {
        left,
        op: BinaryOp::And,
        right,
    } = predicate
    {
        let (l_ord, l_op, l_val) = comparison_parts(left)?;
        let (r_ord, r_op, r_val) = comparison_parts(right)?;
        if l_ord != r_ord {
            return None;
        }

        let bound_of = |op: BinaryOp, value: &Value| match op {
            BinaryOp::Gt => Some((true, Bound::Excluded(value.clone()))),
            BinaryOp::Ge => Some((true, Bound::Included(value.clone()))),
            BinaryOp::Lt => Some((false, Bound::Excluded(value.clone()))),
            BinaryOp::Le => Some((false, Bound::Included(value.clone()))),
            _ => None,
        };
        let (l_is_lower, l_bound) = bound_of(l_op, l_val)?;
        let (r_is_lower, r_bound) = bound_of(r_op, r_val)?;
        if l_is_lower == r_is_lower {
            return None;
        }

        let (start, end) = if l_is_lower {
            (l_bound, r_bound)
        } else {
            (r_bound, l_bound)
        };
        let column = schema.get(l_ord)?;
        let column = column.rsplit('.').next().unwrap_or(column);
        let index = find_index(table, column, catalog)?;
        return Some((index, IndexPredicate::Range { start, end }));
    }

    None
}
