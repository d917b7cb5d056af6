mod predicate;
mod select;

pub use predicate::{Predicate, conjunction, is_aggregate_call, referenced_attributes};

use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::sql::sql_parser::{Aggregate, LogicalPlan};

/// Alias part of `alias.col`, `None` for a bare attribute.
pub fn attribute_alias(attr: &str) -> Option<&str> {
    attr.split_once('.').map(|(alias, _)| alias)
}

impl LogicalPlan {
    pub fn scan<S: Into<String>>(relation: S, alias: Option<S>) -> Self {
        let relation = relation.into();
        let alias = alias.map_or_else(|| relation.clone(), Into::into);
        Self::Scan { relation, alias }
    }

    pub fn select(predicate: Predicate, plan: LogicalPlan) -> Self {
        Self::Select {
            predicate,
            plan: Box::new(plan),
        }
    }

    pub fn project(attrs: Vec<String>, plan: LogicalPlan) -> Self {
        Self::Project {
            attrs,
            plan: Box::new(plan),
        }
    }

    /// Join without a condition.
    pub fn join(left: LogicalPlan, right: LogicalPlan) -> Self {
        Self::Join {
            on: None,
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Equi-join on `left_key = right_key`.
    pub fn join_on(
        on: Predicate,
        left_key: String,
        right_key: String,
        left: LogicalPlan,
        right: LogicalPlan,
    ) -> Self {
        Self::Join {
            on: Some(on),
            left_keys: vec![left_key],
            right_keys: vec![right_key],
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn cross(left: LogicalPlan, right: LogicalPlan) -> Self {
        Self::Cross {
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn group(group_by: Vec<String>, aggregates: Vec<Aggregate>, plan: LogicalPlan) -> Self {
        Self::Group {
            group_by,
            aggregates,
            plan: Box::new(plan),
        }
    }

    pub fn having(predicate: Predicate, plan: LogicalPlan) -> Self {
        Self::Having {
            predicate,
            plan: Box::new(plan),
        }
    }

    pub fn order(order_by: Vec<String>, plan: LogicalPlan) -> Self {
        Self::Order {
            order_by,
            plan: Box::new(plan),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Scan { .. } => "Scan",
            Self::Select { .. } => "Select",
            Self::Project { .. } => "Project",
            Self::Join { .. } => "Join",
            Self::Cross { .. } => "Cross",
            Self::Group { .. } => "Group",
            Self::Having { .. } => "Having",
            Self::Order { .. } => "Order",
        }
    }

    pub fn is_join(&self) -> bool {
        matches!(self, Self::Join { .. } | Self::Cross { .. })
    }

    /// Children in order, left before right.
    pub fn inputs(&self) -> Vec<&LogicalPlan> {
        match self {
            Self::Scan { .. } => Vec::new(),
            Self::Select { plan, .. }
            | Self::Project { plan, .. }
            | Self::Group { plan, .. }
            | Self::Having { plan, .. }
            | Self::Order { plan, .. } => vec![plan.as_ref()],
            Self::Join { left, right, .. } | Self::Cross { left, right } => {
                vec![left.as_ref(), right.as_ref()]
            }
        }
    }

    /// Rebuilds the node with `f` applied to each child, left before right.
    pub fn map_inputs<F>(self, mut f: F) -> Self
    where
        F: FnMut(LogicalPlan) -> LogicalPlan,
    {
        match self {
            Self::Scan { .. } => self,
            Self::Select { predicate, plan } => Self::Select {
                predicate,
                plan: Box::new(f(*plan)),
            },
            Self::Project { attrs, plan } => Self::Project {
                attrs,
                plan: Box::new(f(*plan)),
            },
            Self::Join {
                on,
                left_keys,
                right_keys,
                left,
                right,
            } => {
                let left = Box::new(f(*left));
                let right = Box::new(f(*right));
                Self::Join {
                    on,
                    left_keys,
                    right_keys,
                    left,
                    right,
                }
            }
            Self::Cross { left, right } => {
                let left = Box::new(f(*left));
                let right = Box::new(f(*right));
                Self::Cross { left, right }
            }
            Self::Group {
                group_by,
                aggregates,
                plan,
            } => Self::Group {
                group_by,
                aggregates,
                plan: Box::new(f(*plan)),
            },
            Self::Having { predicate, plan } => Self::Having {
                predicate,
                plan: Box::new(f(*plan)),
            },
            Self::Order { order_by, plan } => Self::Order {
                order_by,
                plan: Box::new(f(*plan)),
            },
        }
    }

    /// Scan aliases reachable under this node.
    pub fn aliases(&self) -> BTreeSet<String> {
        match self {
            Self::Scan { alias, .. } => BTreeSet::from([alias.clone()]),
            plan => plan
                .inputs()
                .into_iter()
                .flat_map(LogicalPlan::aliases)
                .collect(),
        }
    }

    /// Every attribute named by this subtree: projections, predicates, group-by, order-by and
    /// join keys.
    pub fn collect_needed_attributes(&self) -> BTreeSet<String> {
        let mut need: BTreeSet<String> = match self {
            Self::Scan { .. } | Self::Cross { .. } => BTreeSet::new(),
            Self::Project { attrs, .. } => attrs.iter().cloned().collect(),
            Self::Select { predicate, .. } | Self::Having { predicate, .. } => {
                predicate.attrs().iter().cloned().collect()
            }
            Self::Join {
                left_keys,
                right_keys,
                ..
            } => left_keys.iter().chain(right_keys).cloned().collect(),
            Self::Group { group_by, .. } => group_by.iter().cloned().collect(),
            Self::Order { order_by, .. } => order_by.iter().cloned().collect(),
        };

        for input in self.inputs() {
            need.extend(input.collect_needed_attributes());
        }
        need
    }

    /// Indented pre-order dump, one node per line.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        self.render_into(0, &mut lines);
        lines.join("\n")
    }

    fn render_into(&self, depth: usize, lines: &mut Vec<String>) {
        let pad = "  ".repeat(depth);
        let head = match self {
            Self::Scan { relation, alias } if relation == alias => format!("Scan: {relation}"),
            Self::Scan { relation, alias } => format!("Scan: {relation} AS {alias}"),
            Self::Select { predicate, .. } => format!("Select: {predicate}"),
            Self::Project { attrs, .. } if attrs.is_empty() => "Project: *".to_string(),
            Self::Project { attrs, .. } => format!("Project: {}", attrs.join(", ")),
            Self::Join {
                on: Some(on),
                left_keys,
                right_keys,
                ..
            } => format!(
                "Join: ON {on} keys [{}] = [{}]",
                left_keys.join(", "),
                right_keys.join(", ")
            ),
            Self::Join { on: None, .. } => "Join".to_string(),
            Self::Cross { .. } => "Cross".to_string(),
            Self::Group {
                group_by,
                aggregates,
                ..
            } => {
                let aggregates: Vec<String> = aggregates
                    .iter()
                    .map(|aggregate| format!("{} AS {}", aggregate.expr, aggregate.alias))
                    .collect();
                format!(
                    "Group: by [{}] aggregates [{}]",
                    group_by.join(", "),
                    aggregates.join(", ")
                )
            }
            Self::Having { predicate, .. } => format!("Having: {predicate}"),
            Self::Order { order_by, .. } => format!("Order: {}", order_by.join(", ")),
        };
        lines.push(format!("{pad}{head}"));

        for input in self.inputs() {
            input.render_into(depth + 1, lines);
        }
    }

    /// Checks the shape handed to SQL emission:
    /// `Order? -> Project -> Having? -> Group? -> {Select, Join, Cross, Scan}`, where a
    /// `Project` may also sit directly above a `Scan`.
    pub fn check_output_shape(&self) -> Result<()> {
        let plan = match self {
            Self::Order { plan, .. } => plan.as_ref(),
            plan => plan,
        };

        let Self::Project { plan, .. } = plan else {
            return Err(Error::InvalidPlanShape(format!(
                "expected Project below the optional Order, found {}",
                plan.name()
            )));
        };

        let mut plan = plan.as_ref();
        if let Self::Having { plan: inner, .. } = plan {
            if !matches!(inner.as_ref(), Self::Group { .. }) {
                return Err(Error::InvalidPlanShape(format!(
                    "Having must sit on a Group, found {}",
                    inner.name()
                )));
            }
            plan = inner.as_ref();
        }
        if let Self::Group { plan: inner, .. } = plan {
            plan = inner.as_ref();
        }

        plan.check_from_tree()
    }

    fn check_from_tree(&self) -> Result<()> {
        match self {
            Self::Scan { .. } => Ok(()),
            Self::Project { plan, .. } if matches!(plan.as_ref(), Self::Scan { .. }) => Ok(()),
            Self::Select { plan, .. } => plan.check_from_tree(),
            Self::Join { left, right, .. } | Self::Cross { left, right } => {
                left.check_from_tree()?;
                right.check_from_tree()
            }
            plan => Err(Error::InvalidPlanShape(format!(
                "unexpected {} below grouping",
                plan.name()
            ))),
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}
