//! Named query templates.
//!
//! A template is a named, reusable list of query items. An item is either an
//! inline query or a reference to another template with a coefficient.
//! Resolution flattens a template into [`ResolvedLeaf`]s, multiplying
//! coefficients along the reference chain and deciding each leaf's date range:
//! a template with `inherits_range` takes its caller's range, any other
//! template supplies its own.
//!
//! Templates live in an immutable [`TemplateTable`]. A [`TemplateRegistry`]
//! hands out snapshots of the current table and swaps in a new one on reload,
//! so a resolution in flight never sees a half-updated table.

use parking_lot::RwLock;
use rust_decimal::Decimal;
use rustacct_core::{DateFilter, Voucher, VoucherDetail};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{compile, QueryExpr};
use crate::error::QueryError;
use crate::tree::{Atom, FilterTree};

const fn one() -> Decimal {
    Decimal::ONE
}

/// One item of a template body, as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateItemSpec {
    /// An inline query.
    Query(QueryExpr),
    /// A reference to another template.
    Ref {
        /// Referenced template
        name: String,
        /// Scale applied to everything the reference resolves to
        #[serde(default = "one")]
        coefficient: Decimal,
    },
}

/// A template as loaded from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    /// Unique name
    pub name: String,
    /// Body items, in order
    pub items: Vec<TemplateItemSpec>,
    /// Scale applied to the whole template
    #[serde(default = "one")]
    pub coefficient: Decimal,
    /// Take the caller's date range instead of `range`
    #[serde(default)]
    pub inherits_range: bool,
    /// Own date range, used when not inheriting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<DateFilter>,
    /// Free-form note shown in reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<String>,
}

/// One compiled item of a template body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateItem {
    /// An inline query.
    Query(FilterTree),
    /// A reference to another template.
    Reference {
        /// Referenced template
        name: String,
        /// Scale applied to the reference
        coefficient: Decimal,
    },
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedTemplate {
    /// Unique name
    pub name: String,
    /// Body items, in order
    pub items: Vec<TemplateItem>,
    /// Scale applied to the whole template
    pub coefficient: Decimal,
    /// Take the caller's date range instead of `range`
    pub inherits_range: bool,
    /// Own date range
    pub range: Option<DateFilter>,
    /// Free-form note
    pub remark: Option<String>,
}

impl NamedTemplate {
    /// A template with coefficient 1 that does not inherit its caller's range.
    #[must_use]
    pub fn new(name: impl Into<String>, items: Vec<TemplateItem>) -> Self {
        Self {
            name: name.into(),
            items,
            coefficient: Decimal::ONE,
            inherits_range: false,
            range: None,
            remark: None,
        }
    }

    /// Set the coefficient.
    #[must_use]
    pub const fn with_coefficient(mut self, coefficient: Decimal) -> Self {
        self.coefficient = coefficient;
        self
    }

    /// Take the caller's range.
    #[must_use]
    pub const fn inheriting(mut self) -> Self {
        self.inherits_range = true;
        self
    }

    /// Set the template's own range.
    #[must_use]
    pub const fn with_range(mut self, range: DateFilter) -> Self {
        self.range = Some(range);
        self
    }

    /// Compile a configuration entry.
    pub fn from_spec(spec: &TemplateSpec) -> Result<Self, QueryError> {
        let items = spec
            .items
            .iter()
            .map(|item| match item {
                TemplateItemSpec::Query(expr) => compile(expr).map(TemplateItem::Query),
                TemplateItemSpec::Ref { name, coefficient } => Ok(TemplateItem::Reference {
                    name: name.clone(),
                    coefficient: *coefficient,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: spec.name.clone(),
            items,
            coefficient: spec.coefficient,
            inherits_range: spec.inherits_range,
            range: spec.range,
            remark: spec.remark.clone(),
        })
    }

    fn references(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            TemplateItem::Reference { name, .. } => Some(name.as_str()),
            TemplateItem::Query(_) => None,
        })
    }

    fn effective_range(&self, inherited: Option<DateFilter>) -> Option<DateFilter> {
        if self.inherits_range {
            inherited
        } else {
            self.range
        }
    }
}

/// A filter tree with the coefficient and range it was resolved under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLeaf {
    /// Coefficient-agnostic filter
    pub tree: FilterTree,
    /// Scale applied to every amount this leaf matches
    pub coefficient: Decimal,
    /// Date range the leaf is limited to
    pub range: Option<DateFilter>,
    /// Template names from the resolved root down to the owner of this leaf
    pub path: Vec<String>,
}

impl ResolvedLeaf {
    /// Whether `detail` within `voucher` matches, range included.
    #[must_use]
    pub fn matches(&self, detail: &VoucherDetail, voucher: &Voucher) -> bool {
        self.range.map_or(true, |r| r.contains(voucher.date)) && self.tree.evaluate(detail, voucher)
    }

    /// Cheap pre-check before scanning a voucher's details.
    #[must_use]
    pub fn admits(&self, voucher: &Voucher) -> bool {
        self.range.map_or(true, |r| r.contains(voucher.date))
            && self.tree.transaction_admissible(voucher)
    }

    fn date_hint(&self) -> DateFilter {
        let hint = self.tree.date_hint();
        self.range.map_or(hint, |r| hint.intersect(&r))
    }

    fn to_tree(&self) -> FilterTree {
        match self.range {
            None => self.tree.clone(),
            Some(range) => FilterTree::Intersect(vec![
                self.tree.clone(),
                FilterTree::Atom(Atom::default().with_range(range)),
            ]),
        }
    }
}

/// The result of resolving a query: a weighted union of leaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQuery {
    /// Leaves in resolution order
    pub leaves: Vec<ResolvedLeaf>,
}

impl ResolvedQuery {
    /// A single tree with coefficient 1 and no extra range.
    #[must_use]
    pub fn from_tree(tree: FilterTree) -> Self {
        Self {
            leaves: vec![ResolvedLeaf {
                tree,
                coefficient: Decimal::ONE,
                range: None,
                path: Vec::new(),
            }],
        }
    }

    /// Multiply every leaf's coefficient by `k`.
    #[must_use]
    pub fn scaled(mut self, k: Decimal) -> Self {
        for leaf in &mut self.leaves {
            leaf.coefficient *= k;
        }
        self
    }

    /// The plain union of all leaves, coefficients dropped.
    pub fn filter_tree(&self) -> Result<FilterTree, QueryError> {
        match self.leaves.as_slice() {
            [leaf] => Ok(leaf.to_tree()),
            leaves => FilterTree::union(leaves.iter().map(ResolvedLeaf::to_tree).collect()),
        }
    }

    /// Date range outside of which no leaf can match.
    #[must_use]
    pub fn date_hint(&self) -> DateFilter {
        self.leaves
            .iter()
            .map(ResolvedLeaf::date_hint)
            .reduce(|a, b| a.hull(&b))
            .unwrap_or_else(DateFilter::empty)
    }
}

/// An immutable set of compiled templates.
///
/// Building a table checks that every reference names a known template and
/// that references form no cycle.
#[derive(Debug, Clone, Default)]
pub struct TemplateTable {
    templates: HashMap<String, NamedTemplate>,
}

struct Frame<'t> {
    template: &'t NamedTemplate,
    next: usize,
    coefficient: Decimal,
    range: Option<DateFilter>,
}

impl TemplateTable {
    /// Build a table from compiled templates.
    pub fn new(templates: impl IntoIterator<Item = NamedTemplate>) -> Result<Self, QueryError> {
        let mut map = HashMap::new();
        for template in templates {
            if map.contains_key(&template.name) {
                return Err(QueryError::DuplicateTemplate(template.name));
            }
            map.insert(template.name.clone(), template);
        }
        let table = Self { templates: map };
        table.validate_acyclic()?;
        Ok(table)
    }

    /// Compile and build a table from configuration entries.
    pub fn from_specs(specs: &[TemplateSpec]) -> Result<Self, QueryError> {
        let templates = specs
            .iter()
            .map(NamedTemplate::from_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(templates)
    }

    /// Look up a template.
    pub fn get(&self, name: &str) -> Option<&NamedTemplate> {
        self.templates.get(name)
    }

    /// Template names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the table holds no templates.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    fn lookup(&self, name: &str) -> Result<&NamedTemplate, QueryError> {
        self.templates
            .get(name)
            .ok_or_else(|| QueryError::UnknownTemplate(name.to_string()))
    }

    /// Depth-first walk over every template with an explicit stack.
    fn validate_acyclic(&self) -> Result<(), QueryError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            InProgress,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        for root in self.names() {
            if marks.contains_key(root) {
                continue;
            }
            let root_template = self.lookup(root)?;
            let mut stack: Vec<(&str, Vec<&str>)> =
                vec![(root, root_template.references().collect())];
            marks.insert(root, Mark::InProgress);

            while let Some((name, pending)) = stack.last_mut() {
                let Some(next) = pending.pop() else {
                    marks.insert(*name, Mark::Done);
                    stack.pop();
                    continue;
                };
                match marks.get(next) {
                    Some(Mark::Done) => {}
                    Some(Mark::InProgress) => {
                        let start = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let mut chain: Vec<String> =
                            stack[start..].iter().map(|(n, _)| (*n).to_string()).collect();
                        chain.push(next.to_string());
                        return Err(QueryError::CyclicReference(chain));
                    }
                    None => {
                        let template = self.lookup(next)?;
                        marks.insert(next, Mark::InProgress);
                        stack.push((next, template.references().collect()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Resolve `name` into leaves.
    ///
    /// `coefficient` scales the whole result; `inherited` is the range handed
    /// to templates that inherit their caller's range.
    pub fn resolve(
        &self,
        name: &str,
        coefficient: Decimal,
        inherited: Option<DateFilter>,
    ) -> Result<ResolvedQuery, QueryError> {
        let root = self.lookup(name)?;
        let mut leaves = Vec::new();
        let mut stack = vec![Frame {
            template: root,
            next: 0,
            coefficient: coefficient * root.coefficient,
            range: root.effective_range(inherited),
        }];

        while let Some(frame) = stack.last_mut() {
            let template: &NamedTemplate = frame.template;
            let Some(item) = template.items.get(frame.next) else {
                stack.pop();
                continue;
            };
            frame.next += 1;
            let (scale, range) = (frame.coefficient, frame.range);

            match item {
                TemplateItem::Query(tree) => leaves.push(ResolvedLeaf {
                    tree: tree.clone(),
                    coefficient: scale,
                    range,
                    path: stack.iter().map(|f| f.template.name.clone()).collect(),
                }),
                TemplateItem::Reference {
                    name: target,
                    coefficient: k,
                } => {
                    if let Some(start) = stack.iter().position(|f| f.template.name == *target) {
                        let mut chain: Vec<String> =
                            stack[start..].iter().map(|f| f.template.name.clone()).collect();
                        chain.push(target.clone());
                        return Err(QueryError::CyclicReference(chain));
                    }
                    let referenced = self.lookup(target)?;
                    stack.push(Frame {
                        template: referenced,
                        next: 0,
                        coefficient: scale * *k * referenced.coefficient,
                        range: referenced.effective_range(range),
                    });
                }
            }
        }

        tracing::debug!(template = name, leaves = leaves.len(), "resolved named query");
        Ok(ResolvedQuery { leaves })
    }
}

/// Holder of the current template table.
///
/// Readers take a snapshot and keep using it for as long as they like;
/// a reload swaps the whole table at once.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    current: RwLock<Arc<TemplateTable>>,
}

impl TemplateRegistry {
    /// Create a registry serving `table`.
    pub fn new(table: TemplateTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(table)),
        }
    }

    /// The table in effect right now.
    pub fn snapshot(&self) -> Arc<TemplateTable> {
        Arc::clone(&self.current.read())
    }

    /// Swap in a new table, returning the previous one.
    pub fn replace(&self, table: TemplateTable) -> Arc<TemplateTable> {
        let table = Arc::new(table);
        tracing::debug!(templates = table.len(), "template table replaced");
        std::mem::replace(&mut *self.current.write(), table)
    }

    /// Resolve against the current snapshot.
    pub fn resolve(
        &self,
        name: &str,
        coefficient: Decimal,
        inherited: Option<DateFilter>,
    ) -> Result<ResolvedQuery, QueryError> {
        self.snapshot().resolve(name, coefficient, inherited)
    }
}
