use crate::ast::{Expr, Instruction, NodeId, SortOrder};
use crate::compiler::Stylesheet;
use crate::context::Focus;
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::keys::ComparableKey;
use crate::output::ResultSerializer;
use crate::scope::{MergeGroup, ScopeState};
use indexmap::IndexMap;
use log::debug;
use std::sync::Arc;
use weft_types::{AtomicValue, XdmItem};

/// A validated `xsl:merge-source`.
struct MergeSource<'s> {
    id: NodeId,
    name: Option<&'s str>,
    select: &'s Expr,
    sort_before_merge: bool,
    key: &'s Expr,
    order: SortOrder,
}

type Bucket = (AtomicValue, Vec<(Option<String>, XdmItem)>);

fn structure_error(message: impl Into<String>) -> XsltError {
    XsltError::static_error(codes::XTSE0010, message)
}

/// Splits the children of `xsl:merge` into its sources and its single action.
fn merge_children(stylesheet: &Stylesheet, id: NodeId) -> Result<(Vec<MergeSource<'_>>, NodeId), XsltError> {
    let mut sources = Vec::new();
    let mut action = None;
    for &child in stylesheet.children(id) {
        match &stylesheet.node(child).kind {
            Instruction::MergeSource {
                name,
                select,
                sort_before_merge,
            } => {
                if action.is_some() {
                    return Err(structure_error("xsl:merge-source must precede xsl:merge-action"));
                }
                let (key, order) = first_merge_key(stylesheet, child)?;
                sources.push(MergeSource {
                    id: child,
                    name: name.as_deref(),
                    select,
                    sort_before_merge: *sort_before_merge,
                    key,
                    order,
                });
            }
            Instruction::MergeAction if action.is_none() => action = Some(child),
            Instruction::MergeAction => {
                return Err(structure_error("xsl:merge must have exactly one xsl:merge-action"));
            }
            other => {
                return Err(structure_error(format!(
                    "{} is not allowed as a child of xsl:merge",
                    other.name()
                )));
            }
        }
    }
    if sources.is_empty() {
        return Err(structure_error("xsl:merge must have at least one xsl:merge-source"));
    }
    let action = action.ok_or_else(|| structure_error("xsl:merge must have an xsl:merge-action"))?;
    Ok((sources, action))
}

/// The first `xsl:merge-key` of a source; further keys are accepted but not used.
fn first_merge_key(stylesheet: &Stylesheet, source: NodeId) -> Result<(&Expr, SortOrder), XsltError> {
    let mut first = None;
    for &child in stylesheet.children(source) {
        match &stylesheet.node(child).kind {
            Instruction::MergeKey { select, order } => {
                first.get_or_insert((select, *order));
            }
            other => {
                return Err(structure_error(format!(
                    "{} is not allowed as a child of xsl:merge-source",
                    other.name()
                )));
            }
        }
    }
    first.ok_or_else(|| structure_error("xsl:merge-source must have at least one xsl:merge-key"))
}

fn check_sources(sources: &[MergeSource<'_>]) -> Result<(), XsltError> {
    let mut seen: Vec<&str> = Vec::new();
    for source in sources {
        if let Some(name) = source.name {
            if seen.contains(&name) {
                return Err(XsltError::static_error(
                    codes::XTSE1505,
                    format!("two xsl:merge-source elements are named '{name}'"),
                ));
            }
            seen.push(name);
        }
    }
    let sorted = sources[0].sort_before_merge;
    if sources.iter().any(|s| s.sort_before_merge != sorted) {
        return Err(XsltError::static_error(
            codes::XTSE1505,
            "all merge sources must agree on sort-before-merge",
        ));
    }
    Ok(())
}

impl TemplateExecutor {
    pub(crate) fn handle_merge(
        &mut self,
        id: NodeId,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let stylesheet = self.stylesheet();
        let (sources, action) = merge_children(&stylesheet, id)?;
        check_sources(&sources)?;

        let source_names: Arc<[String]> = sources
            .iter()
            .filter_map(|s| s.name.map(str::to_string))
            .collect();

        let mut buckets: IndexMap<ComparableKey, Bucket> = IndexMap::new();
        for source in &sources {
            self.fill_buckets(source, &mut buckets)?;
        }
        if sources[0].sort_before_merge {
            buckets.sort_keys();
            if sources[0].order == SortOrder::Descending {
                buckets.reverse();
            }
        }
        debug!(
            "merge: {} sources, {} distinct keys",
            sources.len(),
            buckets.len()
        );

        let count = buckets.len();
        self.with_null_template_rule(|this| {
            for (i, (key, members)) in buckets.into_values().enumerate() {
                let Some((_, first)) = members.first().cloned() else {
                    continue;
                };
                let group = Arc::new(MergeGroup {
                    key,
                    members,
                    source_names: Arc::clone(&source_names),
                });
                let focus = Focus::new(first, i + 1, count);
                this.with_scope(id, ScopeState::Merge(group), |this| {
                    this.with_focus(focus, |this| this.run_branch(action, out))
                })?;
            }
            Ok(())
        })
    }

    fn fill_buckets(
        &mut self,
        source: &MergeSource<'_>,
        buckets: &mut IndexMap<ComparableKey, Bucket>,
    ) -> Result<(), XsltError> {
        let items = self.evaluate(source.id, source.select)?;
        let size = items.len();
        for (i, item) in items.iter().enumerate() {
            let key = if source.key.is_context_item() {
                item_key(self, item)
            } else {
                let value = self.with_focus(Focus::new(item.clone(), i + 1, size), |this| {
                    this.evaluate(source.id, source.key)
                })?;
                self.xpath(source.id).atomize(&value)
            };
            let key = match <[AtomicValue; 1]>::try_from(key) {
                Ok([key]) => key,
                Err(other) => {
                    return Err(XsltError::type_error(
                        codes::XPTY0004,
                        format!("a merge key must be a single atomic value, got {} items", other.len()),
                    ));
                }
            };
            buckets
                .entry(ComparableKey::from_atomic(&key))
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push((source.name.map(str::to_string), item.clone()));
        }
        Ok(())
    }
}

fn item_key(executor: &TemplateExecutor, item: &XdmItem) -> Vec<AtomicValue> {
    match item {
        XdmItem::Atomic(atom) => vec![atom.clone()],
        XdmItem::Node(node) => vec![AtomicValue::UntypedAtomic(executor.dtm().string_value(*node))],
    }
}
