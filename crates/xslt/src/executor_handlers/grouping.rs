use crate::ast::{Expr, Grouping, NodeId};
use crate::context::Focus;
use crate::error::{XsltError, codes};
use crate::executor::TemplateExecutor;
use crate::expression::bool_coerce;
use crate::keys::ComparableKey;
use crate::output::ResultSerializer;
use crate::scope::ScopeState;
use indexmap::IndexMap;
use log::debug;
use weft_types::{AtomicValue, XdmItem, XdmValue};

/// One group: its key (absent for starting/ending-with) and members in population order.
type Group = (Option<AtomicValue>, Vec<XdmItem>);

impl TemplateExecutor {
    pub(crate) fn handle_for_each_group(
        &mut self,
        id: NodeId,
        select: &Expr,
        grouping: &Grouping,
        out: &mut dyn ResultSerializer,
    ) -> Result<(), XsltError> {
        let population = self.evaluate(id, select)?;
        let groups = match grouping {
            Grouping::By(key) => self.group_by(id, &population, key)?,
            Grouping::Adjacent(key) => self.group_adjacent(id, &population, key)?,
            Grouping::StartingWith(test) => self.group_boundaries(id, &population, test, true)?,
            Grouping::EndingWith(test) => self.group_boundaries(id, &population, test, false)?,
        };
        debug!("for-each-group: {} items in {} groups", population.len(), groups.len());

        let count = groups.len();
        self.with_null_template_rule(|this| {
            for (i, (key, members)) in groups.into_iter().enumerate() {
                let Some(first) = members.first().cloned() else {
                    continue;
                };
                let members: XdmValue = members.into_iter().collect();
                let focus = Focus::new(first, i + 1, count);
                this.with_scope(id, ScopeState::Group { key, members }, |this| {
                    this.with_focus(focus, |this| this.execute_children(id, out))
                })?;
            }
            Ok(())
        })
    }

    /// Evaluates `expr` with each member of `population` as the context item.
    fn per_item<T>(
        &mut self,
        id: NodeId,
        population: &XdmValue,
        expr: &Expr,
        mut convert: impl FnMut(&Self, XdmValue) -> Result<T, XsltError>,
    ) -> Result<Vec<T>, XsltError> {
        let size = population.len();
        population
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let value = self.with_focus(Focus::new(item.clone(), i + 1, size), |this| {
                    this.evaluate(id, expr)
                })?;
                convert(&*self, value)
            })
            .collect()
    }

    fn group_by(
        &mut self,
        id: NodeId,
        population: &XdmValue,
        key: &Expr,
    ) -> Result<Vec<Group>, XsltError> {
        let keys = self.per_item(id, population, key, |this, value| {
            Ok(this.xpath(id).atomize(&value))
        })?;
        let mut groups: IndexMap<ComparableKey, Group> = IndexMap::new();
        for (item, item_keys) in population.iter().zip(keys) {
            let mut joined: Vec<ComparableKey> = Vec::new();
            for key in item_keys {
                let comparable = ComparableKey::from_atomic(&key);
                if joined.contains(&comparable) {
                    continue;
                }
                joined.push(comparable.clone());
                groups
                    .entry(comparable)
                    .or_insert_with(|| (Some(key), Vec::new()))
                    .1
                    .push(item.clone());
            }
        }
        Ok(groups.into_values().collect())
    }

    fn group_adjacent(
        &mut self,
        id: NodeId,
        population: &XdmValue,
        key: &Expr,
    ) -> Result<Vec<Group>, XsltError> {
        let keys = self.per_item(id, population, key, |this, value| {
            let mut atoms = this.xpath(id).atomize(&value);
            if atoms.len() != 1 {
                return Err(XsltError::type_error(
                    codes::XTTE1100,
                    format!("group-adjacent key must be a single atomic value, got {} items", atoms.len()),
                ));
            }
            Ok(atoms.remove(0))
        })?;
        let mut groups: Vec<Group> = Vec::new();
        let mut previous: Option<ComparableKey> = None;
        for (item, key) in population.iter().zip(keys) {
            let comparable = ComparableKey::from_atomic(&key);
            if previous.as_ref() == Some(&comparable)
                && let Some((_, members)) = groups.last_mut()
            {
                members.push(item.clone());
            } else {
                groups.push((Some(key), vec![item.clone()]));
            }
            previous = Some(comparable);
        }
        Ok(groups)
    }

    /// `group-starting-with` when `starting`, else `group-ending-with`.
    fn group_boundaries(
        &mut self,
        id: NodeId,
        population: &XdmValue,
        test: &Expr,
        starting: bool,
    ) -> Result<Vec<Group>, XsltError> {
        let flags = self.per_item(id, population, test, |_, value| bool_coerce(&value))?;
        let mut groups: Vec<Group> = Vec::new();
        let mut open = false;
        for (item, matched) in population.iter().zip(flags) {
            let new_group = !open || (starting && matched);
            if new_group {
                groups.push((None, Vec::new()));
            }
            if let Some((_, members)) = groups.last_mut() {
                members.push(item.clone());
            }
            open = starting || !matched;
        }
        Ok(groups)
    }
}
