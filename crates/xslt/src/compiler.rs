//! Builds and composes the instruction arena.
//!
//! Stylesheet parsing lives outside this crate; callers (and tests) assemble the
//! instruction tree through [`StylesheetBuilder`], which compiles expressions and
//! attribute value templates against the namespaces in scope. [`StylesheetBuilder::compose`]
//! then freezes the tree: it numbers variable slots, records the variable scope of
//! every node, binds variable references in every expression, and indexes named
//! templates, character maps and output declarations.

use crate::ast::{
    Avt, Expr, Instruction, InstructionNode, NameTest, NamespaceContext, NodeId,
};
use crate::error::{Locator, XsltError, codes};
use crate::expr::CoreExpr;
use crate::output::{CharacterMapping, OutputProperties};
use crate::variables::{Slot, VariableScope};
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use weft_types::{ERR_NAMESPACE, QName, XS_NAMESPACE};

/// Local names of the variables bound inside `xsl:catch`, in slot order.
pub const CATCH_VARIABLES: [&str; 6] = [
    "code",
    "description",
    "value",
    "module",
    "line-number",
    "column-number",
];

#[derive(Debug)]
pub struct StylesheetBuilder {
    nodes: Vec<InstructionNode>,
    namespaces: Arc<NamespaceContext>,
    base_uri: Option<String>,
}

impl Default for StylesheetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StylesheetBuilder {
    pub fn new() -> Self {
        let namespaces = Arc::new(
            NamespaceContext::new()
                .with("err", ERR_NAMESPACE)
                .with("xs", XS_NAMESPACE),
        );
        let root = InstructionNode {
            kind: Instruction::Stylesheet,
            parent: None,
            children: Vec::new(),
            locator: None,
            namespaces: Arc::clone(&namespaces),
            scope: VariableScope::default(),
        };
        Self {
            nodes: vec![root],
            namespaces,
            base_uri: None,
        }
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Binds `prefix` for every node added from now on.
    pub fn declare_namespace(&mut self, prefix: &str, uri: &str) {
        Arc::make_mut(&mut self.namespaces).bind(prefix, uri);
    }

    pub fn add(&mut self, parent: NodeId, kind: Instruction) -> NodeId {
        self.push(parent, kind, None)
    }

    pub fn add_at(&mut self, parent: NodeId, kind: Instruction, locator: Locator) -> NodeId {
        self.push(parent, kind, Some(locator))
    }

    fn push(&mut self, parent: NodeId, kind: Instruction, locator: Option<Locator>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(InstructionNode {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            locator,
            namespaces: Arc::clone(&self.namespaces),
            scope: VariableScope::default(),
        });
        self.nodes[parent.index()].children.push(id);
        id
    }

    /// Compiles an expression against the namespaces currently in scope.
    pub fn xpath(&self, text: &str) -> Result<Expr, XsltError> {
        CoreExpr::parse(text, &self.namespaces).map(|e| Box::new(e) as Expr)
    }

    pub fn avt(&self, text: &str) -> Result<Avt, XsltError> {
        Avt::parse(text, |source| self.xpath(source))
    }

    /// Resolves a lexical QName; unprefixed names are in no namespace.
    pub fn qname(&self, lexical: &str) -> Result<QName, XsltError> {
        self.namespaces.resolve(lexical, None)
    }

    /// Parses an `xsl:catch/@errors` list.
    pub fn name_tests(&self, text: &str) -> Result<Vec<NameTest>, XsltError> {
        text.split_whitespace()
            .map(|token| self.name_test(token))
            .collect()
    }

    fn name_test(&self, token: &str) -> Result<NameTest, XsltError> {
        if token == "*" {
            return Ok(NameTest::Any);
        }
        if let Some(local) = token.strip_prefix("*:") {
            return Ok(NameTest::LocalName(local.to_string()));
        }
        if let Some(rest) = token.strip_prefix("Q{")
            && let Some((uri, local)) = rest.split_once('}')
        {
            return Ok(match local {
                "*" => NameTest::Namespace(uri.to_string()),
                _ => NameTest::Name(QName::new(Some(uri), local)),
            });
        }
        if let Some(prefix) = token.strip_suffix(":*") {
            let uri = self.namespaces.lookup(prefix).ok_or_else(|| {
                XsltError::static_error(
                    codes::XPST0081,
                    format!("prefix '{prefix}' is not declared"),
                )
            })?;
            return Ok(NameTest::Namespace(uri.to_string()));
        }
        Ok(NameTest::Name(self.qname(token)?))
    }

    pub fn text(&mut self, parent: NodeId, value: impl Into<String>) -> NodeId {
        self.add(
            parent,
            Instruction::Text {
                value: value.into(),
            },
        )
    }

    pub fn value_of(&mut self, parent: NodeId, select: &str) -> Result<NodeId, XsltError> {
        let select = self.xpath(select)?;
        Ok(self.add(
            parent,
            Instruction::ValueOf {
                select: Some(select),
                separator: None,
            },
        ))
    }

    pub fn sequence(&mut self, parent: NodeId, select: Option<&str>) -> Result<NodeId, XsltError> {
        let select = select.map(|s| self.xpath(s)).transpose()?;
        Ok(self.add(parent, Instruction::Sequence { select }))
    }

    /// A literal result element; the name takes the default element namespace.
    pub fn element(&mut self, parent: NodeId, lexical: &str) -> Result<NodeId, XsltError> {
        let name = self
            .namespaces
            .resolve(lexical, self.namespaces.default_element_namespace())?;
        Ok(self.add(
            parent,
            Instruction::LiteralElement {
                name,
                attributes: Vec::new(),
            },
        ))
    }

    /// Freezes the tree.
    pub fn compose(self) -> Result<Stylesheet, XsltError> {
        let mut nodes = self.nodes;
        let root = NodeId(0);

        let mut global_names = Vec::new();
        let mut globals = Vec::new();
        for &child in &nodes[0].children {
            if let Some(name) = declared_name(&nodes[child.index()].kind) {
                global_names.push(name.clone());
                globals.push(child);
            }
        }

        for (index, &global) in globals.iter().enumerate() {
            assign_scopes(
                &mut nodes,
                global,
                global_names[..index].to_vec(),
                index,
                Some(Slot::Global(index)),
            );
        }
        let top_level: Vec<NodeId> = nodes[0]
            .children
            .iter()
            .copied()
            .filter(|c| !globals.contains(c))
            .collect();
        for child in top_level {
            assign_scopes(&mut nodes, child, global_names.clone(), global_names.len(), None);
        }
        nodes[0].scope = VariableScope::new(global_names.into(), globals.len());

        for node in nodes.iter_mut() {
            let scope = node.scope.clone();
            for expr in node.kind.expressions_mut() {
                expr.fixup_variables(&scope)
                    .map_err(|e| e.at_locator(node.locator.as_ref()))?;
            }
        }

        let mut templates = HashMap::new();
        let mut character_maps = HashMap::new();
        let mut outputs = HashMap::new();
        for &child in &nodes[0].children {
            let node = &nodes[child.index()];
            match &node.kind {
                Instruction::Template { name: Some(name) } => {
                    if templates.insert(name.clone(), child).is_some() {
                        return Err(XsltError::static_error(
                            codes::XTSE0660,
                            format!("template {name} is declared more than once"),
                        )
                        .at_locator(node.locator.as_ref()));
                    }
                }
                Instruction::CharacterMap { name, .. } => {
                    character_maps.insert(name.clone(), child);
                }
                Instruction::Output { name, properties } => {
                    outputs.insert(name.clone(), properties.clone());
                }
                _ => {}
            }
        }

        debug!(
            "composed stylesheet: {} instructions, {} globals, {} named templates",
            nodes.len(),
            globals.len(),
            templates.len()
        );
        Ok(Stylesheet {
            nodes,
            root,
            base_uri: self.base_uri,
            globals,
            templates,
            character_maps,
            outputs,
        })
    }
}

fn declared_name(kind: &Instruction) -> Option<&QName> {
    match kind {
        Instruction::Variable { name, .. } | Instruction::Param { name, .. } => Some(name),
        _ => None,
    }
}

/// Records the scope of `id` and its subtree. `names` are the variables visible
/// at `id`, the first `globals_count` of them global; `slot` is the slot of the
/// variable `id` declares, if any.
fn assign_scopes(
    nodes: &mut [InstructionNode],
    id: NodeId,
    mut names: Vec<QName>,
    globals_count: usize,
    slot: Option<Slot>,
) {
    let next_local = |names: &Vec<QName>| Slot::Local(names.len() - globals_count);

    let node = &mut nodes[id.index()];
    match &mut node.kind {
        Instruction::Variable { slot: s, .. } | Instruction::Param { slot: s, .. } => *s = slot,
        Instruction::Catch { error_slots, .. } => {
            *error_slots = Some(next_local(&names));
            names.extend(
                CATCH_VARIABLES
                    .iter()
                    .map(|local| QName::prefixed("err", ERR_NAMESPACE, *local)),
            );
        }
        _ => {}
    }
    node.scope = VariableScope::new(names.clone().into(), globals_count);

    let children = node.children.clone();
    for child in children {
        let declared = declared_name(&nodes[child.index()].kind).cloned();
        let child_slot = declared.as_ref().map(|_| next_local(&names));
        assign_scopes(nodes, child, names.clone(), globals_count, child_slot);
        if let Some(name) = declared {
            names.push(name);
        }
    }
}

/// A composed, immutable instruction tree.
#[derive(Debug)]
pub struct Stylesheet {
    nodes: Vec<InstructionNode>,
    root: NodeId,
    base_uri: Option<String>,
    globals: Vec<NodeId>,
    templates: HashMap<QName, NodeId>,
    character_maps: HashMap<QName, NodeId>,
    outputs: HashMap<Option<QName>, OutputProperties>,
}

impl Stylesheet {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &InstructionNode {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// `id`, its parent, its grandparent, up to the stylesheet root.
    pub fn ancestors_or_self(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |n| self.parent(*n))
    }

    pub fn base_uri(&self) -> Option<&str> {
        self.base_uri.as_deref()
    }

    /// Global variable and parameter declarations, in declaration order.
    pub fn globals(&self) -> &[NodeId] {
        &self.globals
    }

    pub fn template(&self, name: &QName) -> Option<NodeId> {
        self.templates.get(name).copied()
    }

    /// The output declaration named `name`; `None` selects the unnamed one.
    pub fn output(&self, name: Option<&QName>) -> Option<&OutputProperties> {
        self.outputs.get(&name.cloned())
    }

    /// Merges the named character maps, including maps they use. Later maps win
    /// over earlier ones, and a map's own characters over the maps it uses.
    pub fn character_mapping(&self, names: &[QName]) -> Result<CharacterMapping, XsltError> {
        let mut mapping = CharacterMapping::new();
        let mut active = HashSet::new();
        for name in names {
            self.collect_mapping(name, &mut mapping, &mut active)?;
        }
        Ok(mapping)
    }

    fn collect_mapping(
        &self,
        name: &QName,
        mapping: &mut CharacterMapping,
        active: &mut HashSet<QName>,
    ) -> Result<(), XsltError> {
        let id = self.character_maps.get(name).copied().ok_or_else(|| {
            XsltError::static_error(
                codes::XTSE1590,
                format!("no character map named {name}"),
            )
        })?;
        if !active.insert(name.clone()) {
            return Err(XsltError::static_error(
                codes::XTSE1600,
                format!("character map {name} refers to itself"),
            ));
        }
        if let Instruction::CharacterMap {
            use_character_maps, ..
        } = &self.node(id).kind
        {
            for used in use_character_maps {
                self.collect_mapping(used, mapping, active)?;
            }
        }
        for &child in self.children(id) {
            if let Instruction::OutputCharacter { character, string } = &self.node(child).kind {
                mapping.insert(*character, string.clone());
            }
        }
        active.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_follow_declaration_order() {
        let mut b = StylesheetBuilder::new();
        let root = b.root();
        let g = b.add(
            root,
            Instruction::Variable {
                name: QName::local("g"),
                select: Some(b.xpath("1").unwrap()),
                slot: None,
            },
        );
        let t = b.add(
            root,
            Instruction::Template {
                name: Some(QName::local("main")),
            },
        );
        let x = b.add(
            t,
            Instruction::Variable {
                name: QName::local("x"),
                select: Some(b.xpath("$g").unwrap()),
                slot: None,
            },
        );
        let v = b.value_of(t, "$x + $g").unwrap();
        let s = b.compose().unwrap();

        assert!(matches!(
            s.node(g).kind,
            Instruction::Variable {
                slot: Some(Slot::Global(0)),
                ..
            }
        ));
        assert!(matches!(
            s.node(x).kind,
            Instruction::Variable {
                slot: Some(Slot::Local(0)),
                ..
            }
        ));
        assert_eq!(s.node(x).scope.names().len(), 1);
        assert_eq!(s.node(v).scope.resolve(&QName::local("x")), Some(Slot::Local(0)));
        assert_eq!(s.template(&QName::local("main")), Some(t));
        assert_eq!(s.globals(), &[g]);
    }

    #[test]
    fn forward_references_are_unbound() {
        let mut b = StylesheetBuilder::new();
        let root = b.root();
        let t = b.add(root, Instruction::Template { name: None });
        b.value_of(t, "$later").unwrap();
        b.add(
            t,
            Instruction::Variable {
                name: QName::local("later"),
                select: None,
                slot: None,
            },
        );
        assert!(b.compose().unwrap_err().has_code(codes::XPST0008));
    }

    #[test]
    fn catch_reserves_error_slots() {
        let mut b = StylesheetBuilder::new();
        let root = b.root();
        let t = b.add(root, Instruction::Template { name: None });
        let try_ = b.add(
            t,
            Instruction::Try {
                select: None,
                rollback_output: true,
            },
        );
        let catch = b.add(
            try_,
            Instruction::Catch {
                errors: None,
                select: Some(b.xpath("$err:code").unwrap()),
                error_slots: None,
            },
        );
        let s = b.compose().unwrap();
        let Instruction::Catch { error_slots, .. } = &s.node(catch).kind else {
            panic!("expected a catch");
        };
        assert_eq!(*error_slots, Some(Slot::Local(0)));
        assert_eq!(s.node(catch).scope.names().len(), 6);
        assert_eq!(s.ancestors_or_self(catch).collect::<Vec<_>>(), vec![catch, try_, t, root]);
    }

    #[test]
    fn duplicate_named_templates_are_rejected() {
        let mut b = StylesheetBuilder::new();
        let root = b.root();
        for _ in 0..2 {
            b.add(
                root,
                Instruction::Template {
                    name: Some(QName::local("t")),
                },
            );
        }
        assert!(b.compose().unwrap_err().has_code(codes::XTSE0660));
    }

    #[test]
    fn name_tests_cover_every_form() {
        let mut b = StylesheetBuilder::new();
        b.declare_namespace("my", "urn:my");
        let tests = b
            .name_tests("* my:* *:local Q{urn:q}x Q{urn:q}* err:FOAR0001")
            .unwrap();
        assert_eq!(
            tests,
            vec![
                NameTest::Any,
                NameTest::Namespace("urn:my".into()),
                NameTest::LocalName("local".into()),
                NameTest::Name(QName::new(Some("urn:q"), "x")),
                NameTest::Namespace("urn:q".into()),
                NameTest::Name(QName::error_code("FOAR0001")),
            ]
        );
        assert!(b.name_tests("nope:*").is_err());
    }

    #[test]
    fn character_maps_compose_and_detect_cycles() {
        let mut b = StylesheetBuilder::new();
        let root = b.root();
        let base = b.add(
            root,
            Instruction::CharacterMap {
                name: QName::local("base"),
                use_character_maps: vec![],
            },
        );
        b.add(
            base,
            Instruction::OutputCharacter {
                character: '\u{a0}',
                string: "&nbsp;".into(),
            },
        );
        let top = b.add(
            root,
            Instruction::CharacterMap {
                name: QName::local("top"),
                use_character_maps: vec![QName::local("base")],
            },
        );
        b.add(
            top,
            Instruction::OutputCharacter {
                character: '©',
                string: "(c)".into(),
            },
        );
        b.add(
            root,
            Instruction::CharacterMap {
                name: QName::local("loop"),
                use_character_maps: vec![QName::local("loop")],
            },
        );
        let s = b.compose().unwrap();

        let mapping = s.character_mapping(&[QName::local("top")]).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping[&'©'], "(c)");
        assert!(
            s.character_mapping(&[QName::local("missing")])
                .unwrap_err()
                .has_code(codes::XTSE1590)
        );
        assert!(
            s.character_mapping(&[QName::local("loop")])
                .unwrap_err()
                .has_code(codes::XTSE1600)
        );
    }
}
