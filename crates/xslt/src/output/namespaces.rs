use std::collections::BTreeMap;
use weft_types::{QName, XML_NAMESPACE};

/// Namespace bindings of the open elements of a result tree.
///
/// Besides plain lookups, the stack performs namespace fixup: opening an element
/// or adding an attribute whose name is not bound as required yields the extra
/// declarations to write.
#[derive(Debug, Clone)]
pub struct NamespaceStack {
    /// One entry per open element; index 0 holds inherited bindings.
    scopes: Vec<Vec<(String, String)>>,
    pending: Vec<(String, String)>,
    counter: usize,
}

impl Default for NamespaceStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceStack {
    pub fn new() -> Self {
        Self::inheriting(Vec::new())
    }

    /// A stack whose outermost scope already holds `bindings`.
    pub fn inheriting(bindings: Vec<(String, String)>) -> Self {
        Self {
            scopes: vec![bindings],
            pending: Vec::new(),
            counter: 0,
        }
    }

    pub fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.pending
            .iter()
            .rev()
            .chain(self.scopes.iter().rev().flat_map(|s| s.iter().rev()))
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str())
    }

    pub fn get_prefix(&self, uri: &str) -> Option<String> {
        if uri == XML_NAMESPACE {
            return Some("xml".to_string());
        }
        self.pending
            .iter()
            .rev()
            .chain(self.scopes.iter().rev().flat_map(|s| s.iter().rev()))
            .filter(|(_, u)| u == uri)
            .map(|(p, _)| p)
            .find(|p| self.lookup(p) == Some(uri))
            .cloned()
    }

    pub fn declare_pending(&mut self, prefix: &str, uri: &str) {
        self.pending.push((prefix.to_string(), uri.to_string()));
    }

    /// Drops a pending binding of `prefix` that no element has consumed yet.
    /// Bindings already on an element end with that element's scope.
    pub fn withdraw_pending(&mut self, prefix: &str) {
        if let Some(i) = self.pending.iter().rposition(|(p, _)| p == prefix) {
            self.pending.remove(i);
        }
    }

    pub fn generate_prefix(&mut self) -> String {
        loop {
            let candidate = format!("ns{}", self.counter);
            self.counter += 1;
            if self.lookup(&candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Opens the scope of a new element and returns its lexical name together with
    /// the declarations that must be written on it.
    pub fn open_element(&mut self, name: &QName) -> (String, Vec<(String, String)>) {
        let requested = std::mem::take(&mut self.pending);
        let mut decls: Vec<(String, String)> = Vec::new();
        for (prefix, uri) in requested {
            if self.lookup(&prefix) != Some(uri.as_str()) {
                decls.retain(|(p, _)| p != &prefix);
                decls.push((prefix, uri));
            }
        }

        let uri = name.namespace_uri();
        let mut prefix = match name.prefix() {
            "xmlns" => String::new(),
            p => p.to_string(),
        };
        let effective = |decls: &[(String, String)], stack: &Self, p: &str| -> String {
            decls
                .iter()
                .rev()
                .find(|(dp, _)| dp == p)
                .map(|(_, u)| u.clone())
                .or_else(|| stack.lookup(p).map(str::to_string))
                .unwrap_or_default()
        };

        if uri.is_empty() {
            prefix.clear();
            if !effective(&decls, self, "").is_empty() {
                decls.push((String::new(), String::new()));
            }
        } else if effective(&decls, self, &prefix) != uri {
            if decls.iter().any(|(p, _)| p == &prefix) {
                self.scopes.push(decls.clone());
                prefix = self.generate_prefix();
                self.scopes.pop();
            }
            decls.push((prefix.clone(), uri.to_string()));
        }

        self.scopes.push(decls.clone());
        (lexical(&prefix, &name.local), decls)
    }

    /// Lexical name for an attribute of the innermost open element, plus a
    /// declaration to add to that element if the namespace is not yet bound.
    pub fn attribute_name(&mut self, name: &QName) -> (String, Option<(String, String)>) {
        let uri = name.namespace_uri();
        if uri.is_empty() {
            return (name.local.clone(), None);
        }
        let prefix = name.prefix();
        if !prefix.is_empty() && prefix != "xmlns" && self.lookup(prefix) == Some(uri) {
            return (lexical(prefix, &name.local), None);
        }
        let declared_here = |stack: &Self, p: &str| {
            stack
                .scopes
                .last()
                .is_some_and(|s| s.iter().any(|(dp, _)| dp == p))
        };
        if !prefix.is_empty() && prefix != "xmlns" && !declared_here(self, prefix) {
            return self.declare_on_current(prefix.to_string(), uri, &name.local);
        }
        if let Some(existing) = self.get_prefix(uri).filter(|p| !p.is_empty()) {
            return (lexical(&existing, &name.local), None);
        }
        let fresh = self.generate_prefix();
        self.declare_on_current(fresh, uri, &name.local)
    }

    fn declare_on_current(
        &mut self,
        prefix: String,
        uri: &str,
        local: &str,
    ) -> (String, Option<(String, String)>) {
        let decl = (prefix.clone(), uri.to_string());
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(decl.clone());
        }
        (lexical(&prefix, local), Some(decl))
    }

    pub fn close_element(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn in_scope(&self) -> Vec<(String, String)> {
        let mut merged: BTreeMap<&str, &str> = BTreeMap::new();
        for (prefix, uri) in self.scopes.iter().flatten() {
            merged.insert(prefix, uri);
        }
        merged
            .into_iter()
            .filter(|(p, u)| !(p.is_empty() && u.is_empty()))
            .map(|(p, u)| (p.to_string(), u.to_string()))
            .collect()
    }
}

fn lexical(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{prefix}:{local}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_declares_its_own_namespace() {
        let mut ns = NamespaceStack::new();
        let (name, decls) = ns.open_element(&QName::prefixed("a", "urn:a", "root"));
        assert_eq!(name, "a:root");
        assert_eq!(decls, vec![("a".to_string(), "urn:a".to_string())]);

        let (name, decls) = ns.open_element(&QName::prefixed("a", "urn:a", "child"));
        assert_eq!(name, "a:child");
        assert!(decls.is_empty());
        assert_eq!(ns.get_prefix("urn:a").as_deref(), Some("a"));
    }

    #[test]
    fn no_namespace_element_undeclares_default() {
        let mut ns = NamespaceStack::new();
        ns.open_element(&QName::new(Some("urn:d"), "outer"));
        let (name, decls) = ns.open_element(&QName::local("inner"));
        assert_eq!(name, "inner");
        assert_eq!(decls, vec![(String::new(), String::new())]);
    }

    #[test]
    fn attributes_get_a_non_empty_prefix() {
        let mut ns = NamespaceStack::new();
        ns.open_element(&QName::local("e"));
        let (name, decl) = ns.attribute_name(&QName::new(Some("urn:x"), "att"));
        assert_eq!(name, "ns0:att");
        assert_eq!(decl, Some(("ns0".to_string(), "urn:x".to_string())));

        let (name, decl) = ns.attribute_name(&QName::new(Some("urn:x"), "other"));
        assert_eq!(name, "ns0:other");
        assert!(decl.is_none());
    }

    #[test]
    fn pending_mappings_apply_to_next_element_only() {
        let mut ns = NamespaceStack::new();
        ns.declare_pending("p", "urn:p");
        let (_, decls) = ns.open_element(&QName::local("e"));
        assert_eq!(decls, vec![("p".to_string(), "urn:p".to_string())]);
        ns.close_element();
        assert_eq!(ns.lookup("p"), None);
    }

    #[test]
    fn ended_mapping_does_not_reach_a_later_element() {
        let mut ns = NamespaceStack::new();
        ns.declare_pending("ns0", "urn:a");
        ns.withdraw_pending("ns0");
        let (_, decls) = ns.open_element(&QName::local("plain"));
        assert!(decls.is_empty());

        ns.declare_pending("ns0", "urn:a");
        ns.open_element(&QName::prefixed("ns0", "urn:a", "x"));
        ns.withdraw_pending("ns0");
        assert_eq!(ns.lookup("ns0"), Some("urn:a"));
    }

    #[test]
    fn generated_prefixes_skip_bound_ones() {
        let mut ns = NamespaceStack::inheriting(vec![("ns0".to_string(), "urn:taken".to_string())]);
        assert_eq!(ns.generate_prefix(), "ns1");
        assert_eq!(ns.in_scope(), vec![("ns0".to_string(), "urn:taken".to_string())]);
    }
}
