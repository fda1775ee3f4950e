//! Compiled ABNF grammars.
//!
//! A [`Grammar`] is an arena of recognizer [`Node`]s plus a table of named
//! rules. Rule references are resolved lazily: referencing a rule before it
//! is defined creates a pending entry, and [`Grammar::is_complete`] reports
//! whether every pending entry has since received a body.
//!
//! Grammars are built once (usually from ABNF text via [`load_grammar`]) and
//! then shared read-only, typically behind an `Arc`.

mod core_rules;
mod loader;

pub use core_rules::core_rules;
pub use loader::load_grammar;

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Identifier of a named rule, stable for the lifetime of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleId(pub(crate) u32);

impl RuleId {
    /// Numeric value of the identifier
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifier of a recognizer node inside a grammar's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A single recognizer node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// One byte. Letters compare case-insensitively unless `case_sensitive` is set.
    Char { byte: u8, case_sensitive: bool },
    /// An inclusive byte range.
    CharRange { min: u8, max: u8 },
    /// A fixed string.
    Literal { text: Vec<u8>, case_sensitive: bool },
    /// All children, in order.
    Sequence(Vec<NodeId>),
    /// Ordered choice between children.
    Selector(Vec<NodeId>),
    /// Repetition of `body`; `max == None` means unbounded.
    Loop { body: NodeId, min: usize, max: Option<usize> },
    /// Reference to a named rule.
    RuleRef(RuleId),
}

#[derive(Debug, Clone)]
struct Rule {
    name: String,
    body: Option<NodeId>,
}

/// An ABNF grammar compiled into a recognizer graph.
#[derive(Clone)]
pub struct Grammar {
    name: String,
    nodes: Vec<Node>,
    rules: Vec<Rule>,
    index: HashMap<String, RuleId>,
}

impl Grammar {
    /// Creates an empty grammar.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            rules: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Name given at construction
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rules known to the grammar, including pending references.
    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    /// Looks up a defined rule.
    ///
    /// Returns `None` both for unknown names and for rules that have only been
    /// referenced so far.
    pub fn find_rule(&self, name: &str) -> Option<RuleId> {
        let id = *self.index.get(&name.to_ascii_lowercase())?;
        self.rules[id.index()].body.map(|_| id)
    }

    /// Returns the id for `name`, creating a pending reference if the rule
    /// has not been defined yet.
    pub fn get_rule(&mut self, name: &str) -> RuleId {
        let key = name.to_ascii_lowercase();
        if let Some(id) = self.index.get(&key) {
            return *id;
        }
        let id = RuleId(self.rules.len() as u32);
        self.rules.push(Rule { name: key.clone(), body: None });
        self.index.insert(key, id);
        id
    }

    /// Lowercased name of a rule
    pub fn rule_name(&self, id: RuleId) -> &str {
        &self.rules[id.index()].name
    }

    /// Top node of a rule's body, if the rule is defined.
    pub fn rule_body(&self, id: RuleId) -> Option<NodeId> {
        self.rules.get(id.index()).and_then(|r| r.body)
    }

    /// Access a node by id.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Returns `true` when every referenced rule has a definition.
    ///
    /// This is a pure query and gives the same answer on every call until the
    /// grammar is modified.
    pub fn is_complete(&self) -> bool {
        self.rules.iter().all(|r| r.body.is_some())
    }

    /// Names of rules that are referenced but not defined.
    pub fn unresolved_rules(&self) -> Vec<String> {
        self.rules
            .iter()
            .filter(|r| r.body.is_none())
            .map(|r| r.name.clone())
            .collect()
    }

    /// Defines `name` with the given body.
    pub fn add_rule(&mut self, name: &str, body: NodeId) -> Result<RuleId> {
        let id = self.get_rule(name);
        let rule = &mut self.rules[id.index()];
        if rule.body.is_some() {
            return Err(Error::RuleRedefined(rule.name.clone()));
        }
        rule.body = Some(body);
        Ok(id)
    }

    /// Adds an alternative to an existing rule (`=/`).
    ///
    /// A body that is not already a selector is wrapped into one.
    pub fn extend_rule(&mut self, name: &str, alternative: NodeId) -> Result<RuleId> {
        let id = self
            .index
            .get(&name.to_ascii_lowercase())
            .copied()
            .ok_or_else(|| Error::UnknownRule(name.to_string()))?;
        let body = self.rules[id.index()]
            .body
            .ok_or_else(|| Error::UnknownRule(name.to_string()))?;

        match &mut self.nodes[body.index()] {
            Node::Selector(alternatives) => alternatives.push(alternative),
            _ => {
                let wrapped = self.selector(vec![body, alternative]);
                self.rules[id.index()].body = Some(wrapped);
            }
        }
        Ok(id)
    }

    /// Copies every defined rule of `other` into this grammar.
    ///
    /// Rules already defined here win; the duplicates from `other` are
    /// logged and skipped. References inside `other` are re-targeted by name.
    pub fn include(&mut self, other: &Grammar) {
        let offset = self.nodes.len() as u32;
        let rule_map: Vec<RuleId> = other
            .rules
            .iter()
            .map(|r| self.get_rule(&r.name))
            .collect();
        let remap = |id: &NodeId| NodeId(id.0 + offset);

        for node in &other.nodes {
            let copied = match node {
                Node::Sequence(children) => Node::Sequence(children.iter().map(remap).collect()),
                Node::Selector(children) => Node::Selector(children.iter().map(remap).collect()),
                Node::Loop { body, min, max } => Node::Loop {
                    body: remap(body),
                    min: *min,
                    max: *max,
                },
                Node::RuleRef(rule) => Node::RuleRef(rule_map[rule.index()]),
                leaf => leaf.clone(),
            };
            self.nodes.push(copied);
        }

        for (rule, target) in other.rules.iter().zip(rule_map.iter()) {
            let Some(body) = rule.body else { continue };
            let slot = &mut self.rules[target.index()];
            if slot.body.is_some() {
                warn!(grammar = %self.name, rule = %rule.name, "Rule from grammar '{}' already defined, skipping", other.name);
                continue;
            }
            slot.body = Some(remap(&body));
        }
        debug!(grammar = %self.name, included = %other.name, "Included {} rules", other.rules.len());
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// A single byte; letters match either case.
    pub fn char(&mut self, byte: u8) -> NodeId {
        self.push(Node::Char { byte, case_sensitive: !byte.is_ascii_alphabetic() })
    }

    /// A single byte that must match exactly.
    pub fn exact_char(&mut self, byte: u8) -> NodeId {
        self.push(Node::Char { byte, case_sensitive: true })
    }

    /// An inclusive byte range.
    pub fn char_range(&mut self, min: u8, max: u8) -> NodeId {
        self.push(Node::CharRange { min, max })
    }

    /// A string; case-insensitive unless `case_sensitive`.
    pub fn literal(&mut self, text: &[u8], case_sensitive: bool) -> NodeId {
        if text.len() == 1 {
            let byte = text[0];
            return self.push(Node::Char {
                byte,
                case_sensitive: case_sensitive || !byte.is_ascii_alphabetic(),
            });
        }
        self.push(Node::Literal { text: text.to_vec(), case_sensitive })
    }

    pub fn sequence(&mut self, children: Vec<NodeId>) -> NodeId {
        self.push(Node::Sequence(children))
    }

    pub fn selector(&mut self, children: Vec<NodeId>) -> NodeId {
        self.push(Node::Selector(children))
    }

    pub fn repeat(&mut self, body: NodeId, min: usize, max: Option<usize>) -> NodeId {
        self.push(Node::Loop { body, min, max })
    }

    /// A reference to `name`, defined now or later.
    pub fn rule_ref(&mut self, name: &str) -> NodeId {
        let rule = self.get_rule(name);
        self.push(Node::RuleRef(rule))
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Grammar")
            .field("name", &self.name)
            .field("rules", &self.rules.len())
            .field("nodes", &self.nodes.len())
            .field("complete", &self.is_complete())
            .finish()
    }
}
