//! Collector-driven parsing on top of a compiled [`Grammar`].
//!
//! A [`Parser`] pairs a grammar with a set of *handlers*. A handler is bound
//! to one rule and knows how to create the object that a match of that rule
//! produces. Each handler owns a set of *collectors*, bound to descendant
//! rules, which feed matched text (or already-built child objects) into that
//! object.
//!
//! Collectors are typed: the parent object type is fixed by the handler and
//! checked by the compiler, the collector kind (string, integer or child
//! object) is fixed at registration, and child object types are checked by
//! [`Parser::verify`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sigstack_abnf_core::{load_grammar, Collector, Parser};
//!
//! #[derive(Default)]
//! struct Pair { key: String, value: i64 }
//!
//! let grammar = load_grammar("kv", "pair = key \"=\" value\nkey = 1*ALPHA\nvalue = 1*DIGIT\n");
//! let mut parser = Parser::new(Arc::new(grammar)).unwrap();
//! parser
//!     .set_handler("pair", Pair::default)
//!     .set_collector("key", Collector::string(|p: &mut Pair, s| p.key = s.to_string()))
//!     .set_collector("value", Collector::int(|p: &mut Pair, v| p.value = v));
//!
//! let (pair, len) = parser.parse_as::<Pair>("pair", "port=5060");
//! let pair = pair.unwrap();
//! assert_eq!((pair.key.as_str(), pair.value, len), ("port", 5060, 9));
//! ```

mod context;
mod recognizer;

use std::any::{type_name, Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::grammar::{Grammar, RuleId};
use recognizer::Recognizer;

/// An object built by a handler, before it is handed to its parent.
pub type Element = Box<dyn Any + Send>;

type Factory = Box<dyn Fn() -> Element + Send + Sync>;

/// The value shape a collector accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    /// The matched text
    String,
    /// The matched text read as a decimal integer
    Int,
    /// The object built by the child rule's handler
    Child,
}

pub(crate) enum StoredCollector {
    String(Box<dyn Fn(&mut (dyn Any + Send), &str) + Send + Sync>),
    Int(Box<dyn Fn(&mut (dyn Any + Send), i64) + Send + Sync>),
    Child {
        child_type: TypeId,
        child_type_name: &'static str,
        // Returns false when the child object is not of the expected type.
        apply: Box<dyn Fn(&mut (dyn Any + Send), Element) -> bool + Send + Sync>,
    },
}

/// A callback that feeds a matched child rule into a parent object of type `D`.
pub struct Collector<D> {
    stored: StoredCollector,
    _parent: PhantomData<fn(&mut D)>,
}

impl<D: Any + Send> Collector<D> {
    /// Receives the text matched by the child rule.
    pub fn string<F>(f: F) -> Self
    where
        F: Fn(&mut D, &str) + Send + Sync + 'static,
    {
        Self::wrap(StoredCollector::String(Box::new(move |object: &mut (dyn Any + Send), text: &str| {
            if let Some(parent) = object.downcast_mut::<D>() {
                f(parent, text);
            }
        })))
    }

    /// Receives the matched text converted with `atoi` semantics.
    pub fn int<F>(f: F) -> Self
    where
        F: Fn(&mut D, i64) + Send + Sync + 'static,
    {
        Self::wrap(StoredCollector::Int(Box::new(move |object: &mut (dyn Any + Send), value: i64| {
            if let Some(parent) = object.downcast_mut::<D>() {
                f(parent, value);
            }
        })))
    }

    /// Receives the object of type `C` built by the child rule's handler.
    pub fn child<C, F>(f: F) -> Self
    where
        C: Any + Send,
        F: Fn(&mut D, C) + Send + Sync + 'static,
    {
        Self::wrap(StoredCollector::Child {
            child_type: TypeId::of::<C>(),
            child_type_name: type_name::<C>(),
            apply: Box::new(move |object: &mut (dyn Any + Send), child: Element| {
                match (object.downcast_mut::<D>(), child.downcast::<C>()) {
                    (Some(parent), Ok(child)) => {
                        f(parent, *child);
                        true
                    }
                    _ => false,
                }
            }),
        })
    }

    fn wrap(stored: StoredCollector) -> Self {
        Self { stored, _parent: PhantomData }
    }

    pub fn kind(&self) -> CollectorKind {
        self.stored.kind()
    }
}

impl StoredCollector {
    fn kind(&self) -> CollectorKind {
        match self {
            StoredCollector::String(_) => CollectorKind::String,
            StoredCollector::Int(_) => CollectorKind::Int,
            StoredCollector::Child { .. } => CollectorKind::Child,
        }
    }
}

struct NamedCollector {
    rule_name: String,
    collector: StoredCollector,
}

/// The handler registered for one rule.
pub struct ParserHandler {
    rule_name: String,
    object_type: TypeId,
    object_type_name: &'static str,
    factory: Factory,
    collectors: HashMap<RuleId, NamedCollector>,
}

impl ParserHandler {
    fn new<D: Any + Send>(rule_name: &str, factory: Factory) -> Self {
        Self {
            rule_name: rule_name.to_ascii_lowercase(),
            object_type: TypeId::of::<D>(),
            object_type_name: type_name::<D>(),
            factory,
            collectors: HashMap::new(),
        }
    }

    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    /// Number of collectors bound to this handler
    pub fn num_collectors(&self) -> usize {
        self.collectors.len()
    }

    pub(crate) fn create(&self) -> Element {
        (self.factory)()
    }

    pub(crate) fn collector(&self, rule: RuleId) -> Option<&StoredCollector> {
        self.collectors.get(&rule).map(|c| &c.collector)
    }
}

impl fmt::Debug for ParserHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParserHandler")
            .field("rule", &self.rule_name)
            .field("builds", &self.object_type_name)
            .field("collectors", &self.collectors.len())
            .finish()
    }
}

/// Fluent registration of collectors on a handler building `D`.
pub struct HandlerBuilder<'p, D> {
    grammar: &'p Grammar,
    handler: &'p mut ParserHandler,
    _object: PhantomData<fn() -> D>,
}

impl<'p, D: Any + Send> HandlerBuilder<'p, D> {
    /// Binds `collector` to matches of `child_rule` below this handler's rule.
    ///
    /// An unknown child rule is logged and ignored.
    pub fn set_collector(mut self, child_rule: &str, collector: Collector<D>) -> Self {
        match self.grammar.find_rule(child_rule) {
            Some(rule) => {
                let named = NamedCollector {
                    rule_name: child_rule.to_ascii_lowercase(),
                    collector: collector.stored,
                };
                if self.handler.collectors.insert(rule, named).is_some() {
                    warn!(handler = %self.handler.rule_name, rule = %child_rule, "Replacing existing collector");
                }
            }
            None => {
                error!(handler = %self.handler.rule_name, rule = %child_rule, "Cannot install collector on unknown rule");
            }
        }
        self
    }
}

/// A grammar plus the handlers that turn matches into objects.
pub struct Parser {
    grammar: Arc<Grammar>,
    handlers: HashMap<RuleId, ParserHandler>,
    // Target for registrations on unknown rules; never consulted while parsing.
    detached: Option<ParserHandler>,
}

impl Parser {
    /// Creates a parser over `grammar`, which must be complete.
    pub fn new(grammar: Arc<Grammar>) -> Result<Self> {
        if !grammar.is_complete() {
            return Err(Error::IncompleteGrammar(grammar.unresolved_rules()));
        }
        Ok(Self {
            grammar,
            handlers: HashMap::new(),
            detached: None,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Registers the handler for `rule_name`. `factory` creates a fresh
    /// object every time the rule matches.
    ///
    /// An unknown rule is logged and the returned builder is detached: its
    /// collectors are accepted but never used.
    pub fn set_handler<D, F>(&mut self, rule_name: &str, factory: F) -> HandlerBuilder<'_, D>
    where
        D: Any + Send,
        F: Fn() -> D + Send + Sync + 'static,
    {
        let factory: Factory = Box::new(move || Box::new(factory()) as Element);
        let handler = ParserHandler::new::<D>(rule_name, factory);

        let slot = match self.grammar.find_rule(rule_name) {
            Some(rule) => match self.handlers.entry(rule) {
                Entry::Occupied(mut entry) => {
                    warn!(rule = %rule_name, "Replacing existing handler");
                    entry.insert(handler);
                    entry.into_mut()
                }
                Entry::Vacant(entry) => entry.insert(handler),
            },
            None => {
                error!(rule = %rule_name, "Cannot install handler on unknown rule");
                self.detached.insert(handler)
            }
        };

        HandlerBuilder {
            grammar: &self.grammar,
            handler: slot,
            _object: PhantomData,
        }
    }

    pub(crate) fn handler(&self, rule: RuleId) -> Option<&ParserHandler> {
        self.handlers.get(&rule)
    }

    pub(crate) fn has_handler(&self, rule: RuleId) -> bool {
        self.handlers.contains_key(&rule)
    }

    /// Whether the handler of `handler_rule` has a collector for `rule`.
    pub(crate) fn collects(&self, handler_rule: RuleId, rule: RuleId) -> bool {
        self.handlers
            .get(&handler_rule)
            .map_or(false, |h| h.collectors.contains_key(&rule))
    }

    /// Checks that every child collector has a handler on its rule and that
    /// the handler builds the type the collector expects.
    pub fn verify(&self) -> Result<()> {
        for handler in self.handlers.values() {
            for (rule, named) in &handler.collectors {
                let StoredCollector::Child { child_type, child_type_name, .. } = &named.collector else {
                    continue;
                };
                match self.handlers.get(rule) {
                    None => return Err(Error::MissingHandler(named.rule_name.clone())),
                    Some(child) if child.object_type != *child_type => {
                        return Err(Error::CollectorTypeMismatch {
                            rule: named.rule_name.clone(),
                            expected: child_type_name,
                            found: child.object_type_name,
                        })
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Matches `input` against `rule_name` and builds the root object.
    ///
    /// Returns the object built by the root rule's handler (or `None` when
    /// the rule has no handler or nothing matched) together with the number
    /// of bytes matched. A failed match yields `(None, 0)`.
    pub fn parse_input<I>(&self, rule_name: &str, input: &I) -> (Option<Element>, usize)
    where
        I: AsRef<[u8]> + ?Sized,
    {
        let Some(rule) = self.grammar.find_rule(rule_name) else {
            error!(rule = %rule_name, "Cannot parse with unknown rule");
            return (None, 0);
        };
        let input = input.as_ref();

        let mut recognizer = Recognizer::new(self, input);
        match recognizer.feed_rule(rule, 0) {
            Some(length) => {
                debug!(rule = %rule_name, length, total = input.len(), "Input matched");
                (recognizer.into_root(), length)
            }
            None => {
                debug!(rule = %rule_name, "Input did not match");
                (None, 0)
            }
        }
    }

    /// [`parse_input`](Self::parse_input) with the root downcast to `T`.
    pub fn parse_as<T: Any>(&self, rule_name: &str, input: &(impl AsRef<[u8]> + ?Sized)) -> (Option<T>, usize) {
        let (root, length) = self.parse_input(rule_name, input);
        let typed = root.and_then(|r| match r.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(_) => {
                warn!(rule = %rule_name, "Root object is not a {}", type_name::<T>());
                None
            }
        });
        (typed, length)
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parser")
            .field("grammar", &self.grammar.name())
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
