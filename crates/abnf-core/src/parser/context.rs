//! Per-parse bookkeeping: the handler stack, deferred assignments, and the
//! branch/merge discipline used by alternation.

use std::collections::HashMap;

use tracing::{error, trace, warn};

use super::{Element, Parser, StoredCollector};
use crate::grammar::RuleId;

/// A deferred collector call, replayed when the owning object is realized.
#[derive(Debug)]
pub(crate) struct Assignment {
    rule: RuleId,
    begin: usize,
    count: usize,
    child: Option<HandlerContext>,
}

/// The object being built for one match of a handled rule.
#[derive(Debug)]
pub(crate) struct HandlerContext {
    handler_rule: RuleId,
    assignments: Vec<Assignment>,
}

impl HandlerContext {
    fn new(handler_rule: RuleId) -> Self {
        Self { handler_rule, assignments: Vec::new() }
    }

    pub(crate) fn handler_rule(&self) -> RuleId {
        self.handler_rule
    }

    fn clear(&mut self) {
        self.assignments.clear();
    }
}

/// Proof that a branch was opened. It must be handed back exactly once, to
/// [`ParserContext::merge`] or [`ParserContext::remove_branch`].
#[must_use = "a branch must be merged or removed"]
#[derive(Debug)]
pub(crate) struct BranchToken {
    // Stack height right after the branch was pushed; 0 when no handler was active.
    depth: usize,
}

/// State owned by a single `parse_input` call.
#[derive(Debug, Default)]
pub(crate) struct ParserContext {
    stack: Vec<HandlerContext>,
    // Objects closed while no handler was active; the last one is the root.
    roots: Vec<HandlerContext>,
    // One recycled context per handler rule.
    cache: HashMap<RuleId, HandlerContext>,
}

impl ParserContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn create_context(&mut self, handler_rule: RuleId) -> HandlerContext {
        self.cache
            .remove(&handler_rule)
            .unwrap_or_else(|| HandlerContext::new(handler_rule))
    }

    /// Returns a context to its handler's cache slot. Only called once the
    /// context's assignments have been consumed or discarded.
    pub(crate) fn recycle(&mut self, mut ctx: HandlerContext) {
        ctx.clear();
        self.cache.entry(ctx.handler_rule).or_insert(ctx);
    }

    pub(crate) fn push(&mut self, ctx: HandlerContext) {
        self.stack.push(ctx);
    }

    pub(crate) fn pop(&mut self) -> Option<HandlerContext> {
        self.stack.pop()
    }

    pub(crate) fn take_root(&mut self) -> Option<HandlerContext> {
        let root = self.roots.pop();
        while let Some(stale) = self.roots.pop() {
            self.recycle(stale);
        }
        root
    }

    /// Current length of the top context's assignment list, or of the
    /// top-level object list when no handler is active.
    pub(crate) fn mark(&self) -> usize {
        self.stack
            .last()
            .map_or(self.roots.len(), |top| top.assignments.len())
    }

    /// Drops everything queued after `mark` on the top context, or the
    /// top-level objects closed after `mark` when no handler is active.
    pub(crate) fn undo_assignments(&mut self, mark: usize) {
        if let Some(top) = self.stack.last_mut() {
            if top.assignments.len() > mark {
                trace!(dropped = top.assignments.len() - mark, "Undoing assignments");
                top.assignments.truncate(mark);
            }
            return;
        }
        if self.roots.len() > mark {
            trace!(dropped = self.roots.len() - mark, "Undoing top-level objects");
            let dropped: Vec<_> = self.roots.drain(mark..).collect();
            for ctx in dropped {
                self.recycle(ctx);
            }
        }
    }

    /// Records a non-empty match of `rule` on the top context, if its
    /// handler collects that rule. Otherwise the child context (if any) is
    /// recycled unrealized.
    pub(crate) fn set_child(
        &mut self,
        rule: RuleId,
        begin: usize,
        count: usize,
        child: Option<HandlerContext>,
        parser: &Parser,
    ) {
        debug_assert!(count > 0, "zero-length matches are never collected");
        let collects = self
            .stack
            .last()
            .map_or(false, |top| parser.collects(top.handler_rule, rule));

        if collects {
            if let Some(top) = self.stack.last_mut() {
                top.assignments.push(Assignment { rule, begin, count, child });
            }
        } else if let Some(child) = child {
            self.recycle(child);
        }
    }

    /// Hands a finished handler context to its parent, or queues it as a
    /// root candidate when no other handler is active.
    pub(crate) fn close_handler(
        &mut self,
        ctx: HandlerContext,
        begin: usize,
        count: usize,
        parser: &Parser,
    ) {
        if self.stack.is_empty() {
            self.roots.push(ctx);
        } else {
            let rule = ctx.handler_rule;
            self.set_child(rule, begin, count, Some(ctx), parser);
        }
    }

    /// Opens a speculative branch on top of the current context.
    pub(crate) fn branch(&mut self) -> BranchToken {
        let Some(rule) = self.stack.last().map(|top| top.handler_rule) else {
            return BranchToken { depth: 0 };
        };
        let ctx = self.create_context(rule);
        self.stack.push(ctx);
        BranchToken { depth: self.stack.len() }
    }

    /// Folds a successful branch into its parent.
    pub(crate) fn merge(&mut self, token: BranchToken) {
        if token.depth == 0 {
            return;
        }
        assert_eq!(
            self.stack.len(),
            token.depth,
            "branch merged while another context is on top of it"
        );
        if let Some(mut branch) = self.stack.pop() {
            if let Some(parent) = self.stack.last_mut() {
                parent.assignments.append(&mut branch.assignments);
            }
            self.recycle(branch);
        }
    }

    /// Discards a failed branch together with everything it collected.
    pub(crate) fn remove_branch(&mut self, token: BranchToken) {
        if token.depth == 0 {
            return;
        }
        assert_eq!(
            self.stack.len(),
            token.depth,
            "branch removed while another context is on top of it"
        );
        if let Some(branch) = self.stack.pop() {
            self.recycle(branch);
        }
    }

    /// Builds the object for `ctx`, children first, then replays its
    /// assignments through the registered collectors.
    pub(crate) fn realize(
        &mut self,
        mut ctx: HandlerContext,
        parser: &Parser,
        input: &[u8],
    ) -> Option<Element> {
        let Some(handler) = parser.handler(ctx.handler_rule) else {
            error!(rule = ctx.handler_rule.index(), "No handler for context being realized");
            return None;
        };
        let mut object = handler.create();

        for assignment in ctx.assignments.drain(..) {
            let Some(collector) = handler.collector(assignment.rule) else {
                continue;
            };
            let span = &input[assignment.begin..assignment.begin + assignment.count];

            match collector {
                StoredCollector::String(apply) => {
                    apply(object.as_mut(), &String::from_utf8_lossy(span));
                    if let Some(child) = assignment.child {
                        self.recycle(child);
                    }
                }
                StoredCollector::Int(apply) => {
                    apply(object.as_mut(), leading_int(span));
                    if let Some(child) = assignment.child {
                        self.recycle(child);
                    }
                }
                StoredCollector::Child { apply, child_type_name, .. } => {
                    let Some(child) = assignment.child else {
                        warn!(
                            handler = %handler.rule_name(),
                            "Child collector matched a rule without a handler, expected {}",
                            child_type_name
                        );
                        continue;
                    };
                    if let Some(value) = self.realize(child, parser, input) {
                        if !apply(object.as_mut(), value) {
                            error!(
                                handler = %handler.rule_name(),
                                "Child object is not a {}", child_type_name
                            );
                        }
                    }
                }
            }
        }

        self.recycle(ctx);
        Some(object)
    }
}

/// `atoi`: optional sign followed by leading decimal digits, 0 if none.
fn leading_int(span: &[u8]) -> i64 {
    let text = String::from_utf8_lossy(span);
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    if negative {
        -value
    } else {
        value
    }
}
