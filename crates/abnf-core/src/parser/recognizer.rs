use super::context::ParserContext;
use super::{Element, Parser};
use crate::grammar::{Grammar, Node, NodeId, RuleId};

/// Recursive-descent matcher for one `parse_input` call.
///
/// Every `feed_*` returns `Some(count)` on a match (possibly empty) and
/// `None` on failure; a failing node leaves the handler stack exactly as it
/// found it.
pub(crate) struct Recognizer<'a> {
    grammar: &'a Grammar,
    parser: &'a Parser,
    input: &'a [u8],
    ctx: ParserContext,
}

impl<'a> Recognizer<'a> {
    pub(crate) fn new(parser: &'a Parser, input: &'a [u8]) -> Self {
        Self {
            grammar: parser.grammar(),
            parser,
            input,
            ctx: ParserContext::new(),
        }
    }

    pub(crate) fn feed_rule(&mut self, rule: RuleId, pos: usize) -> Option<usize> {
        let body = self.grammar.rule_body(rule)?;

        if self.parser.has_handler(rule) {
            let ctx = self.ctx.create_context(rule);
            self.ctx.push(ctx);
            let result = self.feed(body, pos);
            if let Some(ctx) = self.ctx.pop() {
                debug_assert_eq!(ctx.handler_rule(), rule);
                match result {
                    Some(count) if count > 0 => self.ctx.close_handler(ctx, pos, count, self.parser),
                    _ => self.ctx.recycle(ctx),
                }
            }
            result
        } else {
            let mark = self.ctx.mark();
            let result = self.feed(body, pos);
            match result {
                Some(count) if count > 0 => self.ctx.set_child(rule, pos, count, None, self.parser),
                _ => self.ctx.undo_assignments(mark),
            }
            result
        }
    }

    fn feed(&mut self, node: NodeId, pos: usize) -> Option<usize> {
        let grammar: &'a Grammar = self.grammar;
        let input: &'a [u8] = self.input;

        match grammar.node(node) {
            Node::Char { byte, case_sensitive } => {
                let c = *input.get(pos)?;
                let matched = if *case_sensitive { c == *byte } else { c.eq_ignore_ascii_case(byte) };
                matched.then_some(1)
            }
            Node::CharRange { min, max } => {
                let c = *input.get(pos)?;
                (*min..=*max).contains(&c).then_some(1)
            }
            Node::Literal { text, case_sensitive } => {
                let slice = input.get(pos..pos + text.len())?;
                let matched = if *case_sensitive {
                    slice == text.as_slice()
                } else {
                    slice.eq_ignore_ascii_case(text)
                };
                matched.then_some(text.len())
            }
            Node::Sequence(children) => {
                let mark = self.ctx.mark();
                let mut total = 0;
                for child in children {
                    match self.feed(*child, pos + total) {
                        Some(count) => total += count,
                        None => {
                            self.ctx.undo_assignments(mark);
                            return None;
                        }
                    }
                }
                Some(total)
            }
            Node::Selector(alternatives) => self.feed_selector(alternatives, pos),
            Node::Loop { body, min, max } => {
                let mark = self.ctx.mark();
                let mut total = 0;
                let mut repetitions = 0;
                while max.map_or(true, |max| repetitions < max) {
                    match self.feed(*body, pos + total) {
                        // An empty iteration can repeat forever; it satisfies any minimum.
                        Some(0) => {
                            repetitions = repetitions.max(*min);
                            break;
                        }
                        Some(count) => {
                            total += count;
                            repetitions += 1;
                        }
                        None => break,
                    }
                }
                if repetitions < *min {
                    self.ctx.undo_assignments(mark);
                    return None;
                }
                Some(total)
            }
            Node::RuleRef(rule) => self.feed_rule(*rule, pos),
        }
    }

    /// Ordered choice: the first alternative that consumes input wins. If
    /// none does, the first one that matched empty wins with length 0.
    fn feed_selector(&mut self, alternatives: &[NodeId], pos: usize) -> Option<usize> {
        let mut matched_empty = false;
        for alternative in alternatives {
            let token = self.ctx.branch();
            match self.feed(*alternative, pos) {
                Some(count) if count > 0 => {
                    self.ctx.merge(token);
                    return Some(count);
                }
                Some(_) => {
                    matched_empty = true;
                    self.ctx.remove_branch(token);
                }
                None => self.ctx.remove_branch(token),
            }
        }
        matched_empty.then_some(0)
    }

    /// Realizes the root object, if a handled rule matched at top level.
    pub(crate) fn into_root(mut self) -> Option<Element> {
        let root = self.ctx.take_root()?;
        self.ctx.realize(root, self.parser, self.input)
    }
}
