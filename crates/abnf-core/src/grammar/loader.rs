//! ABNF text (RFC 5234 / RFC 7405) to [`Grammar`] compiler.
//!
//! Rule text is parsed with nom into a small expression tree, validated, and
//! only then emitted into the grammar arena so that a rejected rule leaves no
//! trace (no orphan nodes, no dangling references).

use nom::{
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, one_of, satisfy, space0, space1},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult,
};
use tracing::{debug, warn};

use super::{core_rules, Grammar, NodeId};
use crate::error::{Error, Result};

type ParseResult<'a, O> = IResult<&'a str, O>;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Alternation(Vec<Expr>),
    Concatenation(Vec<Expr>),
    Repetition {
        min: usize,
        max: Option<usize>,
        expr: Box<Expr>,
    },
    Rule(String),
    CharVal {
        text: String,
        case_sensitive: bool,
    },
    NumVal(Vec<u32>),
    NumRange(u32, u32),
    Prose(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DefinedAs {
    Assign,
    Extend,
}

/// Compiles ABNF text on top of the core rules.
///
/// Malformed productions are logged and left out; check
/// [`Grammar::is_complete`] before building a parser on the result.
pub fn load_grammar(name: &str, text: &str) -> Grammar {
    let mut grammar = Grammar::new(name);
    grammar.include(&core_rules());
    let loaded = grammar.load_str(text);
    debug!(grammar = %name, loaded, "ABNF grammar loaded");
    if !grammar.is_complete() {
        warn!(grammar = %name, unresolved = ?grammar.unresolved_rules(), "Grammar has unresolved rules");
    }
    grammar
}

impl Grammar {
    /// Parses ABNF rules from `text` into this grammar.
    ///
    /// Returns the number of rules accepted. Rejected rules are logged at
    /// `warn` and skipped.
    pub fn load_str(&mut self, text: &str) -> usize {
        let mut loaded = 0;
        for (line, chunk) in split_rules(text) {
            match self.load_rule(&chunk, line) {
                Ok(()) => loaded += 1,
                Err(e) => warn!(grammar = %self.name, error = %e, "Skipping ABNF rule"),
            }
        }
        loaded
    }

    fn load_rule(&mut self, text: &str, line: usize) -> Result<()> {
        let (name, defined_as, expr) = match rule(text) {
            Ok((_, parsed)) => parsed,
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                return Err(Error::Abnf {
                    line,
                    message: format!("unexpected input near '{}'", snippet(e.input)),
                })
            }
            Err(nom::Err::Incomplete(_)) => {
                return Err(Error::Abnf { line, message: "incomplete rule".into() })
            }
        };

        check(&expr).map_err(|message| Error::Abnf { line, message })?;

        match defined_as {
            DefinedAs::Assign => {
                if self.find_rule(name).is_some() {
                    return Err(Error::RuleRedefined(name.to_ascii_lowercase()));
                }
                let body = emit(self, &expr);
                self.add_rule(name, body)?;
            }
            DefinedAs::Extend => {
                if self.find_rule(name).is_none() {
                    return Err(Error::UnknownRule(name.to_string()));
                }
                let alternative = emit(self, &expr);
                self.extend_rule(name, alternative)?;
            }
        }
        Ok(())
    }
}

fn snippet(input: &str) -> &str {
    match input.char_indices().nth(20) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Removes a `;` comment, ignoring semicolons inside quoted strings.
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (idx, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ';' if !quoted => return &line[..idx],
            _ => {}
        }
    }
    line
}

/// Groups physical lines into rules. A rule starts in column 0; indented
/// lines continue the previous rule.
fn split_rules(text: &str) -> Vec<(usize, String)> {
    let mut rules: Vec<(usize, String)> = Vec::new();
    for (n, raw) in text.lines().enumerate() {
        let line = strip_comment(raw);
        if line.trim().is_empty() {
            continue;
        }
        let continues = line.starts_with(char::is_whitespace);
        match rules.last_mut() {
            Some((_, current)) if continues => {
                current.push(' ');
                current.push_str(line.trim());
            }
            _ => rules.push((n + 1, line.trim().to_string())),
        }
    }
    rules
}

fn rule(i: &str) -> ParseResult<(&str, DefinedAs, Expr)> {
    all_consuming(tuple((rulename, defined_as, terminated(alternation, space0))))(i)
}

fn rulename(i: &str) -> ParseResult<&str> {
    recognize(pair(
        satisfy(|c| c.is_ascii_alphabetic()),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '-'),
    ))(i)
}

fn defined_as(i: &str) -> ParseResult<DefinedAs> {
    delimited(
        space0,
        alt((
            value(DefinedAs::Extend, tag("=/")),
            value(DefinedAs::Extend, tag("/=")),
            value(DefinedAs::Assign, tag("=")),
        )),
        space0,
    )(i)
}

fn alternation(i: &str) -> ParseResult<Expr> {
    map(
        separated_list1(delimited(space0, char('/'), space0), concatenation),
        |mut items| {
            if items.len() == 1 {
                items.remove(0)
            } else {
                Expr::Alternation(items)
            }
        },
    )(i)
}

fn concatenation(i: &str) -> ParseResult<Expr> {
    map(separated_list1(space1, repetition), |mut items| {
        if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Concatenation(items)
        }
    })(i)
}

fn repetition(i: &str) -> ParseResult<Expr> {
    map(pair(opt(repeat), element), |(rep, expr)| match rep {
        Some((min, max)) => Expr::Repetition { min, max, expr: Box::new(expr) },
        None => expr,
    })(i)
}

fn repeat(i: &str) -> ParseResult<(usize, Option<usize>)> {
    alt((
        map(tuple((opt(number), char('*'), opt(number))), |(min, _, max)| {
            (min.unwrap_or(0), max)
        }),
        map(number, |n| (n, Some(n))),
    ))(i)
}

fn number(i: &str) -> ParseResult<usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(i)
}

fn element(i: &str) -> ParseResult<Expr> {
    alt((
        map(rulename, |name| Expr::Rule(name.to_string())),
        group,
        option,
        char_val,
        num_val,
        prose_val,
    ))(i)
}

fn group(i: &str) -> ParseResult<Expr> {
    delimited(pair(char('('), space0), alternation, pair(space0, char(')')))(i)
}

fn option(i: &str) -> ParseResult<Expr> {
    map(
        delimited(pair(char('['), space0), alternation, pair(space0, char(']'))),
        |expr| Expr::Repetition { min: 0, max: Some(1), expr: Box::new(expr) },
    )(i)
}

fn quoted(i: &str) -> ParseResult<&str> {
    delimited(char('"'), take_while(|c: char| c != '"'), char('"'))(i)
}

fn char_val(i: &str) -> ParseResult<Expr> {
    alt((
        map(preceded(tag_no_case("%s"), quoted), |t| Expr::CharVal {
            text: t.to_string(),
            case_sensitive: true,
        }),
        map(preceded(tag_no_case("%i"), quoted), |t| Expr::CharVal {
            text: t.to_string(),
            case_sensitive: false,
        }),
        map(quoted, |t| Expr::CharVal { text: t.to_string(), case_sensitive: false }),
    ))(i)
}

fn hex_number(i: &str) -> ParseResult<u32> {
    map_res(take_while1(|c: char| c.is_ascii_hexdigit()), |s| u32::from_str_radix(s, 16))(i)
}

fn dec_number(i: &str) -> ParseResult<u32> {
    map_res(digit1, |s: &str| s.parse::<u32>())(i)
}

fn bin_number(i: &str) -> ParseResult<u32> {
    map_res(take_while1(|c: char| c == '0' || c == '1'), |s| u32::from_str_radix(s, 2))(i)
}

fn num_val(i: &str) -> ParseResult<Expr> {
    let (i, _) = char('%')(i)?;
    let (i, base) = one_of("xXdDbB")(i)?;
    match base.to_ascii_lowercase() {
        'x' => num_body(i, hex_number),
        'd' => num_body(i, dec_number),
        _ => num_body(i, bin_number),
    }
}

fn num_body(i: &str, number: fn(&str) -> ParseResult<u32>) -> ParseResult<Expr> {
    let (i, first) = number(i)?;
    if let Ok((rest, last)) = preceded(char('-'), number)(i) {
        return Ok((rest, Expr::NumRange(first, last)));
    }
    let (i, more) = many0(preceded(char('.'), number))(i)?;
    let mut values = vec![first];
    values.extend(more);
    Ok((i, Expr::NumVal(values)))
}

fn prose_val(i: &str) -> ParseResult<Expr> {
    map(delimited(char('<'), take_while(|c: char| c != '>'), char('>')), |t: &str| {
        Expr::Prose(t.to_string())
    })(i)
}

/// Rejects expressions the byte-oriented recognizer cannot represent.
fn check(expr: &Expr) -> std::result::Result<(), String> {
    match expr {
        Expr::Alternation(items) | Expr::Concatenation(items) => items.iter().try_for_each(check),
        Expr::Repetition { min, max, expr } => {
            if let Some(max) = max {
                if max < min {
                    return Err(format!("repeat {min}*{max} has max below min"));
                }
            }
            check(expr)
        }
        Expr::Rule(_) | Expr::CharVal { .. } => Ok(()),
        Expr::NumVal(values) => match values.iter().find(|v| **v > 0xFF) {
            Some(v) => Err(format!("value %x{v:X} does not fit in a byte")),
            None => Ok(()),
        },
        Expr::NumRange(min, max) => {
            if *max > 0xFF {
                Err(format!("range end %x{max:X} does not fit in a byte"))
            } else if min > max {
                Err(format!("empty range %x{min:X}-{max:X}"))
            } else {
                Ok(())
            }
        }
        Expr::Prose(text) => Err(format!("prose value <{text}> cannot be compiled")),
    }
}

fn emit(g: &mut Grammar, expr: &Expr) -> NodeId {
    match expr {
        Expr::Alternation(items) => {
            let children = items.iter().map(|e| emit(g, e)).collect();
            g.selector(children)
        }
        Expr::Concatenation(items) => {
            let children = items.iter().map(|e| emit(g, e)).collect();
            g.sequence(children)
        }
        Expr::Repetition { min, max, expr } => {
            let body = emit(g, expr);
            g.repeat(body, *min, *max)
        }
        Expr::Rule(name) => g.rule_ref(name),
        Expr::CharVal { text, case_sensitive } => g.literal(text.as_bytes(), *case_sensitive),
        Expr::NumVal(values) => {
            let bytes: Vec<u8> = values.iter().map(|v| *v as u8).collect();
            if bytes.len() == 1 {
                g.exact_char(bytes[0])
            } else {
                g.literal(&bytes, true)
            }
        }
        Expr::NumRange(min, max) => g.char_range(*min as u8, *max as u8),
        // check() rejects prose before emission
        Expr::Prose(_) => g.literal(b"", true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Node;

    #[test]
    fn test_split_rules_joins_continuations() {
        let text = "a = b ; comment\n    / c\n\nd = \";\" e\n";
        let rules = split_rules(text);
        assert_eq!(rules, vec![(1, "a = b / c".to_string()), (4, "d = \";\" e".to_string())]);
    }

    #[test]
    fn test_parse_repeat_forms() {
        assert_eq!(repeat("*"), Ok(("", (0, None))));
        assert_eq!(repeat("1*"), Ok(("", (1, None))));
        assert_eq!(repeat("*3"), Ok(("", (0, Some(3)))));
        assert_eq!(repeat("2*4"), Ok(("", (2, Some(4)))));
        assert_eq!(repeat("3"), Ok(("", (3, Some(3)))));
    }

    #[test]
    fn test_parse_num_vals() {
        assert_eq!(num_val("%x41-5A"), Ok(("", Expr::NumRange(0x41, 0x5A))));
        assert_eq!(num_val("%d13.10"), Ok(("", Expr::NumVal(vec![13, 10]))));
        assert_eq!(num_val("%b101"), Ok(("", Expr::NumVal(vec![5]))));
    }

    #[test]
    fn test_alternation_and_concatenation_precedence() {
        let (_, (name, defined_as, expr)) = rule("r = a b / c").unwrap();
        assert_eq!(name, "r");
        assert_eq!(defined_as, DefinedAs::Assign);
        assert_eq!(
            expr,
            Expr::Alternation(vec![
                Expr::Concatenation(vec![Expr::Rule("a".into()), Expr::Rule("b".into())]),
                Expr::Rule("c".into()),
            ])
        );
    }

    #[test]
    fn test_rejected_rule_leaves_no_pending_reference() {
        let mut g = Grammar::new("t");
        let loaded = g.load_str("good = \"x\"\nbad = missing <prose>\n");
        assert_eq!(loaded, 1);
        assert!(g.is_complete(), "skipped rule must not leave 'missing' pending");
        assert!(g.find_rule("bad").is_none());
    }

    #[test]
    fn test_incremental_alternative() {
        let mut g = Grammar::new("t");
        assert_eq!(g.load_str("r = \"a\"\nr =/ \"b\"\n"), 2);
        let body = g.rule_body(g.find_rule("r").unwrap()).unwrap();
        assert!(matches!(g.node(body), Node::Selector(alts) if alts.len() == 2));
    }

    #[test]
    fn test_case_sensitive_strings() {
        let mut g = Grammar::new("t");
        g.load_str("a = %s\"Ab\"\nb = \"Ab\"\n");
        let a = g.rule_body(g.find_rule("a").unwrap()).unwrap();
        let b = g.rule_body(g.find_rule("b").unwrap()).unwrap();
        assert_eq!(g.node(a), &Node::Literal { text: b"Ab".to_vec(), case_sensitive: true });
        assert_eq!(g.node(b), &Node::Literal { text: b"Ab".to_vec(), case_sensitive: false });
    }
}
