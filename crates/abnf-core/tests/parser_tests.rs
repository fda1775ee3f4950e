//! Tests for matching and collector-driven object construction

use proptest::prelude::*;
use sigstack_abnf_core::{load_grammar, Collector, Error, Parser};
use std::sync::Arc;

const LIST_ABNF: &str = "\
list = item *( \",\" item )
item = 1*ALPHA
";

const RECORD_ABNF: &str = "\
record = field *( \";\" field )
field = name \"=\" number
name = 1*ALPHA
number = 1*DIGIT
";

#[derive(Debug, Default)]
struct Record {
    fields: Vec<Field>,
}

#[derive(Debug, Default, PartialEq)]
struct Field {
    name: String,
    number: i64,
}

fn parser_for(abnf: &str) -> Parser {
    let grammar = load_grammar("test", abnf);
    Parser::new(Arc::new(grammar)).expect("grammar should be complete")
}

fn list_parser() -> Parser {
    let mut parser = parser_for(LIST_ABNF);
    parser
        .set_handler("list", Vec::<String>::new)
        .set_collector("item", Collector::string(|items: &mut Vec<String>, s| items.push(s.to_string())));
    parser
}

fn record_parser() -> Parser {
    let mut parser = parser_for(RECORD_ABNF);
    parser
        .set_handler("record", Record::default)
        .set_collector("field", Collector::child(|r: &mut Record, f: Field| r.fields.push(f)));
    parser
        .set_handler("field", Field::default)
        .set_collector("name", Collector::string(|f: &mut Field, s| f.name = s.to_string()))
        .set_collector("number", Collector::int(|f: &mut Field, v| f.number = v));
    parser
}

#[test]
fn test_ordered_choice_takes_first_match() {
    let parser = parser_for("r = \"a\" / \"ab\"\ns = r \"b\"\n");
    // the shorter alternative wins even though the longer one would also match
    assert_eq!(parser.parse_input("r", "ab").1, 1);
    assert_eq!(parser.parse_input("s", "ab").1, 2);
}

#[test]
fn test_empty_alternative_is_a_fallback() {
    let parser = parser_for("r = *\"x\" / \"y\"\n");
    assert_eq!(parser.parse_input("r", "y").1, 1);
    assert_eq!(parser.parse_input("r", "xx").1, 2);
    // nothing consumed, but the empty match still succeeds
    assert_eq!(parser.parse_input("r", "z").1, 0);
}

#[test]
fn test_literals_are_case_insensitive() {
    let parser = parser_for("m = \"invite\"\nexact = %s\"ACK\"\n");
    assert_eq!(parser.parse_input("m", "INVITE").1, 6);
    assert_eq!(parser.parse_input("exact", "ACK").1, 3);
    assert_eq!(parser.parse_input("exact", "ack").1, 0);
}

#[test]
fn test_parse_reports_matched_prefix() {
    let parser = list_parser();
    let (items, len) = parser.parse_as::<Vec<String>>("list", "one,two rest");
    assert_eq!(len, 7);
    assert_eq!(items.unwrap(), vec!["one", "two"]);
}

#[test]
fn test_failed_match_builds_nothing() {
    let parser = list_parser();
    let (items, len) = parser.parse_as::<Vec<String>>("list", "123");
    assert!(items.is_none());
    assert_eq!(len, 0);
}

#[test]
fn test_collector_called_once_per_occurrence() {
    let parser = list_parser();
    let (items, _) = parser.parse_as::<Vec<String>>("list", "a,bb,ccc,dddd");
    assert_eq!(items.unwrap(), vec!["a", "bb", "ccc", "dddd"]);
}

#[test]
fn test_zero_length_match_is_not_collected() {
    #[derive(Default)]
    struct Calls(usize);

    let mut parser = parser_for("top = opt \"!\"\nopt = *ALPHA\n");
    parser
        .set_handler("top", Calls::default)
        .set_collector("opt", Collector::string(|c: &mut Calls, _| c.0 += 1));

    let (calls, len) = parser.parse_as::<Calls>("top", "!");
    assert_eq!(len, 1);
    assert_eq!(calls.unwrap().0, 0);

    let (calls, _) = parser.parse_as::<Calls>("top", "abc!");
    assert_eq!(calls.unwrap().0, 1);
}

#[test]
fn test_child_objects_are_built_bottom_up() {
    let parser = record_parser();
    parser.verify().unwrap();

    let (record, len) = parser.parse_as::<Record>("record", "alpha=1;beta=22;gamma=333");
    assert_eq!(len, 25);
    let record = record.unwrap();
    assert_eq!(
        record.fields,
        vec![
            Field { name: "alpha".into(), number: 1 },
            Field { name: "beta".into(), number: 22 },
            Field { name: "gamma".into(), number: 333 },
        ]
    );
}

#[test]
fn test_backtracked_alternative_discards_collected_children() {
    let mut parser = parser_for("top = field \"!\" / field \"?\"\nfield = name \"=\" number\nname = 1*ALPHA\nnumber = 1*DIGIT\n");
    parser
        .set_handler("top", Record::default)
        .set_collector("field", Collector::child(|r: &mut Record, f: Field| r.fields.push(f)));
    parser
        .set_handler("field", Field::default)
        .set_collector("name", Collector::string(|f: &mut Field, s| f.name = s.to_string()));

    let (record, len) = parser.parse_as::<Record>("top", "x=1?");
    assert_eq!(len, 4);
    assert_eq!(record.unwrap().fields.len(), 1);
}

#[test]
fn test_abandoned_alternative_leaves_no_root() {
    let mut parser = parser_for("r = a \"x\" / \"y\"\na = \"y\"\n");
    parser.set_handler("a", Field::default);

    let (root, len) = parser.parse_input("r", "y");
    assert_eq!(len, 1);
    assert!(root.is_none());

    // the same object survives when its alternative commits
    let (field, len) = parser.parse_as::<Field>("r", "yx");
    assert_eq!(len, 2);
    assert!(field.is_some());
}

#[test]
fn test_int_collector_uses_leading_digits() {
    #[derive(Default)]
    struct Port(i64);

    let mut parser = parser_for("hostport = host [\":\" port]\nhost = 1*ALPHA\nport = 1*DIGIT\n");
    parser
        .set_handler("hostport", Port::default)
        .set_collector("port", Collector::int(|p: &mut Port, v| p.0 = v));

    let (port, _) = parser.parse_as::<Port>("hostport", "example:5061");
    assert_eq!(port.unwrap().0, 5061);
    let (port, _) = parser.parse_as::<Port>("hostport", "example");
    assert_eq!(port.unwrap().0, 0);
}

#[test]
fn test_root_without_handler_yields_length_only() {
    let parser = parser_for(LIST_ABNF);
    let (root, len) = parser.parse_input("list", "a,b");
    assert!(root.is_none());
    assert_eq!(len, 3);
}

#[test]
fn test_verify_reports_missing_child_handler() {
    let mut parser = parser_for(RECORD_ABNF);
    parser
        .set_handler("record", Record::default)
        .set_collector("field", Collector::child(|r: &mut Record, f: Field| r.fields.push(f)));

    assert_eq!(parser.verify(), Err(Error::MissingHandler("field".into())));
}

#[test]
fn test_verify_reports_type_mismatch() {
    let mut parser = parser_for(RECORD_ABNF);
    parser
        .set_handler("record", Record::default)
        .set_collector("field", Collector::child(|r: &mut Record, f: Field| r.fields.push(f)));
    parser.set_handler("field", String::new);

    match parser.verify() {
        Err(Error::CollectorTypeMismatch { rule, .. }) => assert_eq!(rule, "field"),
        other => panic!("expected type mismatch, got {other:?}"),
    }
}

#[test]
fn test_unknown_rules_are_ignored_at_registration() {
    let mut parser = list_parser();
    parser
        .set_handler("no-such-rule", Vec::<String>::new)
        .set_collector("item", Collector::string(|items: &mut Vec<String>, s| items.push(s.to_string())));
    parser
        .set_handler("list", Vec::<String>::new)
        .set_collector("nothing", Collector::string(|_: &mut Vec<String>, _| {}))
        .set_collector("item", Collector::string(|items: &mut Vec<String>, s| items.push(s.to_uppercase())));

    let (items, _) = parser.parse_as::<Vec<String>>("list", "a,b");
    assert_eq!(items.unwrap(), vec!["A", "B"]);
    assert!(parser.verify().is_ok());
}

#[test]
fn test_parser_is_reusable_across_inputs() {
    let parser = record_parser();
    for _ in 0..3 {
        let (record, _) = parser.parse_as::<Record>("record", "a=1;b=2");
        assert_eq!(record.unwrap().fields.len(), 2);
    }
}

proptest! {
    #[test]
    fn prop_every_item_is_collected_in_order(words in prop::collection::vec("[a-zA-Z]{1,8}", 1..12)) {
        let parser = list_parser();
        let input = words.join(",");
        let (items, len) = parser.parse_as::<Vec<String>>("list", &input);
        prop_assert_eq!(len, input.len());
        prop_assert_eq!(items.unwrap(), words);
    }
}
