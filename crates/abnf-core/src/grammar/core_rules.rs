use super::Grammar;

/// Builds the RFC 5234 Appendix B core rules.
///
/// Rule names are registered in lowercase like every other rule, so `ALPHA`
/// and `alpha` refer to the same rule.
pub fn core_rules() -> Grammar {
    let mut g = Grammar::new("core");

    // ALPHA = %x41-5A / %x61-7A
    let upper = g.char_range(0x41, 0x5A);
    let lower = g.char_range(0x61, 0x7A);
    let alpha = g.selector(vec![upper, lower]);
    define(&mut g, "ALPHA", alpha);

    // BIT = "0" / "1"
    let zero = g.char(b'0');
    let one = g.char(b'1');
    let bit = g.selector(vec![zero, one]);
    define(&mut g, "BIT", bit);

    let ch = g.char_range(0x01, 0x7F);
    define(&mut g, "CHAR", ch);

    let cr = g.exact_char(0x0D);
    define(&mut g, "CR", cr);

    let lf = g.exact_char(0x0A);
    define(&mut g, "LF", lf);

    let cr_ref = g.rule_ref("CR");
    let lf_ref = g.rule_ref("LF");
    let crlf = g.sequence(vec![cr_ref, lf_ref]);
    define(&mut g, "CRLF", crlf);

    // CTL = %x00-1F / %x7F
    let low = g.char_range(0x00, 0x1F);
    let del = g.exact_char(0x7F);
    let ctl = g.selector(vec![low, del]);
    define(&mut g, "CTL", ctl);

    let digit = g.char_range(0x30, 0x39);
    define(&mut g, "DIGIT", digit);

    let dquote = g.exact_char(0x22);
    define(&mut g, "DQUOTE", dquote);

    // HEXDIG = DIGIT / "A" / "B" / "C" / "D" / "E" / "F"
    let digit_ref = g.rule_ref("DIGIT");
    let mut hex = vec![digit_ref];
    for b in b'a'..=b'f' {
        hex.push(g.char(b));
    }
    let hexdig = g.selector(hex);
    define(&mut g, "HEXDIG", hexdig);

    let htab = g.exact_char(0x09);
    define(&mut g, "HTAB", htab);

    let sp = g.exact_char(0x20);
    define(&mut g, "SP", sp);

    // WSP = SP / HTAB
    let sp_ref = g.rule_ref("SP");
    let htab_ref = g.rule_ref("HTAB");
    let wsp = g.selector(vec![sp_ref, htab_ref]);
    define(&mut g, "WSP", wsp);

    // LWSP = *(WSP / CRLF WSP)
    let wsp_ref = g.rule_ref("WSP");
    let crlf_ref = g.rule_ref("CRLF");
    let wsp_ref2 = g.rule_ref("WSP");
    let folded = g.sequence(vec![crlf_ref, wsp_ref2]);
    let either = g.selector(vec![wsp_ref, folded]);
    let lwsp = g.repeat(either, 0, None);
    define(&mut g, "LWSP", lwsp);

    let octet = g.char_range(0x00, 0xFF);
    define(&mut g, "OCTET", octet);

    let vchar = g.char_range(0x21, 0x7E);
    define(&mut g, "VCHAR", vchar);

    g
}

fn define(g: &mut Grammar, name: &str, body: super::NodeId) {
    // Names are unique within this function; a failure here is a typo.
    let result = g.add_rule(name, body);
    debug_assert!(result.is_ok(), "duplicate core rule {name}");
}
