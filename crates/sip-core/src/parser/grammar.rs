//! The SIP grammar: an RFC 3261 §25 subset rewritten for ordered choice.
//!
//! Alternatives are tried left to right and the first one that consumes
//! input wins, with no backtracking into a committed alternative or loop.
//! The productions below are arranged so that this always picks what the
//! RFC's (ambiguous) grammar intends:
//!
//! - longer literals come before their prefixes (`"sips" / "sip"`)
//! - `message-header` alternatives carry their own CRLF, so a typed header
//!   whose value does not parse falls through to `extension-header`
//! - addr-spec uses `SIP-URI-noparams`, leaving `;tag=` to the header
//! - `hostname` has no trailing dot, since its label loop is greedy
//! - `port` only admits 0-65535; longer digit runs leave trailing input

use std::sync::Arc;

use sigstack_abnf_core::{load_grammar, Grammar};

/// Name the compiled grammar is registered under
pub const SIP_GRAMMAR_NAME: &str = "rfc3261";

pub const SIP_ABNF: &str = r#"
SIP-message = Request / Response
Request = Request-Line *message-header CRLF
Response = Status-Line *message-header CRLF
Request-Line = Method SP Request-URI SP SIP-Version CRLF
Status-Line = SIP-Version SP Status-Code SP Reason-Phrase CRLF
Method = token
Request-URI = SIP-URI / absoluteURI
SIP-Version = "SIP" "/" 1*DIGIT "." 1*DIGIT
Status-Code = 3DIGIT
Reason-Phrase = *( %x20-7E / HTAB / %x80-FF )

message-header = Via CRLF / From CRLF / To CRLF / Call-ID CRLF / CSeq CRLF
               / Content-Length CRLF / Max-Forwards CRLF / extension-header CRLF

Via = ( "Via" / "v" ) HCOLON via-parm *( COMMA via-parm )
via-parm = sent-protocol LWS sent-by *( SEMI via-params )
via-params = via-ttl / via-maddr / via-received / via-branch / via-extension
via-ttl = "ttl" EQUAL ttl
via-maddr = "maddr" EQUAL host
via-received = "received" EQUAL ( IPv4address / IPv6address )
via-branch = "branch" EQUAL token
via-extension = generic-param
ttl = 1*3DIGIT
sent-protocol = protocol-name SLASH protocol-version SLASH transport
protocol-name = token
protocol-version = token
transport = token
sent-by = host [ COLON port ]

From = ( "From" / "f" ) HCOLON from-spec
from-spec = ( name-addr / addr-spec ) *( SEMI generic-param )
To = ( "To" / "t" ) HCOLON to-spec
to-spec = ( name-addr / addr-spec ) *( SEMI generic-param )
name-addr = [ display-name ] LAQUOT addr-uri RAQUOT
addr-uri = SIP-URI / absoluteURI
addr-spec = SIP-URI-noparams / absoluteURI
display-name = *( token LWS ) / quoted-string

Call-ID = ( "Call-ID" / "i" ) HCOLON callid
callid = word [ "@" word ]
word = 1*( alphanum / "-" / "." / "!" / "%" / "*" / "_" / "+" / "`" / "'" / "~"
       / "(" / ")" / "<" / ">" / ":" / %x5C / DQUOTE / "/" / "[" / "]" / "?" / "{" / "}" )

CSeq = "CSeq" HCOLON cseq-value
cseq-value = 1*DIGIT LWS token

Content-Length = ( "Content-Length" / "l" ) HCOLON content-length-value
content-length-value = 1*DIGIT
Max-Forwards = "Max-Forwards" HCOLON max-forwards-value
max-forwards-value = 1*DIGIT

extension-header = header-name HCOLON header-value
header-name = token
header-value = *( %x21-7E / %x80-FF / LWS )

generic-param = token [ EQUAL gen-value ]
gen-value = token / host / quoted-string

SIP-URI = sip-uri-scheme ":" [ userinfo ] hostport uri-parameters [ uri-headers ]
SIP-URI-noparams = sip-uri-scheme ":" [ userinfo ] hostport
sip-uri-scheme = "sips" / "sip"
userinfo = user [ ":" password ] "@"
user = 1*( unreserved / escaped / user-unreserved )
user-unreserved = "&" / "=" / "+" / "$" / "," / ";" / "?" / "/"
password = *( unreserved / escaped / "&" / "=" / "+" / "$" / "," )
hostport = host [ ":" port ]
host = hostname / IPv4address / IPv6reference
hostname = *( domainlabel "." ) toplabel
domainlabel = alphanum *( *"-" alphanum )
toplabel = ALPHA *( *"-" alphanum )
IPv4address = 1*3DIGIT "." 1*3DIGIT "." 1*3DIGIT "." 1*3DIGIT
IPv6reference = "[" IPv6address "]"
IPv6address = 1*( HEXDIG / ":" / "." )
port = "6553" %x30-35 / "655" %x30-32 DIGIT / "65" %x30-34 2DIGIT
     / "6" %x30-34 3DIGIT / %x31-35 4DIGIT / 1*4DIGIT
uri-parameters = *( ";" uri-parameter )
uri-parameter = pname [ "=" pvalue ]
pname = 1*paramchar
pvalue = 1*paramchar
paramchar = param-unreserved / unreserved / escaped
param-unreserved = "[" / "]" / "/" / ":" / "&" / "+" / "$"
uri-headers = "?" uri-header *( "&" uri-header )
uri-header = hname "=" hvalue
hname = 1*( hnv-unreserved / unreserved / escaped )
hvalue = *( hnv-unreserved / unreserved / escaped )
hnv-unreserved = "[" / "]" / "/" / "?" / ":" / "+" / "$"

absoluteURI = scheme ":" ( hier-part / opaque-part )
scheme = ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
hier-part = ( net-path / abs-path ) [ "?" query ]
net-path = "//" authority [ abs-path ]
abs-path = "/" path-segments
path-segments = segment *( "/" segment )
segment = *pchar *( ";" param )
param = *pchar
pchar = unreserved / escaped / ":" / "@" / "&" / "=" / "+" / "$" / ","
authority = srvr / reg-name
srvr = [ userinfo ] hostport
reg-name = 1*( unreserved / escaped / "$" / "," / ";" / ":" / "@" / "&" / "=" / "+" )
query = *uric
opaque-part = uric-no-slash *uric
uric = reserved / unreserved / escaped
uric-no-slash = unreserved / escaped / ";" / "?" / ":" / "@" / "&" / "=" / "+" / "$" / ","

alphanum = ALPHA / DIGIT
unreserved = alphanum / mark
mark = "-" / "_" / "." / "!" / "~" / "*" / "'" / "(" / ")"
escaped = "%" HEXDIG HEXDIG
reserved = ";" / "/" / "?" / ":" / "@" / "&" / "=" / "+" / "$" / ","
token = 1*( alphanum / "-" / "." / "!" / "%" / "*" / "_" / "+" / "`" / "'" / "~" )

LWS = [ *WSP CRLF ] 1*WSP
SWS = [ LWS ]
HCOLON = *( SP / HTAB ) ":" SWS
SEMI = SWS ";" SWS
EQUAL = SWS "=" SWS
COLON = SWS ":" SWS
SLASH = SWS "/" SWS
COMMA = SWS "," SWS
LAQUOT = SWS "<"
RAQUOT = ">" SWS
quoted-string = SWS DQUOTE *( qdtext / quoted-pair ) DQUOTE
qdtext = LWS / %x21 / %x23-5B / %x5D-7E / %x80-FF
quoted-pair = %x5C ( %x00-09 / %x0B-0C / %x0E-7F )
"#;

/// Compiles [`SIP_ABNF`] on top of the ABNF core rules.
pub fn sip_grammar() -> Arc<Grammar> {
    Arc::new(load_grammar(SIP_GRAMMAR_NAME, SIP_ABNF))
}
