use thiserror::Error;

/// A type alias for handling `Result`s with `Error`
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building grammars or wiring parsers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A production in the ABNF text could not be parsed
    #[error("ABNF syntax error at line {line}: {message}")]
    Abnf {
        /// 1-based line where the rule starts
        line: usize,
        /// What went wrong
        message: String,
    },

    /// A rule was defined twice with `=`
    #[error("Rule '{0}' is already defined")]
    RuleRedefined(String),

    /// The named rule does not exist in the grammar
    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    /// The grammar still references rules that were never defined
    #[error("Grammar is incomplete, unresolved rules: {}", .0.join(", "))]
    IncompleteGrammar(Vec<String>),

    /// A child collector expects a different object type than the child handler builds
    #[error("Collector for rule '{rule}' expects {expected}, but handler builds {found}")]
    CollectorTypeMismatch {
        rule: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A child collector was registered for a rule that has no handler
    #[error("Child collector registered for '{0}' but that rule has no handler")]
    MissingHandler(String),
}
