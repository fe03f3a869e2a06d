use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrampusError {
    #[error("Grammar error: {0}")]
    Grammar(#[from] GrammarError),

    #[error("Tokenize error: {0}")]
    Tokenize(#[from] TokenizeError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("Failed to read grammar file {path}: {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing ::= on line {line}")]
    MissingSeparator { line: usize },

    #[error("Unexpected ::= on line {line}")]
    UnexpectedSeparator { line: usize },

    #[error("Missing rule name on line {line}")]
    MissingName { line: usize },

    #[error("Unterminated string literal on line {line}")]
    UnterminatedLiteral { line: usize },

    #[error("Unterminated rx% regex on line {line}")]
    UnterminatedRegex { line: usize },

    #[error("Duplicate rule {name}; use alternations (x ::= a | b), not a second definition")]
    DuplicateRule { name: String },

    #[error("Not a defined grammar rule: '{name}' (line {line})")]
    UndefinedRule { name: String, line: usize },

    #[error("Invalid regex '{pattern}' on line {line}: {source}")]
    InvalidRegex {
        pattern: String,
        line: usize,
        #[source]
        source: regex::Error,
    },

    #[error("Malformed {what} on line {line}")]
    MalformedTerm { what: String, line: usize },

    #[error("$become must be the final term of its alternation (rule {rule}, line {line})")]
    MisplacedBecome { rule: String, line: usize },

    #[error("Pseudo-rule {name} expects {expected} (line {line})")]
    BadPseudoRule {
        name: String,
        expected: String,
        line: usize,
    },

    #[error("Grammar has no rules")]
    Empty,
}

#[derive(Error, Debug)]
pub enum TokenizeError {
    #[error("No token matches at byte {offset} (line {line})")]
    Stuck { offset: usize, line: usize },

    #[error("Unterminated block comment starting at byte {offset} (line {line})")]
    UnterminatedComment { offset: usize, line: usize },

    #[error("Unbalanced bracket `{text}` at token {index}")]
    UnbalancedBracket { text: String, index: usize },
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Rule {name} is not defined in the grammar")]
    RuleNotFound { name: String },

    #[error("Failed to match token at {token_index} in rule {rule} alt {alt}. Token is `{found}`.")]
    Mismatch {
        rule: String,
        alt: usize,
        token_index: usize,
        found: String,
    },

    #[error("Failed to match rule {rule} at token position {token_index}")]
    NoAlternative { rule: String, token_index: usize },

    #[error("Unknown guard {name}")]
    UnknownGuard { name: String },

    #[error("Unknown hook {name} inside of {rule}")]
    UnknownHook { name: String, rule: String },

    #[error("Guard {name} raised an error: {message}")]
    GuardFailure { name: String, message: String },

    #[error("Hook {name} failed at token {token_index}: {message}")]
    HookFailure {
        name: String,
        token_index: usize,
        message: String,
    },

    #[error("Exceeded recursion depth limit of {limit}")]
    DepthLimit { limit: usize },

    #[error("Parse stopped at token {token_index} of {total}; trailing input was not consumed")]
    Incomplete { token_index: usize, total: usize },

    #[error("Input not recognized; chart filled {columns} of {total} columns")]
    NotRecognized { columns: usize, total: usize },

    #[error("The {engine} engine does not support grammar annotations (guards, hooks, peeks, directives)")]
    UnsupportedGrammar { engine: String },
}

pub type Result<T, E = GrampusError> = std::result::Result<T, E>;
