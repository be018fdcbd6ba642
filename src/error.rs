//! Error types for the RETE engine.
//!
//! Errors fall into three groups. Rule and topology errors are fatal at start-up:
//! a node built from a bad rule refuses to start. Processing errors fail a single
//! delivery so the transport can redeliver it. Sink errors are logged and
//! swallowed by the conflict set.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing or compiling rule text
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    /// The rule text could not be tokenised or parsed
    #[error("Rule parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// A prefixed name used a prefix with no declaration
    #[error("Unknown prefix '{0}'")]
    UnknownPrefix(String),

    /// The rule body contains no triple pattern to match against
    #[error("Rule '{0}' has no body triple pattern")]
    EmptyBody(String),

    /// A head or guard variable is never bound by a body triple pattern
    #[error("Rule '{rule}' uses variable ?{variable} which no body triple pattern binds")]
    UnboundVariable { rule: String, variable: String },

    /// A functor names a builtin the engine does not know
    #[error("Rule '{rule}' uses unknown builtin '{name}'")]
    UnknownBuiltin { rule: String, name: String },

    /// A builtin that mutates or hides data, which a stream cannot support
    #[error("Rule '{rule}' uses unsupported builtin '{name}'")]
    UnsupportedBuiltin { rule: String, name: String },

    /// A builtin was called with the wrong number of arguments
    #[error("Rule '{rule}': builtin '{name}' takes {expected} arguments, found {found}")]
    BuiltinArity { rule: String, name: String, expected: usize, found: usize },

    /// A regex guard's pattern does not compile
    #[error("Rule '{rule}': invalid regex: {message}")]
    InvalidRegex { rule: String, message: String },

    /// Two rules in one topology share a name
    #[error("Duplicate rule name '{0}'")]
    DuplicateRule(String),
}

impl RuleError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        RuleError::Parse { offset, message: message.into() }
    }
}

/// Errors raised while wiring compiled rules into a topology
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopologyError {
    /// A producer's output arity differs from what its consumer expects
    #[error(
        "Schema mismatch on edge {producer} -> {consumer}: \
         producer emits {produced} fields, consumer expects {expected}"
    )]
    SchemaMismatch {
        producer: String,
        consumer: String,
        produced: usize,
        expected: usize,
    },

    /// An edge refers to a node that was never declared
    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    /// A topology must contain at least one rule
    #[error("Topology contains no rules")]
    Empty,

    /// A parallelism hint of zero was configured
    #[error("Parallelism for {0} must be at least 1")]
    ZeroParallelism(&'static str),
}

/// Errors raised while processing a single delivery
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessError {
    /// The message kind is not accepted by the node it was routed to
    #[error("Node '{node}' cannot process a {kind} message")]
    UnexpectedMessage { node: String, kind: &'static str },

    /// A binding carries a different number of fields than the node's schema
    #[error("Node '{node}' expected {expected} fields, received {received}")]
    Arity { node: String, expected: usize, received: usize },

    /// A fire event names a rule the conflict set does not know
    #[error("Unknown rule '{0}'")]
    UnknownRule(String),

    /// A join received a message on a port it does not own
    #[error("Node '{node}' has no {port} port")]
    UnknownPort { node: String, port: String },

    /// Encoding or decoding a wire message failed
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Errors raised by external sinks
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The fact could not be expressed as an RDF triple
    #[error("Invalid RDF term: {0}")]
    InvalidTerm(String),

    /// The message broker rejected or could not accept the fact
    #[error("Broker error: {0}")]
    Broker(String),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A fact line could not be parsed
    #[error("Fact parse error: {0}")]
    FactParse(String),

    /// The transport shut down or refused a submission
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
