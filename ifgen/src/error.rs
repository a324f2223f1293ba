// error.rs — Error type shared by every ifgen operation
//
// All validation fails fast: the first violation aborts the enclosing build,
// parse, or call-site generation and is reported through `HeaderError`.

use std::path::PathBuf;

/// Errors raised while building, parsing, printing, or invoking a header.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Port names must be lowercase identifiers.
    #[error("invalid field name: '{0}'")]
    InvalidFieldName(String),

    #[error("invalid qualified path: '{0}'")]
    InvalidQualifiedPath(String),

    #[error("duplicate port name '{0}'")]
    DuplicatePort(String),

    #[error("{what}: expected {expected}, found {found}")]
    ArityMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("malformed channel name: '{0}'")]
    MalformedChannelName(String),

    #[error("unknown port '{port}' in channel name '{name}'")]
    UnknownPort { port: String, name: String },

    #[error("channel {channel} is out of range for {outputs} outputs and {inputs} inputs")]
    ChannelOutOfRange {
        channel: String,
        outputs: usize,
        inputs: usize,
    },

    #[error("invalid variant text: {0}")]
    InvalidVariantText(String),

    #[error("unknown variant name '{0}'")]
    UnknownVariant(String),

    /// A toggle combination with no short name in the registry.
    #[error("unregistered capability variant {0}")]
    UnregisteredVariant(String),

    #[error("variant '{0}' listed more than once")]
    DuplicateVariant(String),

    #[error("the default variant (no derivatives) must be supported and come first")]
    MissingDefaultVariant,

    #[error("variant '{0}' is not supported by this header")]
    UnsupportedVariant(String),

    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("conflicting values for channel '{channel}': {first} vs {second}")]
    ConflictingConstant {
        channel: String,
        first: String,
        second: String,
    },

    #[error("channel '{0}' is not in the enumeration of any supported variant")]
    ChannelOutsideVariants(String),

    #[error("zero-order channel '{0}' cannot be constant")]
    ConstantValueChannel(String),

    #[error("constant channel '{channel}' has non-finite literal {value}")]
    NonFiniteLiteral { channel: String, value: f64 },

    #[error("channel '{channel}' has type {found}, but output port has type {expected}")]
    ChannelTypeMismatch {
        channel: String,
        expected: String,
        found: String,
    },

    #[error("no destination for consumed channel '{0}'")]
    MissingDestination(String),

    #[error("consumed channel '{channel}' is neither emitted nor constant in variant {variant}")]
    UnavailableChannel { channel: String, variant: String },

    #[error("invalid library location: {0}")]
    InvalidLocation(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HeaderError>;
