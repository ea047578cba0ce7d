//! Error types for declaration, matching and reconciliation

use thiserror::Error;

/// Platform error code for "object does not exist or not authorized".
pub const NOT_FOUND_OR_UNAUTHORIZED_CODE: i64 = 2003;

/// Grupin errors
#[derive(Error, Debug)]
pub enum GrupinError {
    /// Expression text does not parse
    #[error("Invalid expression '{expr}': {reason}")]
    InvalidExpression { expr: String, reason: String },

    /// Identifier fails the naming rule
    #[error("Invalid identifier '{0}' (must be lowercase letters, digits and single underscores)")]
    InvalidIdentifier(String),

    /// Placeholder expansion failed or was ambiguous
    #[error("Template error in '{expr}': {reason}")]
    Template { expr: String, reason: String },

    /// Same expression listed twice
    #[error("Duplicate expression: {0}")]
    DuplicateExpression(String),

    /// Two expressions in one set share names
    #[error("Expressions overlap: {0} and {1}")]
    Overlap(String, String),

    /// Exclude sits inside no include
    #[error("Exclude expression {0} is not a strict subset of any include expression")]
    OrphanExclude(String),

    /// Exclude sits inside several includes
    #[error("Exclude expression {exclude} is a strict subset of more than one include expression: {includes}")]
    AmbiguousExclude { exclude: String, includes: String },

    /// Column matcher misses every object of its interface
    #[error("Column matcher '{matcher}' of interface '{interface}' does not overlap its objects in stage '{dtap}'")]
    ColumnMatcherDisjoint {
        interface: String,
        matcher: String,
        dtap: String,
    },

    /// Interface exposes objects its product does not own
    #[error("Interface '{interface}' of product '{product}' reaches outside the product with {expr} in stage '{dtap}'")]
    InterfaceOutsideProduct {
        product: String,
        interface: String,
        expr: String,
        dtap: String,
    },

    /// Two products claim the same objects
    #[error("Products '{0}' and '{1}' declare overlapping objects")]
    ProductOverlap(String, String),

    /// Consumption names an undeclared product
    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    /// Consumption names an undeclared interface
    #[error("Unknown interface '{interface}' of product '{product}'")]
    UnknownInterface { product: String, interface: String },

    /// Product consumes one of its own interfaces
    #[error("Product '{0}' consumes its own interface")]
    SelfConsumption(String),

    /// Product declares no classification
    #[error("Product '{0}' has no classification")]
    MissingClassification(String),

    /// User group not in the registry
    #[error("Unknown user group: {0}")]
    UnknownUserGroup(String),

    /// Producing service not in the registry
    #[error("Unknown producing service: {0}")]
    UnknownService(String),

    /// Structurally invalid declaration
    #[error("Invalid declaration: {0}")]
    InvalidDeclaration(String),

    /// Role name does not parse under the configured prefixes
    #[error("Role name '{0}' does not follow the naming scheme")]
    InvalidRoleName(String),

    /// Object dropped or access revoked since it was listed (retryable)
    #[error("Object does not exist or not authorized: {0}")]
    NotFoundOrUnauthorized(String),

    /// Any other platform error
    #[error("SQL error {code}: {message}")]
    Sql { code: i64, message: String },

    /// Connection or driver failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Session cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// Unit kept drifting until the attempt ceiling
    #[error("Giving up on {unit} after {attempts} attempts: {last}")]
    RetriesExhausted {
        unit: String,
        attempts: u32,
        last: Box<GrupinError>,
    },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GrupinError {
    /// Classify a raw platform error.
    pub fn from_sql(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        if code == NOT_FOUND_OR_UNAUTHORIZED_CODE {
            GrupinError::NotFoundOrUnauthorized(message)
        } else {
            GrupinError::Sql { code, message }
        }
    }

    /// Drift errors are retried by the reconciler, everything else is fatal
    /// for the operation that hit it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GrupinError::NotFoundOrUnauthorized(_))
    }

    pub(crate) fn invalid_expression(expr: &str, reason: impl Into<String>) -> Self {
        GrupinError::InvalidExpression {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }
}

/// Grupin result type
pub type Result<T> = std::result::Result<T, GrupinError>;
