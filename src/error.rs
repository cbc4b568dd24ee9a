use std::fmt;

#[derive(Debug)]
pub enum ConvertError {
    UnknownProperty(String),
    MultiTermExpression { property: String, terms: usize },
    MissingComputedValue { node: usize, property: String },
    InvalidConfiguration(String),
    Io(std::io::Error),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::UnknownProperty(name) => {
                write!(f, "no property registry entry for '{}'", name)
            }
            ConvertError::MultiTermExpression { property, terms } => write!(
                f,
                "property '{}' expects a single-term value, got {} terms",
                property, terms
            ),
            ConvertError::MissingComputedValue { node, property } => write!(
                f,
                "node {} has no computed value for '{}'",
                node, property
            ),
            ConvertError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ConvertError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConvertError {
    fn from(value: std::io::Error) -> Self {
        ConvertError::Io(value)
    }
}
