use thiserror::Error;

/// Everything that can stop a compilation.
///
/// Structural errors and selector collisions are problems in the contract
/// description. `Internal` errors are defects in the compiler itself and are
/// never the user's fault.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("contract `{contract}`: {message}")]
    Structural { contract: String, message: String },

    #[error(
        "contract `{contract}`: methods `{first}` and `{second}` produce the same selector 0x{selector}"
    )]
    SelectorCollision {
        contract: String,
        first: String,
        second: String,
        selector: String,
    },

    #[error(
        "contract `{contract}`: {binary} binary is too large ({size} bytes, jump targets must stay below 65536)"
    )]
    CodeTooLarge {
        contract: String,
        binary: &'static str,
        size: usize,
    },

    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn structural(contract: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Structural {
            contract: contract.into(),
            message: message.into(),
        }
    }

    /// Returns true for compiler defects, as opposed to problems in the input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl From<pest::error::Error<crate::parser::Rule>> for CompileError {
    fn from(err: pest::error::Error<crate::parser::Rule>) -> Self {
        Self::Syntax(err.to_string())
    }
}
