// objsh error kinds
//
// Typed failures raised by the class runtime. They are converted into
// interpreter errors at the command boundary; nothing in the library aborts
// the process, including internal invariant violations.

use thiserror::Error;

use crate::types::Exception;

#[derive(Debug, Clone, Error)]
pub enum OoError {
    #[error("no class context: {0}")]
    NoClassContext(String),

    #[error("cannot access object-specific info like this, no object context")]
    NoObjectContext,

    #[error("unknown member \"{0}\"")]
    UnknownMember(String),

    #[error("unknown option \"{0}\"")]
    UnknownOption(String),

    #[error("unknown class \"{0}\"")]
    UnknownClass(String),

    #[error("unknown object \"{0}\"")]
    UnknownObject(String),

    #[error("wrong # args: should be \"{0}\"")]
    WrongArgCount(String),

    #[error("member function \"{0}\" is not implemented")]
    MemberNotImplemented(String),

    #[error("\"{name}\" already defined in class \"{class}\"")]
    DuplicateDefinition { name: String, class: String },

    #[error("construction of object \"{0}\" failed")]
    ConstructionFailure(String),

    #[error("destruction of object \"{0}\" failed")]
    DestructionFailure(String),

    #[error("error configuring option \"{0}\"")]
    ConfigurationError(String),

    #[error("can't {verb} \"{name}\": {detail}")]
    BadDelegation {
        verb: &'static str,
        name: String,
        detail: String,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<OoError> for Exception {
    fn from(err: OoError) -> Self {
        Exception::error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = OoError::WrongArgCount("obj move x y".into());
        assert_eq!(e.to_string(), "wrong # args: should be \"obj move x y\"");

        let e = OoError::DuplicateDefinition {
            name: "x".into(),
            class: "::Base".into(),
        };
        assert!(e.to_string().contains("already defined"));
    }
}
