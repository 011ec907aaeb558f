use thiserror::Error;

/// Errors raised by scope registration and resolution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The key is already bound in this scope.
    #[error("already registered: {0}")]
    AlreadyRegistered(&'static str),
    /// The key is bound neither in this scope nor in any ancestor.
    #[error("not registered: {0}")]
    NotRegistered(&'static str),
    /// A binding with no backing constructor and no pre-built instance.
    #[error("{0} cannot be registered as its own value")]
    CannotRegisterAsValue(&'static str),
    /// The cached handle is not of the requested contract.
    #[error("wrong handle type, required '{required}' but cached '{cached}'")]
    WrongHandleType {
        required: &'static str,
        cached: &'static str,
    },
}

/// Misuse of the deferred-initialization protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    /// `init_done` was signaled for an instance that is not initializing.
    #[error("an instance of '{0}' is not initializing")]
    NotInitializing(&'static str),
}
