use armature_core::ScopeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    /// The scope a pool constructs its commands in no longer exists.
    #[error("owning scope was dropped")]
    ScopeGone,

    #[error(transparent)]
    Scope(#[from] ScopeError),
}
