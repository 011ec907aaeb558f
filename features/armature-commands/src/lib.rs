//! Pooled command execution on top of `armature-core` scopes.
//!
//! A [`Command`] is a reusable unit of work constructed and injected by a
//! scope. [`CommandPool`] recycles finished instances and parks retained
//! ones; [`Commands`] keeps one pool per command type for a scope; and
//! [`NamedDispatcher`] fires parameterless commands by event name.
//!
//! # Examples
//!
//! ```rust
//! use std::rc::Rc;
//! use armature_core::{Injected, Scope, ScopeSettings};
//! use armature_commands::{Command, Commands, Control};
//!
//! struct Greet;
//!
//! impl Injected for Greet {
//!     fn construct() -> Self {
//!         Greet
//!     }
//! }
//!
//! impl Command for Greet {
//!     type Param = &'static str;
//!
//!     fn run(&self, _ctl: &Control, name: &'static str) {
//!         println!("hello, {name}");
//!     }
//! }
//!
//! let scope = Scope::new(ScopeSettings::default());
//! let commands = Commands::new(&scope);
//! commands.execute::<Greet>("world").unwrap();
//! ```

pub mod command;
pub mod dispatch;
pub mod errors;
pub mod pool;

pub use command::{Command, Control};
pub use dispatch::{Commands, NamedDispatcher};
pub use errors::CommandError;
pub use pool::{CommandPool, Exec};
