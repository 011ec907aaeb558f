//! Armature Core is a lightweight inversion-of-control runtime built around
//! hierarchical scopes.
//!
//! A [`Scope`] maps contract types to bindings and caches the instances it
//! constructs; child scopes delegate unresolved lookups to their parent and
//! are torn down with it. Types describe their injection points and lifecycle
//! hooks with a [`Descriptor`], which the scope's injector applies whenever it
//! constructs or adopts an instance.
//!
//! # Examples
//!
//! ```rust
//! use std::rc::Rc;
//! use armature_core::{Descriptor, Injected, Scope, ScopeSettings, Slot};
//!
//! struct Database;
//!
//! impl Injected for Database {
//!     fn construct() -> Self {
//!         Database
//!     }
//! }
//!
//! struct Repository {
//!     database: Slot<Database>,
//! }
//!
//! impl Injected for Repository {
//!     fn construct() -> Self {
//!         Repository { database: Slot::empty() }
//!     }
//!
//!     fn descriptor() -> Descriptor<Self> {
//!         Descriptor::new().inject("database", |r: &Repository| &r.database)
//!     }
//! }
//!
//! let scope = Scope::new(ScopeSettings::default());
//! scope.register::<Database>().unwrap();
//! scope.register::<Repository>().unwrap();
//!
//! let repository = scope.get::<Repository>().unwrap();
//! let _database: Rc<Database> = repository.database.get();
//! scope.clean_up();
//! ```
//!
//! Instances that finish initializing after construction declare
//! [`init_async`](Descriptor::init_async) and signal readiness through
//! [`Scope::init_done`]; dependents that declare a waiting injection point
//! hold their post-init hooks until then. This also lets mutually dependent
//! types wire each other, since instances are cached before injection runs.

pub mod descriptor;
pub mod errors;
pub mod scope;
pub mod signal;
pub mod types;

mod injector;
mod pending;

pub use descriptor::{Descriptor, Injected, Provide, Slot};
pub use errors::{InitError, ScopeError};
pub use scope::{MissingPolicy, Scope, ScopeHandle, ScopeSettings};
pub use signal::{Signal, SlotKey};
pub use types::{Instance, InstanceId, TypeInfo};
