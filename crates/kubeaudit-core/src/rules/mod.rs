//! Rule modules and rule sets.
//!
//! A rule module is opaque policy source with a name. The core only reads its
//! `package` declaration; compiling and evaluating it belongs to the engine.

mod loader;
mod package;

pub use loader::{RuleModule, RuleSet, RulesError};
pub use package::package_name;
