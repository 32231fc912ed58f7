//! The prelude exports the types which are useful to anything that
//! produces or consumes stack machine code.  Providing this prelude
//! is the main purpose of the base crate.
pub use super::expr::*;
pub use super::instruction::*;
pub use super::token::*;
