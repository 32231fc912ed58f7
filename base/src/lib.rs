//! The `base` crate defines the things which are useful in both the
//! stack virtual machine and its associated tools.  The idea is that
//! if you want to write an assembler or a linker, it would depend on
//! the base crate but would not need to depend on the virtual machine
//! itself.

pub mod expr;
pub mod instruction;
pub mod prelude;
pub mod token;
