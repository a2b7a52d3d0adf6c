//! CLI command implementations

pub mod attach;
pub mod validate;

pub use attach::execute as attach;
pub use validate::execute as validate;
