pub mod curve_match;
pub mod extend;
pub mod join;

pub use curve_match::*;
pub use extend::*;
pub use join::*;
