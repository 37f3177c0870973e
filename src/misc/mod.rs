pub mod binomial;
pub mod floating_point;
pub mod invertible;
pub mod line;
pub mod orientation;
pub mod transpose;

pub use binomial::*;
pub use floating_point::*;
pub use invertible::*;
pub use line::*;
pub use orientation::*;
pub use transpose::*;
