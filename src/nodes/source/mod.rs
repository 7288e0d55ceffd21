mod angle;
mod sine;

pub use angle::*;
pub use sine::*;
