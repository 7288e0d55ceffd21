#[cfg(feature = "cpal_io")]
mod cpal_sink;

#[cfg(feature = "cpal_io")]
pub use cpal_sink::*;

mod rtrb_sink;
pub use rtrb_sink::*;
