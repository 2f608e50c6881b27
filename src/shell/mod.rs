//! Subprocess backend: bridges an interactive SQL shell through its standard streams.

pub mod channel;
pub mod datastore;
pub mod framing;

pub use channel::{ShellChannel, ShellSettings};
pub use datastore::ShellDatastore;
pub use framing::{FramingPolicy, BEELINE_BANNER_LINES, BEELINE_FOOTER_LINES};
