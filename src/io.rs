//! Filesystem side of a production: input discovery, volume layout, and the two
//! output artifacts.

pub mod glob;
pub mod layout;
pub mod loadfile;
pub mod opt;

pub use glob::discover_inputs;
pub use layout::VolumeLayout;
pub use loadfile::{Loadfile, LoadfileOptions, read_loadfile, write_loadfile};
pub use opt::{OptLine, read_opt, write_opt};
