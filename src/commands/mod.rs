//! CLI commands implementation

pub mod ask;
pub mod init;
pub mod status;
pub mod sync;

pub use ask::*;
pub use init::*;
pub use status::*;
pub use sync::*;
