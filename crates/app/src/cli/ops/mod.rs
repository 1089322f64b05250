pub mod check;
pub mod init;
#[cfg(feature = "fuse")]
pub mod mount;
pub mod sweep;
pub mod version;

pub use check::Check;
pub use init::Init;
#[cfg(feature = "fuse")]
pub use mount::Mount;
pub use sweep::Sweep;
pub use version::Version;
