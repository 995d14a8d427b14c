pub mod check;
pub mod init;
pub mod listen;
pub mod version;

pub use check::Check;
pub use init::Init;
pub use listen::Listen;
pub use version::Version;
