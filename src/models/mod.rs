mod session;
mod subscription;
mod transaction;

pub use session::*;
pub use subscription::*;
pub use transaction::*;
