pub mod certificate;
pub mod crl;
pub mod message;
pub mod rfc3161;

pub use certificate::*;
pub use crl::*;
pub use message::*;
pub use rfc3161::*;
