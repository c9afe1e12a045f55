/*! Low-level packet access.
 *
 * As with the lower layers this crate grew out of, `wire` provides
 * `Packet<T>` wrappers: thin views over a byte buffer that expose typed
 * field accessors and guarantee, once `check_len` has succeeded, that no
 * accessor will panic.
 */

use core::fmt;

mod field {
    pub type Field = ::core::ops::Range<usize>;
}
pub(crate) use field::Field;

pub mod lpp;
pub mod tdoa2;

pub use self::tdoa2::{Packet as Tdoa2Packet, HEADER_LEN as TDOA2_HEADER_LEN, PACKET_TYPE_TDOA2};

/// Parsing a packet failed: the buffer was too short, or a length field
/// disagreed with the buffer it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wire::Error")
    }
}

pub type Result<T> = core::result::Result<T, Error>;
