use std::fmt;

/// A 4-ASCII-character code packed into a `u32`, used as a message type tag.
///
/// The packing is little-endian: the first character is the low byte, so the
/// value round-trips through the wire buffer like any other `u32`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(u32);

impl FourCc {
    /// Pack four ASCII bytes, e.g. `FourCc::new(*b"PING")`.
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }

    /// Reinterpret a raw `u32` read off the wire.
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }

    /// The packed `u32` value.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// The four bytes in declaration order.
    pub const fn bytes(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    /// True when all four bytes are printable ASCII.
    pub fn is_printable(self) -> bool {
        self.bytes().iter().all(|b| (0x20..0x7f).contains(b))
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_printable() {
            for b in self.bytes() {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_little_endian() {
        let tag = FourCc::new(*b"PING");
        assert_eq!(tag.as_u32(), u32::from_le_bytes(*b"PING"));
        assert_eq!(tag.bytes(), *b"PING");
    }

    #[test]
    fn displays_printable_tags_as_text() {
        assert_eq!(FourCc::new(*b"TELE").to_string(), "TELE");
    }

    #[test]
    fn displays_unprintable_tags_as_hex() {
        assert_eq!(FourCc::from_u32(0xDEADBEEF).to_string(), "0xdeadbeef");
    }

    #[test]
    fn round_trips_through_u32() {
        let tag = FourCc::new(*b"FCHK");
        assert_eq!(FourCc::from_u32(tag.as_u32()), tag);
    }
}
