use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, BitXor};

use crate::communication::Message;

/// A set of control signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SignalMask(u8);

impl SignalMask {
    pub const NONE: Self = Self(0);
    pub const START: Self = Self(1);
    pub const RESET: Self = Self(1 << 1);
    pub const STOP: Self = Self(1 << 2);
    pub const SHUTDOWN: Self = Self(1 << 3);
    pub const ANY: Self = Self(0b1111);

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if any bit of `other` is set in `self`.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// The signal carried by a control message, if it is one.
    #[must_use]
    pub const fn from_message(message: &Message) -> Option<Self> {
        match message {
            Message::Start => Some(Self::START),
            Message::Reset => Some(Self::RESET),
            Message::Stop => Some(Self::STOP),
            Message::Shutdown => Some(Self::SHUTDOWN),
            Message::CloseConnection
            | Message::Initialise(_)
            | Message::RegisterTests(_)
            | Message::ReportStatistics(_)
            | Message::ProcessStatus(_) => None,
        }
    }
}

impl BitOr for SignalMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SignalMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for SignalMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitXor for SignalMask {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self {
        Self((self.0 ^ rhs.0) & Self::ANY.0)
    }
}

impl fmt::Display for SignalMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names = [
            (Self::START, "start"),
            (Self::RESET, "reset"),
            (Self::STOP, "stop"),
            (Self::SHUTDOWN, "shutdown"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.intersects(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}
