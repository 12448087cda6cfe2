//! Host pin to interrupt-channel tables.

/// Maps the chip's IRQ pin to the host's interrupt channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IrqMap {
    /// `(pin, channel)` pairs.
    Table(&'static [(u8, u8)]),
    /// Every pin is interrupt-capable and the channel is the pin number.
    Identity,
}

impl IrqMap {
    /// Arduino Uno and friends.
    pub const ATMEGA328: Self = Self::Table(&[(2, 0), (3, 1)]);
    /// Arduino Mega.
    pub const ATMEGA2560: Self =
        Self::Table(&[(2, 0), (3, 1), (21, 2), (20, 3), (19, 4), (18, 5)]);
    /// Leonardo-style boards.
    pub const ATMEGA32U4: Self = Self::Table(&[(7, 4), (3, 0), (2, 1), (0, 2), (1, 3)]);
    /// Teensy 2.0.
    pub const TEENSY2: Self = Self::Table(&[(5, 0), (6, 1), (7, 2), (8, 3)]);
    /// Teensy++ 2.0.
    pub const TEENSY_PP2: Self = Self::Table(&[
        (0, 0),
        (1, 1),
        (2, 2),
        (3, 3),
        (36, 4),
        (37, 5),
        (18, 6),
        (19, 7),
    ]);

    /// Interrupt channel for `pin`, if the pin can interrupt.
    pub fn channel_for(self, pin: u8) -> Option<u8> {
        match self {
            Self::Identity => Some(pin),
            Self::Table(pairs) => pairs
                .iter()
                .rev()
                .find(|&&(candidate, _)| candidate == pin)
                .map(|&(_, channel)| channel),
        }
    }
}

impl Default for IrqMap {
    fn default() -> Self {
        Self::ATMEGA328
    }
}
