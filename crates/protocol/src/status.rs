//! Line-state and modem-status bitmasks
//!
//! `LineState` is the byte the device sends in a modem-status notification.
//! `ModemStatus` is what the link reports to its consumer; it uses the
//! conventional TIOCM bit values so a terminal layer can take it as-is.

use bitflags::bitflags;

bitflags! {
    /// Device line-state byte (offset 8 of a modem-status notification)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LineState: u8 {
        /// Data carrier detect
        const CARRIER = 0x01;
        /// Data set ready
        const DSR = 0x02;
        /// Break condition
        const BREAK = 0x04;
        /// Ring indicator
        const RING = 0x08;
    }
}

bitflags! {
    /// Modem control-line status, TIOCM bit layout
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ModemStatus: u16 {
        const DTR = 0x002;
        const RTS = 0x004;
        const CAR = 0x040;
        const RNG = 0x080;
        const DSR = 0x100;
    }
}

impl ModemStatus {
    /// Fold a device line-state byte into this status
    ///
    /// Carrier, DSR and ring follow the line state exactly; every other bit is
    /// left as it was. Break is not a TIOCM line and is ignored.
    pub fn apply_line_state(self, line: LineState) -> Self {
        let mut status = self;
        status.set(ModemStatus::CAR, line.contains(LineState::CARRIER));
        status.set(ModemStatus::DSR, line.contains(LineState::DSR));
        status.set(ModemStatus::RNG, line.contains(LineState::RING));
        status
    }
}
