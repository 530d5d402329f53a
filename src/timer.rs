//! Millisecond timers driven by an external tick.

/// Number of tokens received or used before a Poll For Master cycle is executed.
pub const NPOLL: u8 = 50;

/// Number of retries on sending the token.
pub const NRETRY_TOKEN: u8 = 1;

/// Minimum number of octets or receive errors that must be seen before the
/// line is considered active.
pub const NMIN_OCTETS: u8 = 4;

/// Protocol timing parameters, all in milliseconds.
///
/// The defaults follow the MS/TP standard, using the upper end of the
/// ranges it allows so that slow or busy nodes still interoperate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Silence within a frame before the partial frame is discarded (Tframe_abort).
    pub frame_abort: u32,
    /// Silence before the token is declared lost (Tno_token).
    pub no_token: u32,
    /// Silence to wait for the start of a reply to a data request (Treply_timeout).
    pub reply_timeout: u32,
    /// Silence to wait for a successor to use the token or answer a
    /// Poll For Master (Tusage_timeout).
    pub usage_timeout: u32,
    /// Time to come up with a reply before a Reply Postponed frame is sent (Treply_delay).
    pub reply_delay: u32,
    /// Width of the time slot in which a node may generate a token (Tslot).
    pub slot: u32,
    /// Silence after the last octet on the bus before this node may transmit (Tturnaround).
    pub turnaround: u32,
}

impl Timing {
    /// Turnaround of 40 bit times at the given baud rate, rounded up to whole
    /// milliseconds. A baud rate of zero leaves the timing unchanged.
    pub const fn with_baud_rate(mut self, baud: u32) -> Self {
        if baud == 0 {
            return self;
        }
        let micros = 40 * 1_000_000 / baud;
        self.turnaround = (micros + 999) / 1000;
        self
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            frame_abort: 95,
            no_token: 500,
            reply_timeout: 295,
            usage_timeout: 95,
            reply_delay: 250,
            slot: 10,
            turnaround: 5,
        }
    }
}

/// The silence and reply postponed timers of a node.
///
/// Both count milliseconds and saturate instead of wrapping, a node that has
/// seen no traffic for days still reads as silent.
#[derive(Debug, Default, Clone)]
pub struct Timers {
    silence: u32,
    reply_postponed: Option<u32>,
}

impl Timers {
    pub const fn new() -> Self {
        Self {
            silence: 0,
            reply_postponed: None,
        }
    }

    /// Advance both timers by one millisecond.
    pub fn tick(&mut self) {
        self.silence = self.silence.saturating_add(1);
        if let Some(t) = self.reply_postponed.as_mut() {
            *t = t.saturating_add(1);
        }
    }

    /// Milliseconds since the last octet was received or transmitted.
    pub fn silence(&self) -> u32 {
        self.silence
    }

    pub fn reset_silence(&mut self) {
        self.silence = 0;
    }

    /// Start measuring the time taken to answer a data request.
    pub fn arm_reply_postponed(&mut self) {
        self.reply_postponed = Some(0);
    }

    pub fn disarm_reply_postponed(&mut self) {
        self.reply_postponed = None;
    }

    /// Milliseconds since [`arm_reply_postponed`](Self::arm_reply_postponed), if armed.
    pub fn reply_postponed(&self) -> Option<u32> {
        self.reply_postponed
    }
}
