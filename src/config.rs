use snafu::ensure;

use crate::timer::Timing;
use crate::types::{
    Address, Error, IntoAddress, InvalidMaxInfoFramesSnafu, InvalidMaxMasterSnafu,
};
use crate::MAX_MASTER;

/// Configuration of one MS/TP node.
///
/// ## Example
/// ```
/// use mstp_proto::Config;
/// let mut config = Config::new(12).unwrap();
/// config.set_max_master(32).unwrap();
/// assert!(config.set_max_info_frames(0).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    this_station: Address,
    max_info_frames: u8,
    max_master: u8,
    timing: Timing,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            this_station: Address::from_wire(0),
            max_info_frames: 1,
            max_master: MAX_MASTER,
            timing: Timing::default(),
        }
    }
}

impl Config {
    /// Default configuration for the given station address. Addresses 0-127
    /// run as master nodes, 128-254 as slave nodes.
    pub fn new(this_station: impl IntoAddress) -> Result<Self, Error> {
        Ok(Self {
            this_station: this_station.into_address()?,
            ..Self::default()
        })
    }

    pub fn this_station(&self) -> Address {
        self.this_station
    }

    /// Set the station address. A master address above max master raises
    /// max master to it, so the node stays within its own poll range.
    pub fn set_this_station(&mut self, this_station: impl IntoAddress) -> Result<(), Error> {
        let this_station = this_station.into_address()?;
        if this_station.is_master() && *this_station > self.max_master {
            self.max_master = *this_station;
        }
        self.this_station = this_station;
        Ok(())
    }

    /// Number of frames this node may send each time it holds the token.
    pub fn max_info_frames(&self) -> u8 {
        self.max_info_frames
    }

    /// # Errors
    /// [`Error::InvalidMaxInfoFrames`] if `max_info_frames` is zero.
    pub fn set_max_info_frames(&mut self, max_info_frames: u8) -> Result<(), Error> {
        ensure!(max_info_frames >= 1, InvalidMaxInfoFramesSnafu);
        self.max_info_frames = max_info_frames;
        Ok(())
    }

    /// Highest master address that is polled for new masters.
    pub fn max_master(&self) -> u8 {
        self.max_master
    }

    /// # Errors
    /// [`Error::InvalidMaxMaster`] if `max_master` is above 127, or below the
    /// address of this master node.
    pub fn set_max_master(&mut self, max_master: u8) -> Result<(), Error> {
        ensure!(max_master <= MAX_MASTER, InvalidMaxMasterSnafu { max_master });
        ensure!(
            !self.this_station.is_master() || *self.this_station <= max_master,
            InvalidMaxMasterSnafu { max_master }
        );
        self.max_master = max_master;
        Ok(())
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    /// Builder style variants of the setters, for use at construction.
    pub fn with_max_master(mut self, max_master: u8) -> Result<Self, Error> {
        self.set_max_master(max_master)?;
        Ok(self)
    }

    pub fn with_max_info_frames(mut self, max_info_frames: u8) -> Result<Self, Error> {
        self.set_max_info_frames(max_info_frames)?;
        Ok(self)
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }
}
