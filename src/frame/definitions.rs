//! # Bus Definitions
//!
//! Board addresses and command ids shared by the boards on the bus.
//! Command ids are scoped per destination board, so the same value can mean
//! different things depending on the slave a frame targets.

/// Board addresses
pub mod slave {
    pub const BACKPLANE: u8 = 0;
    pub const IO: u8 = 1;
    pub const KILL_MISSION: u8 = 2;
    /// The state screen listens to all traffic on the bus
    pub const STATE_SCREEN: u8 = 7;
}

/// Kill/mission switch board commands
pub mod kill_mission {
    pub const MISSION: u8 = 0;
    pub const KILL: u8 = 1;
}

/// Backplane board commands
pub mod backplane {
    pub const VOLTAGE: u8 = 0;
    pub const CURRENT: u8 = 1;
    pub const READ_MOTOR: u8 = 2;
    pub const ACT_MOTOR: u8 = 3;
    pub const PWM: u8 = 4;
}

/// IO control board commands and their payload values
pub mod io {
    pub const TEMP: u8 = 0;
    pub const DROPPER_ACTION: u8 = 1;
    pub const TORPEDO_ACTION: u8 = 2;
    pub const ARM_ACTION: u8 = 3;

    pub const DROPPER_PORT: u8 = 0;
    pub const DROPPER_STARBOARD: u8 = 1;

    pub const TORPEDO_PORT: u8 = 0;
    pub const TORPEDO_STARBOARD: u8 = 1;

    pub const ARM_CLOSE: u8 = 0;
    pub const ARM_OPEN: u8 = 1;
}
