//! Motion and liquid-handling constants.

/// Speed of the Z press onto a tip (mm/s).
pub const PICK_UP_SPEED: f64 = 30.0;

/// Lateral travel of each tip shake-off stroke (mm).
pub const SHAKE_OFF_TIPS_DISTANCE: f64 = 2.25;

/// Speed of the shake-off strokes (mm/s).
pub const SHAKE_OFF_TIPS_SPEED: f64 = 50.0;

/// Rise after shaking off a tip (mm).
pub const DROP_TIP_RELEASE_DISTANCE: f64 = 20.0;

/// Retract margin applied to the previous mount on a mount switch (mm).
pub const MOUNT_SWITCH_RETRACT_MARGIN: f64 = 10.0;

/// Raw home position of the simulated gantry and plungers, ordered XYZABC.
pub const HOME_POSITION: [f64; 6] = [418.0, 353.0, 218.0, 218.0, 19.0, 19.0];

/// Decimal places kept when converting volumes to plunger positions.
pub const PLUNGER_POSITION_DECIMALS: i32 = 6;

/// Default directory scanned for peripheral module device nodes.
pub const DEFAULT_MODULES_DIR: &str = "/dev/modules";
