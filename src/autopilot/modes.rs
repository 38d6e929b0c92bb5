//! ArduPlane Flight Modes
//!
//! Custom-mode numbers for the fixed-wing firmware. The numeric values are
//! what DO_SET_MODE carries in param2 and what HEARTBEAT reports back in
//! `custom_mode`.

const MODE_TABLE: &[(&str, u32)] = &[
    ("MANUAL", 0),
    ("CIRCLE", 1),
    ("STABILIZE", 2),
    ("TRAINING", 3),
    ("ACRO", 4),
    ("FBWA", 5),
    ("FBWB", 6),
    ("CRUISE", 7),
    ("AUTOTUNE", 8),
    ("AUTO", 10),
    ("RTL", 11),
    ("LOITER", 12),
    ("TAKEOFF", 13),
    ("AVOID_ADSB", 14),
    ("GUIDED", 15),
    ("QSTABILIZE", 17),
    ("QHOVER", 18),
    ("QLOITER", 19),
    ("QLAND", 20),
    ("QRTL", 21),
    ("QAUTOTUNE", 22),
    ("QACRO", 23),
    ("THERMAL", 24),
];

/// Custom-mode number for a mode name, case-insensitive.
pub fn mode_number(name: &str) -> Option<u32> {
    MODE_TABLE
        .iter()
        .find(|(mode, _)| mode.eq_ignore_ascii_case(name))
        .map(|(_, number)| *number)
}

/// Mode name for a custom-mode number.
pub fn mode_name(number: u32) -> String {
    MODE_TABLE
        .iter()
        .find(|(_, n)| *n == number)
        .map(|(name, _)| name.to_string())
        .unwrap_or_else(|| format!("UNKNOWN({number})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_modes_map_both_ways() {
        assert_eq!(mode_number("AUTO"), Some(10));
        assert_eq!(mode_number("manual"), Some(0));
        assert_eq!(mode_number("RTL"), Some(11));
        assert_eq!(mode_name(10), "AUTO");
    }

    #[test]
    fn unknown_modes_are_absent() {
        assert_eq!(mode_number("WARP"), None);
        assert_eq!(mode_name(99), "UNKNOWN(99)");
    }
}
