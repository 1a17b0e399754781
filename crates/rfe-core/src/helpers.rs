//! Unit conversion and formatting helpers.
//!
//! Small utility functions that consuming applications (monitors, loggers,
//! the CLI) need when presenting analyzer data.

/// Convert a power level in dBm to milliwatts.
///
/// # Example
///
/// ```
/// use rfe_core::dbm_to_mw;
///
/// assert!((dbm_to_mw(0.0) - 1.0).abs() < 1e-12);
/// assert!((dbm_to_mw(10.0) - 10.0).abs() < 1e-9);
/// ```
pub fn dbm_to_mw(dbm: f64) -> f64 {
    10f64.powf(dbm / 10.0)
}

/// Convert milliwatts to dBm.
pub fn mw_to_dbm(mw: f64) -> f64 {
    10.0 * mw.log10()
}

/// Convert a power level in dBm to watts.
pub fn dbm_to_watt(dbm: f64) -> f64 {
    dbm_to_mw(dbm) / 1000.0
}

/// Convert watts to dBm.
pub fn watt_to_dbm(watt: f64) -> f64 {
    30.0 + mw_to_dbm(watt)
}

/// Convert dBm to dBµV on a 50 ohm system.
pub fn dbm_to_dbuv(dbm: f64) -> f64 {
    dbm + 107.0
}

/// Convert dBµV to dBm on a 50 ohm system.
pub fn dbuv_to_dbm(dbuv: f64) -> f64 {
    dbuv - 107.0
}

/// Format a raw 16-character serial number as `xxxx-xxxx-xxxx-xxxx`.
///
/// Returns an empty string when fewer than 16 characters are available.
///
/// # Example
///
/// ```
/// use rfe_core::decorate_serial_number;
///
/// assert_eq!(decorate_serial_number("ABCD1234EFGH5678"), "ABCD-1234-EFGH-5678");
/// assert_eq!(decorate_serial_number("short"), "");
/// ```
pub fn decorate_serial_number(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().take(16).collect();
    if chars.len() < 16 {
        return String::new();
    }
    chars
        .chunks(4)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("-")
}

/// Format a frequency in MHz with kHz resolution, e.g. `"433.920 MHz"`.
pub fn format_freq_mhz(mhz: f64) -> String {
    format!("{mhz:.3} MHz")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn dbm_mw_round_trip() {
        assert!(close(dbm_to_mw(-30.0), 0.001));
        assert!(close(mw_to_dbm(0.001), -30.0));
        assert!(close(mw_to_dbm(dbm_to_mw(-47.5)), -47.5));
    }

    #[test]
    fn dbm_watt() {
        assert!(close(dbm_to_watt(30.0), 1.0));
        assert!(close(watt_to_dbm(1.0), 30.0));
        assert!(close(watt_to_dbm(0.001), 0.0));
    }

    #[test]
    fn dbuv_offset() {
        assert!(close(dbm_to_dbuv(-107.0), 0.0));
        assert!(close(dbuv_to_dbm(47.0), -60.0));
    }

    #[test]
    fn serial_number_decoration() {
        assert_eq!(
            decorate_serial_number("0123456789ABCDEF"),
            "0123-4567-89AB-CDEF"
        );
        // Extra characters beyond sixteen are ignored.
        assert_eq!(
            decorate_serial_number("0123456789ABCDEFXYZ"),
            "0123-4567-89AB-CDEF"
        );
        assert_eq!(decorate_serial_number(""), "");
    }

    #[test]
    fn freq_formatting() {
        assert_eq!(format_freq_mhz(433.92), "433.920 MHz");
        assert_eq!(format_freq_mhz(0.1), "0.100 MHz");
    }
}
