//! Duration parsing for the `wait` query parameter and `--max-wait` flag
//!
//! Accepts `<number><unit>` with `s` (seconds), `m` (minutes) or `h`
//! (hours), matching the duration strings uploaders pass on the wire.

use std::time::Duration;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * 60;

/// Parse an optional wait duration string
///
/// # Returns
/// * `Ok(None)` - Missing or empty; the caller applies its default
/// * `Ok(Some(duration))` - A valid duration
/// * `Err(())` - Invalid format
pub fn parse_wait(wait: Option<&str>) -> Result<Option<Duration>, ()> {
    let Some(wait_str) = wait else {
        return Ok(None);
    };

    let wait_str = wait_str.trim();
    if wait_str.is_empty() {
        return Ok(None);
    }

    let len = wait_str.len();
    if len < 2 {
        return Err(());
    }

    let unit = &wait_str[len - 1..];
    let number_str = &wait_str[..len - 1];

    let number: u64 = number_str.parse().map_err(|_| ())?;
    if number == 0 {
        return Err(());
    }

    let seconds = match unit {
        "s" => number,
        "m" => number * SECONDS_PER_MINUTE,
        "h" => number * SECONDS_PER_HOUR,
        _ => return Err(()),
    };

    Ok(Some(Duration::from_secs(seconds)))
}
