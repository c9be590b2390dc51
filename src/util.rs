//! General utility module housing formatting functions.
use pretty_bytes::converter::convert;

use std::time::Duration;

/// Converts a byte count to a `String` representation.
pub fn convert_bytes(bytes: u64) -> String {
    convert(bytes as f64).replacen(' ', "", 1)
}

/// Converts an elapsed duration to a readable `String`, in whole seconds.
pub fn convert_elapsed(elapsed: Duration) -> String {
    humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    #[test]
    fn converting_bytes_to_string() {
        let bval = 512_u64;
        let kval = bval * 512_u64;
        let mval = kval * 512_u64;
        let gval = mval * 512_u64;

        assert_eq!(super::convert_bytes(bval), "512B");
        assert_eq!(super::convert_bytes(kval), "262.14kB");
        assert_eq!(super::convert_bytes(mval), "134.22MB");
        assert_eq!(super::convert_bytes(gval), "68.72GB");
    }

    #[test]
    fn converting_elapsed_to_string() {
        let elapsed = Duration::from_millis(3_723_456);

        assert_eq!(super::convert_elapsed(elapsed), "1h 2m 3s");
        assert_eq!(super::convert_elapsed(Duration::from_millis(20)), "0s");
    }
}
