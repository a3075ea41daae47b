//! Hex rendering of raw octets, used when dumping block data.

use std::fmt::Write;

/// Formats up to `max` bytes as space-separated hex, noting how many were
/// left out.
///
/// # Example
///
/// ```
/// use jser_buffers::print_octets;
///
/// assert_eq!(print_octets(&[0xac, 0xed, 0x00, 0x05], 16), "ac ed 00 05");
/// assert_eq!(print_octets(&[1, 2, 3], 2), "01 02 ... (1 more)");
/// assert_eq!(print_octets(&[], 16), "");
/// ```
pub fn print_octets(octets: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(octets.len().min(max) * 3);
    for (i, byte) in octets.iter().take(max).enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    if octets.len() > max {
        let _ = write!(out, " ... ({} more)", octets.len() - max);
    }
    out
}

/// [`print_octets`] capped at 16 bytes.
pub fn print_octets_default(octets: &[u8]) -> String {
    print_octets(octets, 16)
}
