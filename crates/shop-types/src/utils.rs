//! Small formatting helpers.

/// Truncates an id for log output.
///
/// Shows only the first 8 characters followed by ".." for longer strings.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((end, _)) => format!("{}..", &id[..end]),
		None => id.to_string(),
	}
}

/// Formats a sequence number as a customer order number (`CO-0001`).
pub fn format_order_number(sequence: u64) -> String {
	format!("CO-{:04}", sequence)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("abc"), "abc");
		assert_eq!(truncate_id("0123456789abcdef"), "01234567..");
		assert_eq!(truncate_id("ääääääääää"), "ääääääää..");
	}

	#[test]
	fn test_order_number_padding() {
		assert_eq!(format_order_number(1), "CO-0001");
		assert_eq!(format_order_number(42), "CO-0042");
		assert_eq!(format_order_number(12345), "CO-12345");
	}
}
