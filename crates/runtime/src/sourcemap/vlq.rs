//! Base64 VLQ decoding for the `mappings` field.

use super::SourceMapError;

const CONTINUATION_BIT: i64 = 0b10_0000;
const VALUE_MASK: i64 = 0b01_1111;
/// Values are at most 32 bits wide.
const MAX_SHIFT: u32 = 30;

fn base64_digit(byte: u8) -> Option<i64> {
	let digit = match byte {
		b'A'..=b'Z' => byte - b'A',
		b'a'..=b'z' => byte - b'a' + 26,
		b'0'..=b'9' => byte - b'0' + 52,
		b'+' => 62,
		b'/' => 63,
		_ => return None,
	};
	Some(i64::from(digit))
}

/// Decodes every value in one segment (the text between two commas).
pub fn decode_segment(segment: &str) -> Result<Vec<i64>, SourceMapError> {
	let mut values = Vec::with_capacity(5);
	let mut accum = 0i64;
	let mut shift = 0u32;
	let mut partial = false;

	for byte in segment.bytes() {
		let digit = base64_digit(byte).ok_or_else(|| SourceMapError::Vlq(format!("invalid base64 digit {:?} in {segment:?}", byte as char)))?;
		if shift > MAX_SHIFT {
			return Err(SourceMapError::Vlq(format!("value too large in {segment:?}")));
		}

		accum |= (digit & VALUE_MASK) << shift;
		if digit & CONTINUATION_BIT != 0 {
			shift += 5;
			partial = true;
			continue;
		}

		// Lowest bit carries the sign
		let magnitude = accum >> 1;
		values.push(if accum & 1 == 1 { -magnitude } else { magnitude });
		accum = 0;
		shift = 0;
		partial = false;
	}

	if partial {
		return Err(SourceMapError::Vlq(format!("truncated value in {segment:?}")));
	}
	Ok(values)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn single_digit_values() {
		assert_eq!(decode_segment("A").unwrap(), vec![0]);
		assert_eq!(decode_segment("C").unwrap(), vec![1]);
		assert_eq!(decode_segment("D").unwrap(), vec![-1]);
		assert_eq!(decode_segment("I").unwrap(), vec![4]);
	}

	#[test]
	fn multi_digit_value() {
		assert_eq!(decode_segment("gB").unwrap(), vec![16]);
	}

	#[test]
	fn full_segment() {
		assert_eq!(decode_segment("AACA").unwrap(), vec![0, 0, 1, 0]);
		assert_eq!(decode_segment("IAAI").unwrap(), vec![4, 0, 0, 4]);
	}

	#[test]
	fn invalid_digit_is_rejected() {
		assert!(matches!(decode_segment("A!A"), Err(SourceMapError::Vlq(_))));
	}

	#[test]
	fn truncated_value_is_rejected() {
		assert!(matches!(decode_segment("Ag"), Err(SourceMapError::Vlq(_))));
	}
}
