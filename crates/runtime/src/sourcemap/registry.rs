use tracing::{debug, warn};

use super::SourceMap;

/// A decoded map together with the script it was attached to.
#[derive(Debug, Clone)]
pub struct SourceMapUnit {
	pub script_id: String,
	pub url: String,
	pub map: SourceMap,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
	/// Original source path; empty when the script is unknown
	pub url: String,
	/// URL of the generated script
	pub script_url: String,
	pub line: u32,
	pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPosition {
	pub script_url: String,
	pub line: u32,
	pub column: u32,
}

/// Every inline source map seen on this connection.
///
/// Units are only ever appended. Forward lookups search from the newest
/// unit, reverse lookups from the oldest. A script parsed twice keeps both
/// units.
#[derive(Debug, Default)]
pub struct SourceMapRegistry {
	units: Vec<SourceMapUnit>,
}

impl SourceMapRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the inline map of a parsed script. Returns whether a unit
	/// was added; absent, external and malformed maps add nothing.
	pub fn register(&mut self, script_id: &str, url: &str, source_map_url: Option<&str>) -> bool {
		let Some(source_map_url) = source_map_url.filter(|u| !u.is_empty()) else {
			return false;
		};
		if !source_map_url.starts_with("data:") {
			debug!(target = "jsdap.sourcemap", script_id, source_map_url, "external source map ignored");
			return false;
		}

		match SourceMap::from_data_url(source_map_url) {
			Ok(map) => {
				debug!(target = "jsdap.sourcemap", script_id, url, sources = map.sources().len(), "registered source map");
				self.units.push(SourceMapUnit {
					script_id: script_id.to_string(),
					url: url.to_string(),
					map,
				});
				true
			}
			Err(e) => {
				warn!(target = "jsdap.sourcemap", script_id, url, error = %e, "discarding source map");
				false
			}
		}
	}

	pub fn len(&self) -> usize {
		self.units.len()
	}

	pub fn is_empty(&self) -> bool {
		self.units.is_empty()
	}

	/// Translates a generated position in `script_id` to its original source.
	///
	/// Without a unit for the script the coordinates come back unchanged
	/// with empty URLs. With a unit but no mapping at that position, the
	/// coordinates come back unchanged with the script's URL.
	pub fn to_original(&self, script_id: &str, line: u32, column: u32) -> OriginalPosition {
		let Some(unit) = self.units.iter().rev().find(|u| u.script_id == script_id) else {
			return OriginalPosition {
				url: String::new(),
				script_url: String::new(),
				line,
				column,
			};
		};

		match unit.map.original_position_for(line, column) {
			Some(pos) => OriginalPosition {
				url: pos.source.to_string(),
				script_url: unit.url.clone(),
				line: pos.line,
				column: pos.column,
			},
			None => OriginalPosition {
				url: unit.url.clone(),
				script_url: unit.url.clone(),
				line,
				column,
			},
		}
	}

	/// Finds where an original position landed in a generated script.
	pub fn to_generated(&self, path: &str, line: u32, column: u32) -> Option<GeneratedPosition> {
		self.units.iter().find_map(|unit| {
			unit.map.generated_position_for(path, line, column).map(|(line, column)| GeneratedPosition {
				script_url: unit.url.clone(),
				line,
				column,
			})
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::sourcemap::tests::{APP_MAP, data_url};

	const OTHER_MAP: &str = r#"{"version":3,"sources":["/project/src/app.ts"],"mappings":"AAAA;AACA;AACA"}"#;

	#[test]
	fn unknown_script_passes_coordinates_through() {
		let registry = SourceMapRegistry::new();
		let pos = registry.to_original("42", 7, 3);
		assert_eq!(pos.url, "");
		assert_eq!(pos.script_url, "");
		assert_eq!((pos.line, pos.column), (7, 3));
	}

	#[test]
	fn missing_or_bad_maps_register_nothing() {
		let mut registry = SourceMapRegistry::new();
		assert!(!registry.register("1", "http://localhost/a.js", None));
		assert!(!registry.register("1", "http://localhost/a.js", Some("")));
		assert!(!registry.register("1", "http://localhost/a.js", Some("a.js.map")));
		assert!(!registry.register("1", "http://localhost/a.js", Some("data:application/json;base64,e30=")));
		assert!(registry.is_empty());
	}

	#[test]
	fn round_trips_through_both_directions() {
		let mut registry = SourceMapRegistry::new();
		assert!(registry.register("7", "http://localhost/bundle.js", Some(&data_url(APP_MAP))));

		let generated = registry.to_generated("/project/src/app.ts", 1, 0).unwrap();
		assert_eq!(generated.script_url, "http://localhost/bundle.js");
		assert_eq!((generated.line, generated.column), (3, 0));

		let original = registry.to_original("7", generated.line, generated.column);
		assert_eq!(original.url, "/project/src/app.ts");
		assert_eq!(original.script_url, "http://localhost/bundle.js");
		assert_eq!((original.line, original.column), (1, 0));
	}

	#[test]
	fn unmapped_position_keeps_script_url() {
		let mut registry = SourceMapRegistry::new();
		registry.register("7", "http://localhost/bundle.js", Some(&data_url(APP_MAP)));

		let pos = registry.to_original("7", 0, 5);
		assert_eq!(pos.url, "http://localhost/bundle.js");
		assert_eq!((pos.line, pos.column), (0, 5));
	}

	#[test]
	fn newest_unit_wins_forward_and_oldest_wins_reverse() {
		let mut registry = SourceMapRegistry::new();
		registry.register("7", "http://localhost/old.js", Some(&data_url(APP_MAP)));
		registry.register("7", "http://localhost/new.js", Some(&data_url(OTHER_MAP)));
		assert_eq!(registry.len(), 2);

		// OTHER_MAP has no leading blank lines
		let original = registry.to_original("7", 0, 0);
		assert_eq!(original.script_url, "http://localhost/new.js");
		assert_eq!(original.line, 0);

		let generated = registry.to_generated("/project/src/app.ts", 0, 0).unwrap();
		assert_eq!(generated.script_url, "http://localhost/old.js");
		assert_eq!(generated.line, 2);
	}

	#[test]
	fn unknown_source_has_no_generated_position() {
		let mut registry = SourceMapRegistry::new();
		registry.register("7", "http://localhost/bundle.js", Some(&data_url(APP_MAP)));
		assert!(registry.to_generated("/project/src/other.ts", 0, 0).is_none());
	}
}
