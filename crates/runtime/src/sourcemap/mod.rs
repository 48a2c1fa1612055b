//! Source map v3 decoding and position lookup.
//!
//! Only what breakpoint placement and stack translation need is kept:
//! `sources` (resolved against `sourceRoot`) and the decoded `mappings`.
//! Names and embedded sources are ignored. Index maps are rejected.
//!
//! All lines and columns are zero-based.

mod registry;
mod vlq;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use thiserror::Error;

pub use registry::{GeneratedPosition, OriginalPosition, SourceMapRegistry, SourceMapUnit};

#[derive(Debug, Error)]
pub enum SourceMapError {
	#[error("source map is not valid JSON: {0}")]
	Json(#[from] serde_json::Error),

	#[error("inline source map is not valid base64: {0}")]
	Base64(#[from] base64::DecodeError),

	#[error("inline source map is not UTF-8: {0}")]
	Utf8(#[from] std::string::FromUtf8Error),

	#[error("bad VLQ data: {0}")]
	Vlq(String),

	#[error("bad mapping: {0}")]
	InvalidMapping(String),

	#[error("unsupported source map version {0}")]
	UnsupportedVersion(u32),

	#[error("index maps (sections) are not supported")]
	IndexMap,

	#[error("not an inline data: URL")]
	NotInline,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSourceMap {
	version: u32,
	#[serde(default)]
	sources: Vec<Option<String>>,
	#[serde(default)]
	source_root: Option<String>,
	#[serde(default)]
	mappings: String,
	#[serde(default)]
	sections: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
	generated_line: u32,
	generated_column: u32,
	/// `None` for a segment that maps the rest of its range to nothing
	source: Option<u32>,
	original_line: u32,
	original_column: u32,
}

impl Mapping {
	fn generated_key(&self) -> (u32, u32) {
		(self.generated_line, self.generated_column)
	}

	fn original_key(&self) -> (Option<u32>, u32, u32) {
		(self.source, self.original_line, self.original_column)
	}
}

/// A position in an original source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition<'a> {
	pub source: &'a str,
	pub line: u32,
	pub column: u32,
}

/// Decoded mapping table, indexed both ways.
#[derive(Debug, Clone)]
pub struct SourceMap {
	sources: Vec<String>,
	by_generated: Vec<Mapping>,
	by_original: Vec<Mapping>,
}

impl SourceMap {
	pub fn from_json(json: &str) -> Result<Self, SourceMapError> {
		let raw: RawSourceMap = serde_json::from_str(json)?;
		if raw.sections.is_some() {
			return Err(SourceMapError::IndexMap);
		}
		if raw.version != 3 {
			return Err(SourceMapError::UnsupportedVersion(raw.version));
		}

		let root = raw.source_root.unwrap_or_default();
		let sources = raw.sources.into_iter().map(|source| resolve_source(&root, &source.unwrap_or_default())).collect::<Vec<_>>();

		let mut by_generated = parse_mappings(&raw.mappings, sources.len())?;
		by_generated.sort_by_key(Mapping::generated_key);
		let mut by_original = by_generated.iter().filter(|m| m.source.is_some()).copied().collect::<Vec<_>>();
		by_original.sort_by_key(|m| (m.original_key(), m.generated_key()));

		Ok(Self {
			sources,
			by_generated,
			by_original,
		})
	}

	/// Decodes a `data:` URL as found in a script's `sourceMapURL`.
	///
	/// The payload is everything after the first comma; it is base64 when the
	/// header says so and taken verbatim otherwise.
	pub fn from_data_url(url: &str) -> Result<Self, SourceMapError> {
		let rest = url.strip_prefix("data:").ok_or(SourceMapError::NotInline)?;
		let (header, payload) = rest.split_once(',').ok_or(SourceMapError::NotInline)?;

		if header.split(';').any(|part| part.eq_ignore_ascii_case("base64")) {
			let bytes = STANDARD.decode(payload.trim())?;
			Self::from_json(&String::from_utf8(bytes)?)
		} else {
			Self::from_json(payload)
		}
	}

	/// Resolved source paths, in map order.
	pub fn sources(&self) -> &[String] {
		&self.sources
	}

	/// Original position for a generated one: the closest segment at or
	/// before `column` on the same generated line, unless that segment is
	/// unmapped.
	pub fn original_position_for(&self, line: u32, column: u32) -> Option<SourcePosition<'_>> {
		let upper = self.by_generated.partition_point(|m| m.generated_key() <= (line, column));
		let mapping = self.by_generated[..upper].last().filter(|m| m.generated_line == line)?;
		let source = mapping.source?;
		Some(SourcePosition {
			source: &self.sources[source as usize],
			line: mapping.original_line,
			column: mapping.original_column,
		})
	}

	/// Generated `(line, column)` for an original position.
	///
	/// Picks the closest original column at or before `column` on that line,
	/// falling back to the first mapping on the line. Among mappings for the
	/// same original column the earliest generated position wins.
	pub fn generated_position_for(&self, source: &str, line: u32, column: u32) -> Option<(u32, u32)> {
		let wanted = normalize_path(source);
		self.sources
			.iter()
			.enumerate()
			.filter(|(_, candidate)| normalize_path(candidate) == wanted)
			.find_map(|(index, _)| self.generated_in_source(index as u32, line, column))
	}

	fn generated_in_source(&self, source: u32, line: u32, column: u32) -> Option<(u32, u32)> {
		let source = Some(source);
		let on_line = |m: &Mapping| m.source == source && m.original_line == line;

		let upper = self.by_original.partition_point(|m| m.original_key() <= (source, line, column));
		let target_column = match self.by_original[..upper].last().filter(|m| on_line(m)) {
			Some(m) => m.original_column,
			None => {
				let first = self.by_original.partition_point(|m| (m.source, m.original_line) < (source, line));
				self.by_original.get(first).filter(|m| on_line(m))?.original_column
			}
		};

		let first = self.by_original.partition_point(|m| m.original_key() < (source, line, target_column));
		self.by_original.get(first).map(|m| (m.generated_line, m.generated_column))
	}
}

fn parse_mappings(mappings: &str, source_count: usize) -> Result<Vec<Mapping>, SourceMapError> {
	let mut out = Vec::new();
	let mut source = 0i64;
	let mut original_line = 0i64;
	let mut original_column = 0i64;

	for (generated_line, line) in mappings.split(';').enumerate() {
		let mut generated_column = 0i64;
		for segment in line.split(',').filter(|s| !s.is_empty()) {
			let fields = vlq::decode_segment(segment)?;
			generated_column += fields[0];
			if generated_column < 0 {
				return Err(SourceMapError::InvalidMapping(format!("negative position at segment {segment:?}")));
			}

			match fields.len() {
				1 => {
					out.push(Mapping {
						generated_line: generated_line as u32,
						generated_column: generated_column as u32,
						source: None,
						original_line: 0,
						original_column: 0,
					});
					continue;
				}
				4 | 5 => {}
				n => return Err(SourceMapError::InvalidMapping(format!("segment {segment:?} has {n} fields"))),
			}

			source += fields[1];
			original_line += fields[2];
			original_column += fields[3];

			if original_line < 0 || original_column < 0 {
				return Err(SourceMapError::InvalidMapping(format!("negative position at segment {segment:?}")));
			}
			if source < 0 || source as usize >= source_count {
				return Err(SourceMapError::InvalidMapping(format!("source index {source} out of range")));
			}

			out.push(Mapping {
				generated_line: generated_line as u32,
				generated_column: generated_column as u32,
				source: Some(source as u32),
				original_line: original_line as u32,
				original_column: original_column as u32,
			});
		}
	}

	Ok(out)
}

fn resolve_source(root: &str, source: &str) -> String {
	if root.is_empty() || source.starts_with('/') || source.contains("://") {
		source.to_string()
	} else if root.ends_with('/') {
		format!("{root}{source}")
	} else {
		format!("{root}/{source}")
	}
}

/// Path form used to compare editor paths with map sources.
pub(crate) fn normalize_path(path: &str) -> String {
	let path = path.replace('\\', "/");
	match path.strip_prefix("file://") {
		Some(rest) => rest.to_string(),
		None => path,
	}
}
