//! Glob-to-regex compilation for exclude patterns
//!
//! Dialect:
//! - `*` matches any run of characters except `/`
//! - `**` matches any run of characters including `/`
//! - a leading `/` anchors the pattern to the mirror root, otherwise it may
//!   start at any segment boundary
//! - a match must end at `/` or at the end of the path
//!
//! Everything else is matched literally.

use crate::error::MirrorError;
use regex::Regex;

/// A compiled exclude pattern
#[derive(Debug, Clone)]
pub struct CompiledExclude {
	/// Pattern exactly as configured
	pub source_pattern: String,

	pub matcher: Regex,
}

impl CompiledExclude {
	/// Compile a glob pattern into its regex form
	pub fn compile(pattern: &str) -> Result<Self, MirrorError> {
		let source = to_regex_source(pattern)?;
		let matcher = Regex::new(&source).map_err(|e| MirrorError::ExcludePatternInvalid {
			pattern: pattern.to_string(),
			message: e.to_string(),
		})?;

		Ok(CompiledExclude { source_pattern: pattern.to_string(), matcher })
	}

	/// Check a normalized relative path (`a/b/c`, no leading slash)
	pub fn is_match(&self, relative: &str) -> bool {
		self.matcher.is_match(relative)
	}
}

fn to_regex_source(pattern: &str) -> Result<String, MirrorError> {
	let anchored = pattern.starts_with('/');
	let body = pattern.trim_start_matches('/');
	if body.is_empty() {
		return Err(MirrorError::ExcludePatternInvalid {
			pattern: pattern.to_string(),
			message: "pattern is empty".to_string(),
		});
	}

	let mut source = String::from(if anchored { "^" } else { "(?:^|/)" });
	let mut literal = String::new();
	let mut chars = body.chars().peekable();

	while let Some(c) = chars.next() {
		if c != '*' {
			literal.push(c);
			continue;
		}

		source.push_str(&regex::escape(&literal));
		literal.clear();

		if chars.peek() == Some(&'*') {
			chars.next();
			// Collapse runs like `***` into a single `.*`
			while chars.peek() == Some(&'*') {
				chars.next();
			}
			source.push_str(".*");
		} else {
			source.push_str("[^/]*");
		}
	}
	source.push_str(&regex::escape(&literal));
	source.push_str("(?:/|$)");

	Ok(source)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn matches(pattern: &str, path: &str) -> bool {
		CompiledExclude::compile(pattern).unwrap().is_match(path)
	}

	#[test]
	fn test_anchored_pattern() {
		assert!(matches("/docs", "docs/x.txt"));
		assert!(matches("/docs", "docs"));
		assert!(!matches("/docs", "other/docs/x.txt"));
		assert!(!matches("/docs", "docsite/index.html"));
	}

	#[test]
	fn test_named_segment() {
		assert!(matches("cache", "a/cache/b"));
		assert!(matches("cache", "cache"));
		assert!(!matches("cache", "cacheit/b"));
		assert!(!matches("cache", "a/mycache"));
	}

	#[test]
	fn test_filename_wildcard() {
		assert!(matches("*.png", "a.png"));
		assert!(matches("*.png", "dir/a.png"));
		assert!(!matches("*.png", "a.png.bak"));
		assert!(!matches("*.png", "should/not/png/ignore.txt"));
	}

	#[test]
	fn test_prefix_wildcard() {
		assert!(matches("dir*", "dir1/x"));
		assert!(matches("dir*", "should/dirignore/this.tst"));
		assert!(!matches("dir*", "notdir/x"));
	}

	#[test]
	fn test_double_star() {
		assert!(matches("/vendor/**/test", "vendor/a/test"));
		assert!(matches("/vendor/**/test", "vendor/a/b/test"));
		assert!(matches("/vendor/**/test", "vendor/my/test/file.tst"));
		assert!(!matches("/vendor/**/test", "vendor/test2"));
		assert!(!matches("/vendor/**/test", "vendor/test/file.tst"));
	}

	#[test]
	fn test_literal_escaping() {
		assert!(matches("a+b(1).txt", "dir/a+b(1).txt"));
		assert!(!matches("a.txt", "abtxt"));
	}

	#[test]
	fn test_empty_pattern_rejected() {
		assert!(CompiledExclude::compile("/").is_err());
		assert!(CompiledExclude::compile("").is_err());
	}
}

// vim: ts=4
