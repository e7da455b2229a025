//! Path exclusion for mirrored folders
//!
//! Patterns are compiled lazily on first use and memoized by their literal
//! string for the lifetime of the matcher (one matcher per mirrored folder).

mod patterns;

pub use patterns::CompiledExclude;

use crate::error::MirrorError;
use crate::types::normalize_relative;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Exclude matcher bound to one mirror's pattern list
#[derive(Debug)]
pub struct ExcludeMatcher {
	patterns: Vec<String>,
	compiled: Mutex<HashMap<String, Arc<CompiledExclude>>>,
}

impl ExcludeMatcher {
	pub fn new<I, S>(patterns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		ExcludeMatcher {
			patterns: patterns.into_iter().map(Into::into).collect(),
			compiled: Mutex::new(HashMap::new()),
		}
	}

	/// Compile every pattern up front so a bad one fails at startup
	pub fn validate(&self) -> Result<(), MirrorError> {
		for pattern in &self.patterns {
			self.compiled(pattern)?;
		}
		Ok(())
	}

	/// True if any configured pattern matches the relative path
	pub fn is_excluded(&self, path: &str) -> Result<bool, MirrorError> {
		let relative = normalize_relative(path);
		for pattern in &self.patterns {
			if self.compiled(pattern)?.is_match(&relative) {
				return Ok(true);
			}
		}
		Ok(false)
	}

	fn compiled(&self, pattern: &str) -> Result<Arc<CompiledExclude>, MirrorError> {
		let mut cache = self
			.compiled
			.lock()
			.map_err(|_| MirrorError::Other { message: "exclude cache poisoned".to_string() })?;

		if let Some(hit) = cache.get(pattern) {
			return Ok(hit.clone());
		}

		let compiled = Arc::new(CompiledExclude::compile(pattern)?);
		cache.insert(pattern.to_string(), compiled.clone());
		Ok(compiled)
	}

	#[cfg(test)]
	fn cached_count(&self) -> usize {
		self.compiled.lock().map(|c| c.len()).unwrap_or(0)
	}
}


// vim: ts=4
