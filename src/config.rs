//! Runtime configuration.

use std::collections::HashSet ;
use std::path::{ Path, PathBuf };
use std::time::Duration ;
use serde::{ Deserialize, Serialize };

use crate::ConfigError ;



/// Settings read once when the [`Runtime`]( crate::Runtime ) is created.
///
/// Every field has a default, so a partial TOML file is fine:
///
/// ```
/// use wasm_hotload::RuntimeConfig ;
///
/// let config = RuntimeConfig::from_toml_str( r#"
/// 	plugin_directory = "plugins"
/// 	strict_hook_validation = true
/// 	ignored = [ "Experimental" ]
/// "# ).unwrap();
///
/// assert!( config.strict_hook_validation );
/// assert_eq!( config.source_extension, "wat" );
/// assert_eq!( config.gate_poll_interval_ms, 100 );
/// ```
#[derive( Clone, Debug, PartialEq, Eq, Serialize, Deserialize )]
#[serde( default )]
pub struct RuntimeConfig {
	/// Directory scanned by [`Runtime::load_directory`]( crate::Runtime::load_directory ) calls without an explicit path.
	pub plugin_directory: Option<PathBuf>,
	/// Directory `Reference:` libraries are resolved from.
	pub references_directory: Option<PathBuf>,
	/// Extension of unit files, without the dot.
	pub source_extension: String,
	/// Log unsupported hooks found in plugins.
	pub hook_validation: bool,
	/// Fail units using unsupported hooks instead of only logging them.
	pub strict_hook_validation: bool,
	/// Record per-hook and per-plugin timings.
	pub hook_time_tracker: bool,
	/// How often gated units re-check their dependencies.
	pub gate_poll_interval_ms: u64,
	/// Unit names skipped by bulk loads.
	pub ignored: HashSet<String>,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			plugin_directory: None,
			references_directory: None,
			source_extension: "wat".to_string(),
			hook_validation: true,
			strict_hook_validation: false,
			hook_time_tracker: true,
			gate_poll_interval_ms: 100,
			ignored: HashSet::new(),
		}
	}
}

impl RuntimeConfig {

	/// Parses a configuration from TOML text.
	///
	/// # Errors
	/// Returns [`ConfigError::Parse`] on malformed TOML or mistyped fields.
	pub fn from_toml_str( text: &str ) -> Result<Self, ConfigError> {
		Ok( toml::from_str( text )? )
	}

	/// Reads and parses a TOML configuration file.
	///
	/// # Errors
	/// Returns [`ConfigError::Io`] if the file can't be read.
	pub fn load( path: impl AsRef<Path> ) -> Result<Self, ConfigError> {
		let text = std::fs::read_to_string( path )?;
		Self::from_toml_str( &text )
	}

	/// [`Self::gate_poll_interval_ms`] as a [`Duration`].
	pub fn gate_poll_interval( &self ) -> Duration { Duration::from_millis( self.gate_poll_interval_ms )}

}
