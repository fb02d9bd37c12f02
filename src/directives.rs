//! Line-oriented source directives.
//!
//! Units declare their external libraries, dependencies and plugin metadata in
//! WAT line comments placed at the start of a line:
//!
//! ```text
//! ;; Reference: math
//! ;; Requires: Economy
//! ;; Info: Greeter, Jane Doe, 1.2.0
//! ;; Description: Greeter, Says hello to everyone who joins
//! ```

use pipe_trait::Pipe ;
use serde::Serialize ;



/// Everything the directive scan found in a unit's source.
#[derive( Clone, Debug, Default, Eq, PartialEq )]
pub struct Directives {
	references: Vec<String>,
	requires: Vec<String>,
	infos: Vec<PluginInfo>,
}

impl Directives {

	/// Scans `source` for directive comments.
	pub fn scan( source: &str ) -> Self {
		let mut directives = Self::default();
		let mut descriptions = Vec::new();

		for line in source.lines() {
			if let Some( reference ) = directive( line, "Reference:" ) {
				tracing::debug!( reference, "Added reference" );
				push_unique( &mut directives.references, reference );
			} else if let Some( require ) = directive( line, "Requires:" ) {
				tracing::debug!( require, "Added required plugin" );
				push_unique( &mut directives.requires, require );
			} else if let Some( info ) = directive( line, "Info:" ) {
				if let Some( info ) = PluginInfo::parse( info ) { directives.infos.push( info ) }
			} else if let Some( description ) = directive( line, "Description:" ) {
				if let Some(( title, text )) = description.split_once( ',' ) {
					descriptions.push(( title.trim().to_string(), text.trim().to_string() ));
				}
			}
		}

		descriptions.into_iter().for_each(|( title, text )| {
			if let Some( info ) = directives.infos.iter_mut().find(| info | info.title == title ) {
				info.description = Some( text );
			}
		});

		directives
	}

	/// External library names declared with `Reference:`.
	#[inline] pub fn references( &self ) -> &[String] { &self.references }

	/// Plugin names declared with `Requires:`.
	#[inline] pub fn requires( &self ) -> &[String] { &self.requires }

	/// Plugin metadata declared with `Info:`.
	#[inline] pub fn infos( &self ) -> &[PluginInfo] { &self.infos }

	/// The `Info:` entry describing the type named `title`, if any.
	pub fn info_for( &self, title: &str ) -> Option<&PluginInfo> {
		self.infos.iter().find(| info | info.title == title )
	}

}

fn directive<'a>( line: &'a str, keyword: &str ) -> Option<&'a str> {
	let rest = line.strip_prefix( ";; " ).or_else(|| line.strip_prefix( ";;" ))?;
	rest.strip_prefix( keyword )
		.map( str::trim )
		.filter(| value | !value.is_empty() )
}

fn push_unique( values: &mut Vec<String>, value: &str ) {
	if !values.iter().any(| existing | existing == value ) { values.push( value.to_string() ) }
}

/// Descriptive metadata of a plugin type.
#[derive( Clone, Debug, Eq, PartialEq, Serialize )]
pub struct PluginInfo {
	title: String,
	author: String,
	version: PluginVersion,
	description: Option<String>,
}

impl PluginInfo {

	/// Creates plugin metadata.
	pub fn new( title: impl Into<String>, author: impl Into<String>, version: PluginVersion ) -> Self {
		Self { title: title.into(), author: author.into(), version, description: None }
	}

	fn parse( value: &str ) -> Option<Self> {
		let mut fields = value.splitn( 3, ',' ).map( str::trim );
		let title = fields.next().filter(| title | !title.is_empty() )?;
		let author = fields.next().unwrap_or_default();
		let version = fields.next().map_or_else( PluginVersion::default, PluginVersion::parse );
		Some( Self::new( title, author, version ))
	}

	#[inline] pub fn title( &self ) -> &str { &self.title }
	#[inline] pub fn author( &self ) -> &str { &self.author }
	#[inline] pub fn version( &self ) -> PluginVersion { self.version }
	#[inline] pub fn description( &self ) -> Option<&str> { self.description.as_deref() }

}

/// A `major.minor.patch` plugin version. Missing or unparsable parts read as zero,
/// an unparsable version as a whole reads as `1.0.0`.
#[derive( Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize )]
pub struct PluginVersion {
	pub major: u32,
	pub minor: u32,
	pub patch: u32,
}

impl PluginVersion {

	pub const fn new( major: u32, minor: u32, patch: u32 ) -> Self { Self { major, minor, patch }}

	fn parse( value: &str ) -> Self {
		let parts = value.trim_start_matches( 'v' )
			.split( '.' )
			.map(| part | part.trim().parse::<u32>().ok() )
			.collect::<Vec<_>>();
		match parts.first() {
			Some( Some( major )) => Self::new(
				*major,
				parts.get( 1 ).copied().flatten().unwrap_or( 0 ),
				parts.get( 2 ).copied().flatten().unwrap_or( 0 ),
			),
			_ => Self::default(),
		}
	}

}

impl Default for PluginVersion {
	fn default() -> Self { Self::new( 1, 0, 0 ) }
}

impl std::fmt::Display for PluginVersion {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		write!( f, "{}.{}.{}", self.major, self.minor, self.patch )
	}
}

impl std::str::FromStr for PluginVersion {
	type Err = std::convert::Infallible ;
	fn from_str( value: &str ) -> Result<Self, Self::Err> { value.pipe( Self::parse ).pipe( Ok ) }
}

#[cfg( test )]
mod tests {
	use super::* ;

	const SOURCE: &str = r#";; Reference: math
;;Reference: strings
;; Requires: Economy
;; Requires: Economy
;; Info: Greeter, Jane Doe, 1.2
;; Description: Greeter, Says hello
  ;; Requires: Indented
(module)
"#;

	#[test]
	fn scans_all_directive_kinds() {
		let directives = Directives::scan( SOURCE );
		assert_eq!( directives.references(), [ "math", "strings" ]);
		assert_eq!( directives.requires(), [ "Economy" ]);
		let info = directives.info_for( "Greeter" ).expect( "info" );
		assert_eq!( info.author(), "Jane Doe" );
		assert_eq!( info.version(), PluginVersion::new( 1, 2, 0 ));
		assert_eq!( info.description(), Some( "Says hello" ));
	}

	#[test]
	fn unparsable_version_defaults() {
		let directives = Directives::scan( ";; Info: Thing, Someone, banana\n" );
		assert_eq!( directives.infos()[0].version(), PluginVersion::new( 1, 0, 0 ));
	}

	#[test]
	fn empty_directives_are_ignored() {
		let directives = Directives::scan( ";; Requires:   \n;; Info:\n" );
		assert!( directives.requires().is_empty() );
		assert!( directives.infos().is_empty() );
	}
}
