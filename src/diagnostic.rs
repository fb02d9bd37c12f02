//! Structured compiler diagnostics.
//!
//! Every problem found while turning a unit's source into a module is reported
//! as a [`Diagnostic`] carrying the file it came from and a 1-based line/column.
//! Only [`Severity::Error`] diagnostics are fatal to a compilation.
//!
//! Errors found by module validation (type mismatches, bad indices) have no
//! position in the text and are reported at 1:1.

use serde::Serialize ;



/// How serious a [`Diagnostic`] is.
#[derive( Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize )]
#[serde( rename_all = "lowercase" )]
pub enum Severity {
	/// Informational, never affects the outcome.
	Warning,
	/// Fatal: the job produces no module.
	Error,
}

impl std::fmt::Display for Severity {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		match self {
			Self::Warning => write!( f, "warning" ),
			Self::Error => write!( f, "error" ),
		}
	}
}

/// A single message produced by a compilation job.
#[derive( Clone, Debug, Eq, PartialEq, Serialize )]
pub struct Diagnostic {
	severity: Severity,
	message: String,
	file: String,
	line: usize,
	column: usize,
}

impl Diagnostic {

	/// Creates a fatal diagnostic at the given 1-based position.
	pub fn error( message: impl Into<String>, file: impl Into<String>, line: usize, column: usize ) -> Self {
		Self { severity: Severity::Error, message: message.into(), file: file.into(), line, column }
	}

	/// Creates a non-fatal diagnostic at the given 1-based position.
	pub fn warning( message: impl Into<String>, file: impl Into<String>, line: usize, column: usize ) -> Self {
		Self { severity: Severity::Warning, message: message.into(), file: file.into(), line, column }
	}

	/// Creates a fatal diagnostic pointing at the first occurrence of `needle`
	/// in `source`, or at the start of the file when it does not occur.
	pub(crate) fn error_at( message: impl Into<String>, file: impl Into<String>, source: &str, needle: &str ) -> Self {
		let ( line, column ) = locate( source, needle ).unwrap_or(( 1, 1 ));
		Self::error( message, file, line, column )
	}

	/// Creates a non-fatal diagnostic pointing at the first occurrence of `needle`.
	pub(crate) fn warning_at( message: impl Into<String>, file: impl Into<String>, source: &str, needle: &str ) -> Self {
		let ( line, column ) = locate( source, needle ).unwrap_or(( 1, 1 ));
		Self::warning( message, file, line, column )
	}

	#[inline] pub fn severity( &self ) -> Severity { self.severity }
	#[inline] pub fn message( &self ) -> &str { &self.message }
	#[inline] pub fn file( &self ) -> &str { &self.file }
	#[inline] pub fn line( &self ) -> usize { self.line }
	#[inline] pub fn column( &self ) -> usize { self.column }
	#[inline] pub fn is_fatal( &self ) -> bool { self.severity == Severity::Error }

}

impl std::fmt::Display for Diagnostic {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		write!( f, "{}: {} ({} {}:{})", self.severity, self.message, self.file, self.line, self.column )
	}
}

/// Returns the 1-based line and column of the first occurrence of `needle`.
fn locate( source: &str, needle: &str ) -> Option<( usize, usize )> {
	let offset = source.find( needle )?;
	let before = &source[..offset];
	let line = before.matches( '\n' ).count() + 1;
	let column = before.rfind( '\n' ).map_or( offset, | newline | offset - newline - 1 ) + 1;
	Some(( line, column ))
}

#[cfg( test )]
mod tests {
	use super::* ;

	#[test]
	fn locates_needle_on_later_line() {
		let source = "(module\n  (import \"a\" \"b\" (func)))" ;
		let diagnostic = Diagnostic::error_at( "unresolved", "x.wat", source, "(import \"a\" \"b\"" );
		assert_eq!(( diagnostic.line(), diagnostic.column() ), ( 2, 3 ));
	}

	#[test]
	fn missing_needle_points_at_file_start() {
		let diagnostic = Diagnostic::error_at( "unresolved", "x.wat", "(module)", "nope" );
		assert_eq!(( diagnostic.line(), diagnostic.column() ), ( 1, 1 ));
	}
}
