//! Source units and the phases a load moves them through.

use std::path::{ Path, PathBuf };
use serde::Serialize ;

use crate::{ Directives, LoadError };



/// Where a load currently is. See [`LoadOrchestrator`]( crate::LoadOrchestrator ).
#[derive( Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize )]
pub enum Phase {
	Pending,
	ReferenceExtraction,
	Gated,
	Compiling,
	Instantiating,
	Ready,
	Failed,
	Aborted,
}

impl Phase {
	/// Whether the load is finished, successfully or not.
	pub fn is_terminal( self ) -> bool { matches!( self, Self::Ready | Self::Failed | Self::Aborted )}
}

impl std::fmt::Display for Phase {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result { write!( f, "{:?}", self )}
}

/// One named source input.
///
/// A unit created from a file reads its text lazily, during the
/// [`Phase::ReferenceExtraction`] step of its load, so a batch can be queued
/// without touching the disk.
#[derive( Clone, Debug )]
pub struct SourceUnit {
	name: String,
	path: Option<PathBuf>,
	source: Option<String>,
	directives: Directives,
	is_core: bool,
}

impl SourceUnit {

	/// A unit backed by a file; its name is the file stem.
	pub fn from_file( path: impl Into<PathBuf> ) -> Self {
		let path = path.into();
		let name = path.file_stem().map_or_else( String::new, | stem | stem.to_string_lossy().into_owned() );
		Self { name, path: Some( path ), source: None, directives: Directives::default(), is_core: false }
	}

	/// A unit with in-memory source text.
	pub fn from_source( name: impl Into<String>, source: impl Into<String> ) -> Self {
		Self { name: name.into(), path: None, source: Some( source.into() ), directives: Directives::default(), is_core: false }
	}

	/// Marks the unit as belonging to the core group, which is never fully unloaded.
	pub fn core( mut self ) -> Self {
		self.is_core = true ;
		self
	}

	#[inline] pub fn name( &self ) -> &str { &self.name }
	#[inline] pub fn path( &self ) -> Option<&Path> { self.path.as_deref() }
	#[inline] pub fn source( &self ) -> Option<&str> { self.source.as_deref() }
	#[inline] pub fn directives( &self ) -> &Directives { &self.directives }
	#[inline] pub fn is_core( &self ) -> bool { self.is_core }

	/// External library names, available once directives were extracted.
	#[inline] pub fn references( &self ) -> &[String] { self.directives.references() }

	/// Required plugin names, available once directives were extracted.
	#[inline] pub fn requires( &self ) -> &[String] { self.directives.requires() }

	/// Name used in diagnostics: the file path if any, else `<name>.wat`.
	pub fn file_name( &self ) -> String {
		self.path.as_ref().map_or_else(
			|| format!( "{}.wat", self.name ),
			| path | path.display().to_string(),
		)
	}

	/// Reads the source if needed and scans its directives.
	pub(crate) fn extract( &mut self ) -> Result<(), LoadError> {
		if self.source.is_none() {
			let Some( path ) = &self.path else { return Err( LoadError::EmptySource ) };
			let text = std::fs::read_to_string( path ).map_err(| source | LoadError::Io {
				path: path.display().to_string(),
				source,
			})?;
			self.source = Some( text );
		}
		let source = self.source.as_deref().unwrap_or_default();
		if source.trim().is_empty() { return Err( LoadError::EmptySource ) }
		self.directives = Directives::scan( source );
		Ok(())
	}

	/// Drops cached file contents so the next load re-reads the file.
	pub(crate) fn forget_source( &mut self ) {
		if self.path.is_some() { self.source = None }
	}

}
