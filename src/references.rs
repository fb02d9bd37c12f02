//! Shared library modules units can pull in with `Reference:` directives.
//!
//! The [`ReferenceSet`] is the process-wide pool of libraries: modules the host
//! registers at startup plus any module resolved from the references directory
//! since. A compilation job resolves names through a [`ReferenceResolver`] which
//! memoises lookups for the duration of the job.

use std::collections::HashMap ;
use std::path::{ Path, PathBuf };
use parking_lot::RwLock ;
use pipe_trait::Pipe ;
use wasmtime::{ Engine, Module };



/// File extensions tried, in order, when resolving a library from disk.
const LIBRARY_EXTENSIONS: [&str; 2] = [ "wat", "wasm" ];

/// Process-wide set of library modules.
#[derive( Debug, Default )]
pub struct ReferenceSet {
	libraries: RwLock<HashMap<String, Module>>,
	directory: Option<PathBuf>,
}

impl ReferenceSet {

	/// Creates a set that also resolves unknown names from `directory`.
	pub fn new( directory: Option<PathBuf> ) -> Self {
		Self { libraries: RwLock::new( HashMap::new() ), directory }
	}

	/// Registers an already compiled library under `name`, replacing any previous one.
	pub fn register( &self, name: impl Into<String>, module: Module ) {
		self.libraries.write().insert( name.into(), module );
	}

	/// Compiles `source` (WAT or binary) and registers it under `name`.
	///
	/// # Errors
	/// Returns an error if the library fails to compile.
	pub fn register_source( &self, engine: &Engine, name: impl Into<String>, source: impl AsRef<[u8]> ) -> Result<(), wasmtime::Error> {
		let module = Module::new( engine, source )?;
		self.register( name, module );
		Ok(())
	}

	/// Whether a library is already known under `name`.
	pub fn contains( &self, name: &str ) -> bool { self.libraries.read().contains_key( name ) }

	/// Names of all known libraries.
	pub fn names( &self ) -> Vec<String> { self.libraries.read().keys().cloned().collect() }

	/// Looks `name` up in the shared set, falling back to the references directory.
	/// Libraries found on disk join the shared set.
	pub fn resolve( &self, engine: &Engine, name: &str ) -> Option<Module> {
		if let Some( module ) = self.libraries.read().get( name ) { return Some( module.clone() ) }
		let module = self.directory.as_deref().and_then(| directory | load_library( engine, directory, name ))?;
		self.libraries.write().entry( name.to_string() ).or_insert( module ).clone().pipe( Some )
	}

}

fn load_library( engine: &Engine, directory: &Path, name: &str ) -> Option<Module> {
	LIBRARY_EXTENSIONS.iter()
		.map(| extension | directory.join( format!( "{name}.{extension}" )))
		.find(| path | path.is_file() )
		.and_then(| path | match Module::from_file( engine, &path ) {
			Ok( module ) => Some( module ),
			Err( err ) => {
				tracing::warn!( library = name, path = %path.display(), error = %err, "Failed to compile referenced library" );
				None
			}
		})
}

/// Per-job memoising view over a [`ReferenceSet`].
pub(crate) struct ReferenceResolver<'a> {
	shared: &'a ReferenceSet,
	engine: &'a Engine,
	cache: HashMap<String, Option<Module>>,
}

impl<'a> ReferenceResolver<'a> {

	pub(crate) fn new( shared: &'a ReferenceSet, engine: &'a Engine ) -> Self {
		Self { shared, engine, cache: HashMap::new() }
	}

	pub(crate) fn resolve( &mut self, name: &str ) -> Option<Module> {
		if let Some( cached ) = self.cache.get( name ) { return cached.clone() }
		let resolved = self.shared.resolve( self.engine, name );
		self.cache.insert( name.to_string(), resolved.clone() );
		resolved
	}

}
