//! Compiled artifacts and the process-wide artifact cache.
//!
//! The cache holds at most one [`CompiledArtifact`] per unit name. Entries are
//! `Arc`s swapped under a write lock, so a reader either sees the previous
//! artifact or the new one in full. A superseded artifact has its bytes wiped,
//! but instances created from it keep working since they hold the compiled
//! [`Module`].

use std::collections::HashMap ;
use std::sync::Arc ;
use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::time::Duration ;
use parking_lot::RwLock ;
use wasmtime::Module ;

use crate::TypeMetadata ;



/// A module produced by a successful compilation job.
#[derive( Debug )]
pub struct CompiledArtifact {
	name: String,
	generation: u64,
	module: Module,
	bytes: RwLock<Vec<u8>>,
	types: Vec<TypeMetadata>,
	compile_time: Duration,
	superseded: AtomicBool,
}

impl CompiledArtifact {

	pub(crate) fn new(
		name: impl Into<String>,
		generation: u64,
		module: Module,
		bytes: Vec<u8>,
		types: Vec<TypeMetadata>,
		compile_time: Duration,
	) -> Self {
		Self {
			name: name.into(),
			generation,
			module,
			bytes: RwLock::new( bytes ),
			types,
			compile_time,
			superseded: AtomicBool::new( false ),
		}
	}

	/// Name of the unit this artifact was compiled from.
	#[inline] pub fn name( &self ) -> &str { &self.name }

	/// Monotonic counter distinguishing successive compilations.
	#[inline] pub fn generation( &self ) -> u64 { self.generation }

	/// The compiled module.
	#[inline] pub fn module( &self ) -> &Module { &self.module }

	/// Types discovered in the module, in export order.
	#[inline] pub fn types( &self ) -> &[TypeMetadata] { &self.types }

	/// Wall-clock time the compilation took.
	#[inline] pub fn compile_time( &self ) -> Duration { self.compile_time }

	/// A copy of the encoded module, empty once superseded.
	pub fn bytes( &self ) -> Vec<u8> { self.bytes.read().clone() }

	/// Whether a newer compilation of the same unit replaced this one.
	pub fn is_superseded( &self ) -> bool { self.superseded.load( Ordering::Acquire ) }

	/// Metadata of the type named `name`.
	pub fn type_named( &self, name: &str ) -> Option<&TypeMetadata> {
		self.types.iter().find(| ty | ty.name() == name )
	}

	fn invalidate( &self ) {
		self.superseded.store( true, Ordering::Release );
		let mut bytes = self.bytes.write();
		bytes.fill( 0 );
		bytes.clear();
		bytes.shrink_to_fit();
	}

}

/// Process-wide mapping from unit name to its latest compiled artifact.
#[derive( Debug, Default )]
pub struct ArtifactCache {
	entries: RwLock<HashMap<String, Arc<CompiledArtifact>>>,
	generation: AtomicU64,
}

impl ArtifactCache {

	pub fn new() -> Self { Self::default() }

	/// The current artifact for `name`.
	pub fn get( &self, name: &str ) -> Option<Arc<CompiledArtifact>> {
		self.entries.read().get( name ).cloned()
	}

	/// Inserts `artifact`, invalidating and returning whatever it replaces.
	pub fn replace( &self, artifact: Arc<CompiledArtifact> ) -> Option<Arc<CompiledArtifact>> {
		let previous = self.entries.write().insert( artifact.name().to_string(), artifact );
		if let Some( previous ) = &previous { previous.invalidate() }
		previous
	}

	/// Inserts `artifact` unless `abort` is set, checked while holding the write lock.
	///
	/// Returns `false` when the job was aborted and the cache left untouched.
	pub(crate) fn commit( &self, artifact: Arc<CompiledArtifact>, abort: &AtomicBool ) -> bool {
		let mut entries = self.entries.write();
		if abort.load( Ordering::Acquire ) { return false }
		let previous = entries.insert( artifact.name().to_string(), artifact );
		drop( entries );
		if let Some( previous ) = previous { previous.invalidate() }
		true
	}

	/// Removes and invalidates the artifact for `name`.
	pub fn remove( &self, name: &str ) -> Option<Arc<CompiledArtifact>> {
		let removed = self.entries.write().remove( name );
		if let Some( removed ) = &removed { removed.invalidate() }
		removed
	}

	/// Names with a cached artifact.
	pub fn names( &self ) -> Vec<String> { self.entries.read().keys().cloned().collect() }

	pub fn len( &self ) -> usize { self.entries.read().len() }

	pub fn is_empty( &self ) -> bool { self.entries.read().is_empty() }

	/// Removes and invalidates every artifact.
	pub fn clear( &self ) {
		let drained = std::mem::take( &mut *self.entries.write() );
		drained.values().for_each(| artifact | artifact.invalidate() );
	}

	pub(crate) fn next_generation( &self ) -> u64 {
		self.generation.fetch_add( 1, Ordering::Relaxed ) + 1
	}

}
