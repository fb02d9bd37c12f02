//! Background compilation jobs.
//!
//! A [`CompilationJob`] turns one unit's WAT source into a [`CompiledArtifact`]
//! on its own thread. The orchestrator never blocks on it: it polls the job's
//! result channel once per tick. Aborting a job is cooperative, the flag is
//! checked between steps and one last time under the cache's write lock, so
//! an aborted job never reaches the [`ArtifactCache`].

use std::collections::HashMap ;
use std::sync::Arc ;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Instant ;
use crossbeam_channel::{ Receiver, TryRecvError };
use nonempty_collections::{ NEVec, nev };
use wasmtime::{ Engine, ExternType, Module };
use wast::Wat ;
use wast::parser::{ self, ParseBuffer };

use crate::{ ArtifactCache, CompiledArtifact, Diagnostic, HookDescriptor, LoadError, ReferenceSet };
use crate::hooks::same_signature ;
use crate::linker::HOST_MODULE ;
use crate::references::ReferenceResolver ;



/// A wasm binary consisting of nothing but the preamble.
const EMPTY_MODULE_LEN: usize = 8 ;

/// Shared state every job reads from.
#[derive( Clone )]
pub(crate) struct JobContext {
	pub engine: Engine,
	pub cache: Arc<ArtifactCache>,
	pub references: Arc<ReferenceSet>,
	pub hooks: Arc<HashMap<String, HookDescriptor>>,
}

/// Everything a job needs to know about the unit it compiles.
#[derive( Debug )]
pub(crate) struct CompileRequest {
	pub unit: String,
	pub file: String,
	pub source: String,
	pub references: Vec<String>,
	/// Compiled modules of the unit's dependencies, by plugin name.
	pub dependencies: Vec<( String, Module )>,
}

/// The result of a successful job.
#[derive( Debug )]
pub(crate) struct CompileOutput {
	pub artifact: Arc<CompiledArtifact>,
	/// Resolved reference libraries, linked into every instance of the artifact.
	pub libraries: Vec<( String, Module )>,
}

/// What a finished job reports. Warnings survive a failed compilation.
#[derive( Debug )]
pub(crate) struct JobOutcome {
	pub warnings: Vec<Diagnostic>,
	pub result: Result<CompileOutput, LoadError>,
}

impl JobOutcome {
	pub(crate) fn failed( error: LoadError ) -> Self { Self { warnings: Vec::new(), result: Err( error ) } }
}

/// Handle to a compilation running on a background thread.
#[derive( Debug )]
pub(crate) struct CompilationJob {
	unit: String,
	receiver: Receiver<JobOutcome>,
	abort: Arc<AtomicBool>,
}

impl CompilationJob {

	/// Starts compiling `request` on a new thread.
	pub(crate) fn spawn( context: JobContext, request: CompileRequest ) -> Result<Self, LoadError> {
		let unit = request.unit.clone();
		let abort = Arc::new( AtomicBool::new( false ));
		let ( sender, receiver ) = crossbeam_channel::bounded( 1 );
		let job_abort = Arc::clone( &abort );

		std::thread::Builder::new()
			.name( format!( "compile-{unit}" ))
			.spawn( move || {
				let mut warnings = Vec::new();
				let result = compile( &context, request, &job_abort, &mut warnings );
				// The orchestrator may have dropped the job already
				let _ = sender.send( JobOutcome { warnings, result });
			})
			.map_err(| err | LoadError::JobFailed( err.to_string() ))?;

		Ok( Self { unit, receiver, abort })
	}

	#[inline] pub(crate) fn unit( &self ) -> &str { &self.unit }

	/// The job's outcome, if it has finished.
	///
	/// A job whose thread died without reporting (a panic) yields
	/// [`LoadError::JobFailed`]. An aborted job always yields [`LoadError::Aborted`].
	pub(crate) fn poll( &self ) -> Option<JobOutcome> {
		match self.receiver.try_recv() {
			Ok( _ ) if self.is_aborted() => Some( JobOutcome::failed( LoadError::Aborted )),
			Ok( outcome ) => Some( outcome ),
			Err( TryRecvError::Empty ) => None,
			Err( TryRecvError::Disconnected ) => Some( JobOutcome::failed( LoadError::JobFailed(
				format!( "compilation of {} ended without a result", self.unit )
			))),
		}
	}

	/// Requests cancellation. Safe to call at any point, any number of times.
	pub(crate) fn abort( &self ) { self.abort.store( true, Ordering::Release ) }

	pub(crate) fn is_aborted( &self ) -> bool { self.abort.load( Ordering::Acquire ) }

}

/// Runs a compilation to completion on the calling thread. Unresolved
/// references are pushed to `warnings` whether or not compilation succeeds.
pub(crate) fn compile( context: &JobContext, request: CompileRequest, abort: &AtomicBool, warnings: &mut Vec<Diagnostic> ) -> Result<CompileOutput, LoadError> {

	let started = Instant::now();
	let CompileRequest { unit, file, source, references, dependencies } = request ;
	check_abort( abort )?;

	let mut resolver = ReferenceResolver::new( &context.references, &context.engine );
	let libraries = references.iter()
		.filter_map(| name | match resolver.resolve( name ) {
			Some( module ) => Some(( name.clone(), module )),
			None => {
				let needle = format!( "Reference: {name}" );
				let warning = Diagnostic::warning_at( format!( "Unresolved reference `{name}`" ), &file, &source, &needle );
				tracing::warn!( unit = unit.as_str(), file = warning.file(), line = warning.line(), column = warning.column(), "{}", warning.message() );
				warnings.push( warning );
				None
			}
		})
		.collect::<Vec<_>>();

	let bytes = encode( &file, &source )?;
	if bytes.len() <= EMPTY_MODULE_LEN { return Err( LoadError::EmptyModule ) }
	check_abort( abort )?;

	// Validation errors carry a byte offset at best, which doesn't map back
	// to the text, so they are reported at 1:1
	let module = Module::from_binary( &context.engine, &bytes )
		.map_err(| err | LoadError::Compile( nev![ Diagnostic::error( format!( "{err:#}" ), &file, 1, 1 )]))?;

	let errors = check_imports( &module, &file, &source, &libraries, &dependencies );
	if let Some( errors ) = NEVec::try_from_vec( errors ) { return Err( LoadError::Compile( errors )) }
	check_abort( abort )?;

	let types = crate::discovery::discover( &module, &context.hooks );
	let artifact = Arc::new( CompiledArtifact::new(
		unit,
		context.cache.next_generation(),
		module,
		bytes,
		types,
		started.elapsed(),
	));

	match context.cache.commit( Arc::clone( &artifact ), abort ) {
		true => Ok( CompileOutput { artifact, libraries }),
		false => Err( LoadError::Aborted ),
	}

}

fn check_abort( abort: &AtomicBool ) -> Result<(), LoadError> {
	match abort.load( Ordering::Acquire ) {
		true => Err( LoadError::Aborted ),
		false => Ok(()),
	}
}

fn syntax_error( file: &str, source: &str, err: &wast::Error ) -> LoadError {
	let ( line, column ) = err.span().linecol_in( source );
	LoadError::Compile( nev![ Diagnostic::error( err.message(), file, line + 1, column + 1 )])
}

/// Parses WAT and encodes it to a binary module.
fn encode( file: &str, source: &str ) -> Result<Vec<u8>, LoadError> {
	let buffer = ParseBuffer::new( source ).map_err(| err | syntax_error( file, source, &err ))?;
	match parser::parse::<Wat>( &buffer ).map_err(| err | syntax_error( file, source, &err ))? {
		Wat::Module( mut module ) => module.encode().map_err(| err | syntax_error( file, source, &err )),
		Wat::Component( _ ) => Err( LoadError::Compile( nev![
			Diagnostic::error_at( "Components are not supported, expected a core module", file, source, "(component" )
		])),
	}
}

/// Checks that every import can be satisfied once the module is instantiated.
fn check_imports(
	module: &Module,
	file: &str,
	source: &str,
	libraries: &[( String, Module )],
	dependencies: &[( String, Module )],
) -> Vec<Diagnostic> {

	let libraries = libraries.iter().map(|( name, module )| ( name.as_str(), module )).collect::<HashMap<_, _>>();
	let dependencies = dependencies.iter().map(|( name, module )| ( name.as_str(), module )).collect::<HashMap<_, _>>();

	module.imports().filter_map(| import | {
		let ( from, member ) = ( import.module(), import.name() );
		let needle = format!( "\"{from}\" \"{member}\"" );
		let error = | message: String | Some( Diagnostic::error_at( message, file, source, &needle ));

		if from == HOST_MODULE { return None }

		if let Some( library ) = libraries.get( from ) {
			return match ( import.ty(), library.get_export( member )) {
				( _, None ) => error( format!( "Library `{from}` has no export `{member}`" )),
				( ExternType::Func( wanted ), Some( ExternType::Func( found ))) if !same_signature( &wanted, &found )
					=> error( format!( "Signature of `{from}.{member}` does not match the import" )),
				_ => None,
			};
		}

		if let Some( dependency ) = dependencies.get( from ) {
			let export = format!( "{from}.{member}" );
			return match ( import.ty(), dependency.get_export( &export )) {
				( ExternType::Func( _ ), None ) => error( format!( "Plugin `{from}` has no function `{export}`" )),
				( ExternType::Func( wanted ), Some( ExternType::Func( found ))) => match same_signature( &wanted, &found ) {
					true => None,
					false => error( format!( "Signature of `{export}` does not match the import" )),
				},
				( ExternType::Func( _ ), Some( _ )) => error( format!( "`{export}` is not a function" )),
				_ => error( format!( "Only functions can be imported from plugin `{from}`" )),
			};
		}

		error( format!( "Unknown import module `{from}`, add a `Reference:` or `Requires:` directive" ))
	}).collect()

}

#[cfg( test )]
mod tests {
	use super::* ;

	fn context() -> JobContext {
		JobContext {
			engine: Engine::default(),
			cache: Arc::new( ArtifactCache::new() ),
			references: Arc::new( ReferenceSet::default() ),
			hooks: Arc::new( HashMap::new() ),
		}
	}

	fn request( source: &str ) -> CompileRequest {
		CompileRequest {
			unit: "Unit".to_string(),
			file: "Unit.wat".to_string(),
			source: source.to_string(),
			references: Vec::new(),
			dependencies: Vec::new(),
		}
	}

	#[test]
	fn syntax_error_has_location() {
		let abort = AtomicBool::new( false );
		let Err( LoadError::Compile( diagnostics )) = compile( &context(), request( "(module\n  (func (export \"X.Y\") oops))" ), &abort, &mut Vec::new() )
		else { panic!( "expected a compile error" ) };
		assert_eq!( diagnostics.first().line(), 2 );
		assert_eq!( diagnostics.first().file(), "Unit.wat" );
	}

	#[test]
	fn unresolved_reference_warning_survives_failure() {
		let abort = AtomicBool::new( false );
		let mut warnings = Vec::new();
		let outcome = compile( &context(), CompileRequest {
			references: vec![ "abacus".to_string() ],
			..request( ";; Reference: abacus\n(module oops)" )
		}, &abort, &mut warnings );
		assert!( matches!( outcome, Err( LoadError::Compile( _ ))));
		assert_eq!( warnings.len(), 1 );
		assert_eq!( warnings[0].line(), 1 );
	}

	#[test]
	fn header_only_module_is_empty() {
		let abort = AtomicBool::new( false );
		assert!( matches!( compile( &context(), request( "(module)" ), &abort, &mut Vec::new() ), Err( LoadError::EmptyModule )));
	}

	#[test]
	fn unknown_import_module_is_fatal() {
		let abort = AtomicBool::new( false );
		let Err( LoadError::Compile( diagnostics )) = compile( &context(), request( "(module\n(import \"nowhere\" \"f\" (func)))" ), &abort, &mut Vec::new() )
		else { panic!( "expected a compile error" ) };
		assert_eq!(( diagnostics.first().line(), diagnostics.first().column() ), ( 2, 9 ));
	}

	#[test]
	fn aborted_job_leaves_cache_untouched() {
		let context = context();
		let abort = AtomicBool::new( true );
		let outcome = compile( &context, request( "(module (func (export \"X.Y\")))" ), &abort, &mut Vec::new() );
		assert!( matches!( outcome, Err( LoadError::Aborted )));
		assert!( context.cache.is_empty() );
	}

	#[test]
	fn commits_artifact() {
		let context = context();
		let abort = AtomicBool::new( false );
		let output = compile( &context, request( "(module (func (export \"X.Y\")))" ), &abort, &mut Vec::new() ).expect( "compiles" );
		assert_eq!( context.cache.get( "Unit" ).map(| artifact | artifact.generation() ), Some( output.artifact.generation() ));
	}
}
