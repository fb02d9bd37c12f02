use std::sync::{ Arc, Weak };
use thiserror::Error ;
use wasmtime::{ Caller, Engine, Extern, ExternType, Linker, Module, Store };

use crate::{ DispatchError, ModuleRegistry, PluginInstance, PluginState };



/// Import module name under which host functions are provided.
pub const HOST_MODULE: &str = "host" ;

/// Errors raised by host functions back into the calling plugin.
#[derive( Error, Debug )]
pub enum HostError {
	/// The caller doesn't export a linear memory named `memory`.
	#[error( "Plugin {0} exports no memory" )] MissingMemory( String ),
	/// A pointer/length pair reaches outside the caller's memory.
	#[error( "Out of bounds memory access at {ptr}+{len}" )] OutOfBounds { ptr: i32, len: i32 },
	/// The bytes read from the caller are not valid UTF-8.
	#[error( "Invalid UTF-8 string: {0}" )] InvalidUtf8( #[from] std::str::Utf8Error ),
}

/// A linker providing the default host functions.
///
/// - `host.log( ptr: i32, len: i32 )` logs a UTF-8 string read from the
/// 	caller's exported `memory`.
pub(crate) fn host_linker( engine: &Engine ) -> Result<Linker<PluginState>, wasmtime::Error> {
	let mut linker = Linker::new( engine );
	linker.func_wrap( HOST_MODULE, "log", | mut caller: Caller<'_, PluginState>, ptr: i32, len: i32 | -> wasmtime::Result<()> {
		let message = read_string( &mut caller, ptr, len )?;
		tracing::info!( target: "wasm_hotload::plugin", plugin = caller.data().plugin(), "{message}" );
		Ok(())
	})?;
	Ok( linker )
}

fn read_string( caller: &mut Caller<'_, PluginState>, ptr: i32, len: i32 ) -> Result<String, HostError> {
	let memory = caller.get_export( "memory" )
		.and_then( Extern::into_memory )
		.ok_or_else(|| HostError::MissingMemory( caller.data().plugin().to_string() ))?;
	let data = memory.data( &*caller );
	let bytes = usize::try_from( ptr ).ok()
		.zip( usize::try_from( len ).ok() )
		.and_then(|( start, len )| data.get( start..start.checked_add( len )? ))
		.ok_or( HostError::OutOfBounds { ptr, len })?;
	Ok( std::str::from_utf8( bytes )?.to_string() )
}

/// Instantiates every reference library in `store` and registers each one's
/// exports in `linker` under the library name.
pub(crate) fn link_libraries(
	linker: &mut Linker<PluginState>,
	store: &mut Store<PluginState>,
	libraries: &[( String, Module )],
) -> Result<(), wasmtime::Error> {
	for ( name, module ) in libraries {
		let instance = linker.instantiate( &mut *store, module )?;
		linker.instance( &mut *store, name, instance )?;
	}
	Ok(())
}

/// Satisfies imports of `module` from dependency plugins.
///
/// Dependencies live in their own stores, so an import `dep.member` becomes a
/// host function forwarding the call to the export `dep.member` of whichever
/// `dep` instance is registered when the call is made. A reloaded dependency
/// is picked up without relinking. While no `dep` is loaded the forwarded call
/// fails with [`DispatchError::DependencyUnloaded`].
pub(crate) fn link_dependencies(
	linker: &mut Linker<PluginState>,
	module: &Module,
	dependencies: &[Arc<PluginInstance>],
	registry: &Arc<ModuleRegistry>,
) -> Result<(), wasmtime::Error> {
	for import in module.imports() {
		if !dependencies.iter().any(| dependency | dependency.name() == import.module() ) { continue }
		let ExternType::Func( ty ) = import.ty() else { continue };

		// The registry owns every plugin, so only a weak handle may live in a store
		let registry: Weak<ModuleRegistry> = Arc::downgrade( registry );
		let plugin = import.module().to_string();
		let export = format!( "{}.{}", import.module(), import.name() );

		linker.func_new( import.module(), import.name(), ty, move | _caller, params, results | {
			let dependency = registry.upgrade()
				.and_then(| registry | registry.find( &plugin ))
				.ok_or_else(|| DispatchError::DependencyUnloaded( plugin.clone() ))?;
			dependency.call_into( &export, params, results )?;
			Ok(())
		})?;
	}
	Ok(())
}
