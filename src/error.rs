//! Error taxonomy of the runtime.
//!
//! All load failures are terminal for the unit they belong to and are reported
//! through [`UnitReport`]( crate::UnitReport ); none of them is allowed to
//! escape into the host.

use itertools::Itertools ;
use nonempty_collections::NEVec ;
use thiserror::Error ;

use crate::Diagnostic ;



/// Why a unit did not reach [`Phase::Ready`]( crate::Phase::Ready ).
#[derive( Error, Debug )]
pub enum LoadError {
	/// The unit's file could not be read.
	#[error( "Failed to read {path}: {source}" )] Io { path: String, source: std::io::Error },
	/// The unit has no source text to compile.
	#[error( "Attempted to compile an empty source" )] EmptySource,
	/// One or more fatal diagnostics were produced.
	#[error( "Compilation failed with {} error(s): {}", .0.len(), join( .0 ))] Compile( NEVec<Diagnostic> ),
	/// Compilation succeeded without producing any module content.
	#[error( "Compilation produced an empty module" )] EmptyModule,
	/// Declared dependencies were not found among ready plugins.
	#[error( "Missing dependencies: {}", join( .0 ))] MissingDependency( NEVec<String> ),
	/// The job was cancelled, usually because a newer load superseded it.
	#[error( "Compilation aborted" )] Aborted,
	/// The background job ended without reporting a result.
	#[error( "Compilation job failed: {0}" )] JobFailed( String ),
	/// Strict hook validation rejected a plugin using unsupported hooks.
	#[error( "Plugin {plugin} uses unsupported hooks: {}", .hooks.iter().join( ", " ))] UnsupportedHooks { plugin: String, hooks: Vec<String> },
	/// Constructing or initialising a plugin instance failed.
	#[error( "Failed to instantiate {plugin}: {error}" )] Instantiation { plugin: String, error: wasmtime::Error },
	/// A plugin's hooks could not be installed.
	#[error( "Failed to subscribe hooks of {plugin}: {error}" )] Hook { plugin: String, error: HookError },
}

impl LoadError {
	/// Aborts are a clean cancellation rather than a fault.
	pub fn is_abort( &self ) -> bool { matches!( self, Self::Aborted ) }
}

/// Errors raised by the hook registry.
#[derive( Error, Debug )]
pub enum HookError {
	/// A descriptor with this name is already registered.
	#[error( "Hook {0} is already registered" )] DuplicateDescriptor( String ),
	/// No descriptor with this name is registered.
	#[error( "Unknown hook: {0}" )] UnknownHook( String ),
	/// The host failed to install the interception point.
	#[error( "Failed to install hook {hook}: {reason}" )] Intercept { hook: String, reason: String },
}

/// Errors that can occur when calling into a plugin instance.
#[derive( Error, Debug )]
pub enum DispatchError {
	/// The instance is already executing (re-entrant call).
	#[error( "Lock Rejected" )] LockRejected,
	/// The requested export doesn't exist on the instance.
	#[error( "Invalid Function: {0}" )] InvalidFunction( String ),
	/// The provided arguments don't match the function signature.
	#[error( "Invalid Argument List" )] InvalidArgumentList,
	/// The WASM function trapped during execution.
	#[error( "Runtime Exception: {0}" )] RuntimeException( wasmtime::Error ),
	/// A forwarded call targeted a dependency that has since been unloaded.
	#[error( "Dependency Unloaded: {0}" )] DependencyUnloaded( String ),
}

/// Errors raised while loading a [`RuntimeConfig`]( crate::RuntimeConfig ).
#[derive( Error, Debug )]
pub enum ConfigError {
	#[error( "IO error: {0}" )] Io( #[from] std::io::Error ),
	#[error( "TOML parse error: {0}" )] Parse( #[from] toml::de::Error ),
}

fn join<T: std::fmt::Display>( items: &NEVec<T> ) -> String {
	items.iter().into_iter().join( "; " )
}
