//! A live, in-process plugin runtime for WebAssembly modules.
//!
//! Plugins are written as WebAssembly text (WAT) source units. The runtime
//! compiles them on background threads, links them against shared libraries
//! and against each other, and routes host interception points ("hooks") to
//! them, all while the host keeps running. Units can be reloaded, replaced
//! and unloaded at any time.
//!
//! # Core Concepts
//!
//! - [`SourceUnit`]: One named source input. Its line directives declare
//! 	external libraries (`;; Reference: math`), required plugins
//! 	(`;; Requires: Economy`) and plugin metadata
//! 	(`;; Info: Greeter, Jane Doe, 1.0.0`).
//!
//! - **Type**: Exports of a compiled module are named `<Type>.<Member>`. Every
//! 	type with a matching `Info:` directive becomes one [`PluginInstance`].
//! 	Members are classified on discovery (see [`TypeMetadata`]):
//! 	- `Type.OnSomething` implements the hook `OnSomething`
//! 	- `Type.method#OnSomething` implements it under another name
//! 	- `Type.Init` and `Type.Unload` are lifecycle entry points
//! 	- `Type.@Other`, a mutable `i32` global, is set to `1` while a plugin named
//! 		`Other` is loaded and to `0` otherwise
//!
//! - [`HookDescriptor`]: Static description of one interception point,
//! 	registered with the [`HookRegistry`] at startup. The host calls
//! 	[`HookRegistry::dispatch`] when it reaches the interception point; the
//! 	first non-zero result of any handler overrides the host's own behaviour.
//!
//! - [`LoadOrchestrator`]: Drives every requested load through the phases of
//! 	[`Phase`] without ever blocking the host. Units submitted together form a
//! 	batch. Within a batch, units declaring `Requires:` wait until every unit
//! 	without requirements is finished, then resolve their dependencies among
//! 	the loaded plugins.
//!
//! - [`Runtime`]: Owns all of the above and exposes the operations a host
//! 	drives them with.
//!
//! # Dependencies between plugins
//!
//! A unit requiring `Economy` may import functions from the module `"Economy"`.
//! The import `(import "Economy" "balance" ...)` is bound to the export
//! `Economy.balance` of the live `Economy` plugin. Plugins live in separate
//! stores, so these calls are forwarded by the host. A dependency that has
//! been unloaded since fails the forwarded call with
//! [`DispatchError::DependencyUnloaded`].
//!
//! # Host functions
//!
//! Every plugin may import `host.log( ptr: i32, len: i32 )`, which logs a UTF-8
//! string from the plugin's exported `memory`. More functions can be added
//! through [`Runtime::host_linker_mut`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration ;
//! use wasm_hotload::{
//! 	Runtime, RuntimeConfig, SourceUnit, Phase, Engine, Val,
//! 	HookDescriptor, HookCategory, InterceptionTarget, ParamKind,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runtime = Runtime::new( Engine::default(), RuntimeConfig::default() )?;
//!
//! // Hooks are described once, up front.
//! runtime.register_hook( HookDescriptor::new(
//! 	"OnPlayerChat",
//! 	HookCategory::Player,
//! 	InterceptionTarget::new( "Chat", "broadcast" ),
//! )
//! 	.with_parameter( "player", ParamKind::I64 )
//! 	.returning( ParamKind::I32 ))?;
//! runtime.initialize();
//!
//! let economy = SourceUnit::from_source( "Economy", r#"
//! ;; Info: Economy, Jane Doe, 1.0.0
//! (module
//! 	(func (export "Economy.balance") (param i64) (result i32) i32.const 50))
//! "# );
//!
//! let chat_filter = SourceUnit::from_source( "ChatFilter", r#"
//! ;; Requires: Economy
//! ;; Info: ChatFilter, Jane Doe, 1.0.0
//! (module
//! 	(import "Economy" "balance" (func $balance (param i64) (result i32)))
//! 	(func (export "ChatFilter.OnPlayerChat") (param $player i64) (result i32)
//! 		;; Players below 100 coins are muted
//! 		(i32.lt_s (call $balance (local.get $player)) (i32.const 100))))
//! "# );
//!
//! // Both units load as one batch; `ChatFilter` waits for `Economy`.
//! let batches = runtime.subscribe_batches();
//! runtime.load_batch( vec![ economy, chat_filter ]);
//! assert!( runtime.run_until_idle( Duration::from_secs( 10 )));
//! assert!( batches.try_recv()?.is_success() );
//! assert_eq!( runtime.status( "ChatFilter" ).map(| report | report.phase() ), Some( Phase::Ready ));
//!
//! // A non-null result suppresses the host's own handling.
//! let muted = runtime.dispatch( "OnPlayerChat", &[ Val::I64( 7 )]);
//! assert!( matches!( muted, Some( Val::I32( 1 ))));
//! # Ok(())
//! # }
//! ```
//!
//! # Re-exports
//!
//! `wasm_hotload` re-exports a small set of types from `wasmtime` for convenience
//! (`Engine`, `Module`, `Linker`, `Val`). See the
//! [wasmtime docs](https://docs.rs/wasmtime/latest/wasmtime/) for details.

mod artifact ;
mod compiler ;
mod config ;
mod diagnostic ;
mod directives ;
mod discovery ;
mod error ;
pub mod gate ;
mod hook_registry ;
mod hooks ;
mod linker ;
mod module_registry ;
mod orchestrator ;
mod plugin_instance ;
mod references ;
mod runtime ;
mod source_unit ;

#[doc( no_inline )]
pub use wasmtime::{ Engine, Linker, Module, Val };
#[doc( no_inline )]
pub use nonempty_collections::NEVec ;

pub use artifact::{ ArtifactCache, CompiledArtifact };
pub use config::RuntimeConfig ;
pub use diagnostic::{ Diagnostic, Severity };
pub use directives::{ Directives, PluginInfo, PluginVersion };
pub use discovery::{ HookMethod, PluginReference, TypeMetadata, INIT, UNLOAD, discover, looks_like_hook };
pub use error::{ ConfigError, DispatchError, HookError, LoadError };
pub use hook_registry::{ HookRegistry, HookSummary, Interceptor, NoopInterceptor };
pub use hooks::{ HookCategory, HookDescriptor, HookParameter, InterceptionTarget, ParamKind };
pub use linker::{ HOST_MODULE, HostError };
pub use module_registry::{ CORE_GROUP, GroupSummary, ModuleGroup, ModuleRegistry, PluginSummary, SCRIPTS_GROUP };
pub use orchestrator::{ BatchReport, LoadOrchestrator, LoadTask, UnitReport };
pub use plugin_instance::{ PluginInstance, PluginState };
pub use references::ReferenceSet ;
pub use runtime::Runtime ;
pub use source_unit::{ Phase, SourceUnit };
