//! Export classification of compiled modules.
//!
//! A compiled module exposes its plugin types through export names of the form
//! `<Type>.<Member>`. Discovery walks the module's exports once and sorts every
//! member into hooks, unsupported hooks, explicitly bound hook methods and plugin
//! reference fields.

use std::collections::HashMap ;
use serde::Serialize ;
use wasmtime::{ ExternType, Module, Mutability, ValType };

use crate::HookDescriptor ;



/// Lifecycle export called right after instantiation.
pub const INIT: &str = "Init" ;
/// Lifecycle export called during teardown.
pub const UNLOAD: &str = "Unload" ;

/// A handler exported under a name other than its hook's.
#[derive( Clone, Debug, Eq, PartialEq, Serialize )]
pub struct HookMethod {
	hook: String,
	export: String,
}

impl HookMethod {
	/// Name of the hook this method handles.
	#[inline] pub fn hook( &self ) -> &str { &self.hook }
	/// Full export name of the handler.
	#[inline] pub fn export( &self ) -> &str { &self.export }
}

/// An `i32` global the runtime keeps in sync with another plugin's presence.
#[derive( Clone, Debug, Eq, PartialEq, Serialize )]
pub struct PluginReference {
	plugin: String,
	export: String,
}

impl PluginReference {
	/// Name of the referenced plugin.
	#[inline] pub fn plugin( &self ) -> &str { &self.plugin }
	/// Full export name of the global.
	#[inline] pub fn export( &self ) -> &str { &self.export }
}

/// Everything discovered about one type of a compiled module.
#[derive( Clone, Debug, Default, Eq, PartialEq, Serialize )]
pub struct TypeMetadata {
	name: String,
	hooks: Vec<String>,
	unsupported_hooks: Vec<String>,
	hook_methods: Vec<HookMethod>,
	plugin_references: Vec<PluginReference>,
	lifecycle: Vec<String>,
}

impl TypeMetadata {

	fn new( name: &str ) -> Self { Self { name: name.to_string(), ..Self::default() }}

	#[inline] pub fn name( &self ) -> &str { &self.name }
	/// Hooks implemented under their own name.
	#[inline] pub fn hooks( &self ) -> &[String] { &self.hooks }
	/// Hook-like members the runtime cannot dispatch to.
	#[inline] pub fn unsupported_hooks( &self ) -> &[String] { &self.unsupported_hooks }
	/// Hooks implemented under a different member name.
	#[inline] pub fn hook_methods( &self ) -> &[HookMethod] { &self.hook_methods }
	/// Globals tracking the presence of other plugins.
	#[inline] pub fn plugin_references( &self ) -> &[PluginReference] { &self.plugin_references }
	/// Lifecycle members ([`INIT`], [`UNLOAD`]) the type exports.
	#[inline] pub fn lifecycle( &self ) -> &[String] { &self.lifecycle }

	/// Export name of `member` on this type.
	pub fn export_name( &self, member: &str ) -> String { format!( "{}.{}", self.name, member )}

	/// Whether the type exports the lifecycle member `member`.
	pub fn has_lifecycle( &self, member: &str ) -> bool { self.lifecycle.iter().any(| name | name == member )}

	/// Every `( hook, export )` pair this type handles, in discovery order.
	pub fn handlers( &self ) -> impl Iterator<Item = ( &str, String )> + '_ {
		self.hooks.iter()
			.map(| hook | ( hook.as_str(), self.export_name( hook )))
			.chain( self.hook_methods.iter().map(| method | ( method.hook.as_str(), method.export.clone() )))
	}

}

/// Whether `name` follows the hook naming convention (`On` + uppercase letter).
pub fn looks_like_hook( name: &str ) -> bool {
	name.strip_prefix( "On" )
		.and_then(| rest | rest.chars().next() )
		.is_some_and( char::is_uppercase )
}

/// Classifies the exports of `module` into per-type metadata.
///
/// Types are returned in the order their first export appears.
pub fn discover( module: &Module, hooks: &HashMap<String, HookDescriptor> ) -> Vec<TypeMetadata> {

	let mut types: Vec<TypeMetadata> = Vec::new();

	for export in module.exports() {
		let Some(( type_name, member )) = export.name().split_once( '.' ) else { continue };
		if type_name.is_empty() || member.is_empty() { continue }

		let index = match types.iter().position(| ty | ty.name == type_name ) {
			Some( index ) => index,
			None => { types.push( TypeMetadata::new( type_name )); types.len() - 1 }
		};
		let metadata = &mut types[index];

		match export.ty() {
			ExternType::Global( global ) => {
				let Some( plugin ) = member.strip_prefix( '@' ) else { continue };
				if global.mutability() == Mutability::Var && matches!( global.content(), ValType::I32 ) {
					metadata.plugin_references.push( PluginReference {
						plugin: plugin.to_string(),
						export: export.name().to_string(),
					});
				} else {
					tracing::warn!( export = export.name(), "Plugin reference fields must be mutable i32 globals" );
				}
			}
			ExternType::Func( func ) => {
				if let Some(( _, hook )) = member.split_once( '#' ) {
					match hooks.get( hook ) {
						Some( descriptor ) if descriptor.accepts( &func ) => metadata.hook_methods.push( HookMethod {
							hook: hook.to_string(),
							export: export.name().to_string(),
						}),
						_ => push_unique( &mut metadata.unsupported_hooks, hook ),
					}
				} else if member == INIT || member == UNLOAD {
					push_unique( &mut metadata.lifecycle, member );
				} else if let Some( descriptor ) = hooks.get( member ) {
					match descriptor.accepts( &func ) {
						true => push_unique( &mut metadata.hooks, member ),
						false => push_unique( &mut metadata.unsupported_hooks, member ),
					}
				} else if looks_like_hook( member ) {
					push_unique( &mut metadata.unsupported_hooks, member );
				}
			}
			_ => {}
		}
	}

	types

}

fn push_unique( values: &mut Vec<String>, value: &str ) {
	if !values.iter().any(| existing | existing == value ) { values.push( value.to_string() ) }
}

#[cfg( test )]
mod tests {
	use super::* ;
	use crate::{ HookCategory, InterceptionTarget, ParamKind };

	fn catalog() -> HashMap<String, HookDescriptor> {
		let target = InterceptionTarget::new( "Server", "Tick" );
		HashMap::from([
			( "OnTick".to_string(), HookDescriptor::new( "OnTick", HookCategory::Server, target.clone() )),
			( "OnChat".to_string(), HookDescriptor::new( "OnChat", HookCategory::Player, target )
				.with_parameter( "player", ParamKind::I32 )
				.returning( ParamKind::I32 )),
		])
	}

	#[test]
	fn classifies_members() {
		let engine = wasmtime::Engine::default();
		let module = Module::new( &engine, r#"(module
			(func (export "Greeter.OnTick"))
			(func (export "Greeter.OnChat") (param i64))
			(func (export "Greeter.OnExplode"))
			(func (export "Greeter.handle_chat#OnChat") (param i32) (result i32) i32.const 1)
			(func (export "Greeter.Init"))
			(func (export "helper"))
			(global (export "Greeter.@Economy") (mut i32) (i32.const 0))
			(func (export "Other.OnTick"))
		)"# ).expect( "valid module" );

		let types = discover( &module, &catalog() );
		assert_eq!( types.len(), 2 );

		let greeter = &types[0];
		assert_eq!( greeter.name(), "Greeter" );
		assert_eq!( greeter.hooks(), [ "OnTick" ]);
		assert_eq!( greeter.unsupported_hooks(), [ "OnChat", "OnExplode" ]);
		assert_eq!( greeter.hook_methods()[0].export(), "Greeter.handle_chat#OnChat" );
		assert_eq!( greeter.plugin_references()[0].plugin(), "Economy" );
		assert!( greeter.has_lifecycle( INIT ));
		assert_eq!( types[1].hooks(), [ "OnTick" ]);
	}

	#[test]
	fn hook_naming_convention() {
		assert!( looks_like_hook( "OnPlayerJoin" ));
		assert!( !looks_like_hook( "Online" ));
		assert!( !looks_like_hook( "On" ));
	}
}
