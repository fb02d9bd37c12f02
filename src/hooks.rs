//! Hook descriptor types.
//!
//! A [`HookDescriptor`] is the static description of one interception point in
//! the host: its name, where it intercepts, the shape of its arguments and
//! whether it stays installed without subscribers. Descriptors are registered
//! once at startup and never change afterwards.

use serde::Serialize ;
use wasmtime::{ FuncType, Val, ValType };



/// Value kinds that can cross a hook boundary.
#[derive( Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize )]
#[serde( rename_all = "lowercase" )]
pub enum ParamKind { I32, I64, F32, F64 }

impl ParamKind {

	/// Kind of a wasm value type; `None` for vectors and references.
	pub fn of_type( ty: &ValType ) -> Option<Self> {
		match ty {
			ValType::I32 => Some( Self::I32 ),
			ValType::I64 => Some( Self::I64 ),
			ValType::F32 => Some( Self::F32 ),
			ValType::F64 => Some( Self::F64 ),
			ValType::V128 | ValType::Ref( _ ) => None,
		}
	}

	/// Kind of a runtime value; `None` for vectors and references.
	pub fn of_val( val: &Val ) -> Option<Self> {
		match val {
			Val::I32( _ ) => Some( Self::I32 ),
			Val::I64( _ ) => Some( Self::I64 ),
			Val::F32( _ ) => Some( Self::F32 ),
			Val::F64( _ ) => Some( Self::F64 ),
			_ => None,
		}
	}

}

impl std::fmt::Display for ParamKind {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		match self {
			Self::I32 => write!( f, "i32" ),
			Self::I64 => write!( f, "i64" ),
			Self::F32 => write!( f, "f32" ),
			Self::F64 => write!( f, "f64" ),
		}
	}
}

/// Compares two function signatures by value kinds only.
pub(crate) fn same_signature( a: &FuncType, b: &FuncType ) -> bool {
	fn kinds( types: impl ExactSizeIterator<Item = ValType> ) -> Option<Vec<ParamKind>> {
		types.map(| ty | ParamKind::of_type( &ty )).collect()
	}
	match ( kinds( a.params() ), kinds( b.params() ), kinds( a.results() ), kinds( b.results() )) {
		( Some( a_params ), Some( b_params ), Some( a_results ), Some( b_results ))
			=> a_params == b_params && a_results == b_results,
		_ => false,
	}
}

/// Broad grouping of hooks, used for reporting.
#[derive( Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize )]
pub enum HookCategory {
	Server,
	Player,
	Entity,
	Command,
	Firework,
	Plugin,
	Custom,
}

impl std::fmt::Display for HookCategory {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result { write!( f, "{:?}", self )}
}

/// The host location a hook intercepts.
#[derive( Clone, Debug, Eq, PartialEq, Hash, Serialize )]
pub struct InterceptionTarget {
	type_name: String,
	method: String,
}

impl InterceptionTarget {
	pub fn new( type_name: impl Into<String>, method: impl Into<String> ) -> Self {
		Self { type_name: type_name.into(), method: method.into() }
	}
	#[inline] pub fn type_name( &self ) -> &str { &self.type_name }
	#[inline] pub fn method( &self ) -> &str { &self.method }
}

impl std::fmt::Display for InterceptionTarget {
	fn fmt( &self, f: &mut std::fmt::Formatter ) -> std::fmt::Result {
		write!( f, "{}::{}", self.type_name, self.method )
	}
}

/// A named argument of a hook.
#[derive( Clone, Debug, Eq, PartialEq, Serialize )]
pub struct HookParameter {
	name: String,
	kind: ParamKind,
}

impl HookParameter {
	#[inline] pub fn name( &self ) -> &str { &self.name }
	#[inline] pub fn kind( &self ) -> ParamKind { self.kind }
}

/// Static metadata describing one hook.
///
/// ```
/// use wasm_hotload::{ HookDescriptor, HookCategory, InterceptionTarget, ParamKind };
///
/// let descriptor = HookDescriptor::new(
/// 	"OnPlayerCommand",
/// 	HookCategory::Player,
/// 	InterceptionTarget::new( "Chat", "sayAs" ),
/// )
/// 	.with_parameter( "player", ParamKind::I64 )
/// 	.with_parameter( "command", ParamKind::I32 )
/// 	.returning( ParamKind::I32 )
/// 	.with_info( "Useful for intercepting players' commands before their handling." )
/// 	.always_installed();
///
/// assert!( descriptor.is_always_installed() );
/// assert_eq!( descriptor.parameters().len(), 2 );
/// ```
#[derive( Clone, Debug, Eq, PartialEq, Serialize )]
pub struct HookDescriptor {
	name: String,
	category: HookCategory,
	target: InterceptionTarget,
	parameters: Vec<HookParameter>,
	returns: Option<ParamKind>,
	info: Option<String>,
	always_installed: bool,
}

impl HookDescriptor {

	/// Creates a descriptor without parameters or result.
	pub fn new( name: impl Into<String>, category: HookCategory, target: InterceptionTarget ) -> Self {
		Self {
			name: name.into(),
			category,
			target,
			parameters: Vec::with_capacity( 0 ),
			returns: None,
			info: None,
			always_installed: false,
		}
	}

	/// Appends a parameter.
	pub fn with_parameter( mut self, name: impl Into<String>, kind: ParamKind ) -> Self {
		self.parameters.push( HookParameter { name: name.into(), kind });
		self
	}

	/// Declares the kind of value a handler may return to override the host.
	pub fn returning( mut self, kind: ParamKind ) -> Self {
		self.returns = Some( kind );
		self
	}

	/// Attaches a human readable description.
	pub fn with_info( mut self, info: impl Into<String> ) -> Self {
		self.info = Some( info.into() );
		self
	}

	/// Keeps the interception point installed even without subscribers.
	pub fn always_installed( mut self ) -> Self {
		self.always_installed = true ;
		self
	}

	#[inline] pub fn name( &self ) -> &str { &self.name }
	#[inline] pub fn category( &self ) -> HookCategory { self.category }
	#[inline] pub fn target( &self ) -> &InterceptionTarget { &self.target }
	#[inline] pub fn parameters( &self ) -> &[HookParameter] { &self.parameters }
	#[inline] pub fn returns( &self ) -> Option<ParamKind> { self.returns }
	#[inline] pub fn info( &self ) -> Option<&str> { self.info.as_deref() }
	#[inline] pub fn is_always_installed( &self ) -> bool { self.always_installed }

	/// Whether a plugin export with signature `ty` can handle this hook.
	///
	/// Parameters must match exactly. A handler may omit the result even when
	/// the hook declares one, but may not return anything the hook doesn't expect.
	pub fn accepts( &self, ty: &FuncType ) -> bool {
		let params = ty.params().map(| param | ParamKind::of_type( &param )).collect::<Vec<_>>();
		let expected = self.parameters.iter().map(| param | Some( param.kind )).collect::<Vec<_>>();
		if params != expected { return false }
		let results = ty.results().map(| result | ParamKind::of_type( &result )).collect::<Vec<_>>();
		match ( results.as_slice(), self.returns ) {
			( [], _ ) => true,
			( [ Some( kind )], Some( returns )) => *kind == returns,
			_ => false,
		}
	}

	/// Whether `args` fit the declared parameters.
	pub fn matches_args( &self, args: &[Val] ) -> bool {
		args.len() == self.parameters.len()
			&& args.iter().zip( &self.parameters ).all(|( arg, param )| ParamKind::of_val( arg ) == Some( param.kind ))
	}

}
