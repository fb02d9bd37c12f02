//! The dependency gate.
//!
//! Ordering inside a batch is two-tier: units without `Requires:` directives
//! compile freely, units with them wait until every dependency-free unit of
//! the same batch is finished and then look their dependencies up among the
//! ready plugins. A dependency that isn't ready by then fails the unit, there
//! is no retry and no ordering between dependents.

use std::sync::Arc ;
use nonempty_collections::NEVec ;

use crate::{ ModuleRegistry, Phase, PluginInstance };



/// Whether a gated unit may go on, given the `( requires, phase )` of every
/// unit in its batch.
pub fn can_proceed<'a>( batch: impl IntoIterator<Item = ( &'a [String], Phase )> ) -> bool {
	batch.into_iter()
		.filter(|( requires, _ )| requires.is_empty() )
		.all(|( _, phase )| phase.is_terminal() )
}

/// Resolves `requires` to ready plugin instances.
///
/// # Errors
/// Every name without a ready plugin.
pub fn resolve( requires: &[String], registry: &ModuleRegistry ) -> Result<Vec<Arc<PluginInstance>>, NEVec<String>> {
	let mut found = Vec::with_capacity( requires.len() );
	let mut missing = Vec::new();
	for name in requires {
		match registry.find( name ) {
			Some( plugin ) => found.push( plugin ),
			None => missing.push( name.clone() ),
		}
	}
	match NEVec::try_from_vec( missing ) {
		Some( missing ) => Err( missing ),
		None => Ok( found ),
	}
}

#[cfg( test )]
mod tests {
	use super::* ;

	#[test]
	fn waits_for_dependency_free_units() {
		let requires = vec![ "A".to_string() ];
		let batch = [( &[][..], Phase::Compiling ), ( requires.as_slice(), Phase::Gated )];
		assert!( !can_proceed( batch ));
	}

	#[test]
	fn ignores_other_dependents() {
		let requires = vec![ "A".to_string() ];
		let batch = [( &[][..], Phase::Failed ), ( requires.as_slice(), Phase::Gated ), ( requires.as_slice(), Phase::Compiling )];
		assert!( can_proceed( batch ));
	}

	#[test]
	fn reports_every_missing_name() {
		let registry = ModuleRegistry::new();
		let missing = resolve( &[ "A".to_string(), "B".to_string() ], &registry ).unwrap_err();
		assert_eq!( missing.iter().into_iter().map( String::as_str ).collect::<Vec<_>>(), [ "A", "B" ]);
	}
}
