use wasm_hotload::{ LoadError, Phase, SourceUnit };
use crate::test_runtime::{ runtime, settle };

#[test]
fn trapping_init_fails_unit_but_keeps_artifact() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Broken", r#";; Info: Broken, Tester, 1.0.0
(module
	(func (export "Broken.Init") unreachable)
	(func (export "Broken.OnTick")))
"# ));
	settle( &runtime );

	let report = runtime.status( "Broken" ).expect( "Broken has no status" );
	assert_eq!( report.phase(), Phase::Failed );
	assert!( matches!( report.error(), Some( LoadError::Instantiation { plugin, .. }) if plugin == "Broken" ));

	assert!( runtime.cache().get( "Broken" ).is_some() );
	assert!( runtime.modules().find( "Broken" ).is_none() );
	assert_eq!( runtime.hooks().subscribers( "OnTick" ), 0 );

}

#[test]
fn failing_type_rolls_back_its_siblings() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Pair", r#";; Info: Good, Tester, 1.0.0
;; Info: Bad, Tester, 1.0.0
(module
	(func (export "Good.OnTick"))
	(func (export "Bad.Init") unreachable))
"# ));
	settle( &runtime );

	assert_eq!( runtime.status( "Pair" ).map(| report | report.phase() ), Some( Phase::Failed ));
	assert!( runtime.modules().is_empty() );
	assert!( !runtime.hooks().is_installed( "OnTick" ));

}

#[test]
fn types_without_info_are_not_instantiated() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Mixed", r#";; Info: Listed, Tester, 1.0.0
(module
	(func (export "Listed.OnTick"))
	(func (export "Unlisted.OnTick"))
	(func (export "helper")))
"# ));
	settle( &runtime );

	let report = runtime.status( "Mixed" ).expect( "Mixed has no status" );
	assert_eq!( report.plugins(), [ "Listed" ]);
	assert_eq!( runtime.hooks().subscribers( "OnTick" ), 1 );

}
