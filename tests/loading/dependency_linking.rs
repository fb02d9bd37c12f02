use wasm_hotload::{ DispatchError, LoadError, SourceUnit, Val };
use crate::test_runtime::{ runtime, settle };

const BANK: &str = r#";; Info: Bank, Tester, 1.0.0
(module
	(global $deposits (mut i32) (i32.const 0))
	(func (export "Bank.deposit") (param $amount i32) (result i32)
		(global.set $deposits (i32.add (global.get $deposits) (local.get $amount)))
		(global.get $deposits)))
"# ;

const SHOP: &str = r#";; Requires: Bank
;; Info: Shop, Tester, 1.0.0
(module
	(import "Bank" "deposit" (func $deposit (param i32) (result i32)))
	(func (export "Shop.sell") (param $price i32) (result i32)
		(call $deposit (local.get $price))))
"# ;

#[test]
fn calls_are_forwarded_to_the_dependency() {

	let runtime = runtime();
	runtime.load_batch( vec![ SourceUnit::from_source( "Shop", SHOP ), SourceUnit::from_source( "Bank", BANK )]);
	settle( &runtime );
	assert_ready!( runtime, "Bank", "Shop" );

	assert!( matches!( runtime.call( "Shop", "sell", &[ Val::I32( 5 )]), Ok( Some( Val::I32( 5 )))));
	assert!( matches!( runtime.call( "Shop", "sell", &[ Val::I32( 7 )]), Ok( Some( Val::I32( 12 )))));

	// State lives in the dependency's own store
	assert!( matches!( runtime.call( "Bank", "deposit", &[ Val::I32( 1 )]), Ok( Some( Val::I32( 13 )))));

}

#[test]
fn unloaded_dependency_fails_forwarded_calls() {

	let runtime = runtime();
	runtime.load_batch( vec![ SourceUnit::from_source( "Bank", BANK ), SourceUnit::from_source( "Shop", SHOP )]);
	settle( &runtime );
	assert!( runtime.unload( "Bank" ));

	match runtime.call( "Shop", "sell", &[ Val::I32( 5 )]) {
		Err( DispatchError::RuntimeException( err )) => assert!( matches!(
			err.downcast_ref::<DispatchError>(),
			Some( DispatchError::DependencyUnloaded( plugin )) if plugin == "Bank",
		)),
		other => panic!( "Expected a runtime exception, found: {:?}", other ),
	}

}

#[test]
fn reloaded_dependency_serves_forwarded_calls() {

	let runtime = runtime();
	runtime.load_batch( vec![ SourceUnit::from_source( "Bank", BANK ), SourceUnit::from_source( "Shop", SHOP )]);
	settle( &runtime );
	assert!( matches!( runtime.call( "Shop", "sell", &[ Val::I32( 5 )]), Ok( Some( Val::I32( 5 )))));

	let old = runtime.modules().find( "Bank" ).expect( "Bank is not loaded" );
	assert!( runtime.reload( "Bank" ).is_some() );
	settle( &runtime );
	assert_ready!( runtime, "Bank" );
	assert!( !std::sync::Arc::ptr_eq( &old, &runtime.modules().find( "Bank" ).expect( "Bank is not loaded" )));

	// The fresh instance starts from an empty total
	assert!( matches!( runtime.call( "Shop", "sell", &[ Val::I32( 5 )]), Ok( Some( Val::I32( 5 )))));

}

#[test]
fn importing_a_missing_export_is_a_compile_error() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Bank", BANK ));
	settle( &runtime );

	runtime.load( SourceUnit::from_source( "Thief", r#";; Requires: Bank
;; Info: Thief, Tester, 1.0.0
(module
	(import "Bank" "withdraw" (func (param i32) (result i32))))
"# ));
	settle( &runtime );

	let report = runtime.status( "Thief" ).expect( "Thief has no status" );
	let Some( LoadError::Compile( diagnostics )) = report.error() else { panic!( "Expected a compile error, found: {:#?}", report ) };
	assert!( diagnostics.first().message().contains( "Bank.withdraw" ));
	assert_eq!( diagnostics.first().line(), 4 );

}

#[test]
fn mismatched_signature_is_a_compile_error() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Bank", BANK ));
	settle( &runtime );

	runtime.load( SourceUnit::from_source( "Forger", r#";; Requires: Bank
;; Info: Forger, Tester, 1.0.0
(module
	(import "Bank" "deposit" (func (param i64) (result i32))))
"# ));
	settle( &runtime );

	let report = runtime.status( "Forger" ).expect( "Forger has no status" );
	assert!( matches!( report.error(), Some( LoadError::Compile( _ ))));
	assert!( runtime.modules().find( "Forger" ).is_none() );

}
