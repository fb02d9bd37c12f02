use wasm_hotload::{ LoadError, Phase, Severity, SourceUnit, Val };
use crate::test_runtime::{ runtime, settle, versioned };

#[test]
fn syntax_error_reports_location() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Typo", ";; Info: Typo, Tester, 1.0.0\n(module\n  (func (export \"Typo.OnTick\")\n    i32.konst 1))" ));
	settle( &runtime );

	let report = runtime.status( "Typo" ).expect( "Typo has no status" );
	assert_eq!( report.phase(), Phase::Failed );
	let Some( LoadError::Compile( diagnostics )) = report.error() else { panic!( "Expected a compile error, found: {:#?}", report ) };
	let diagnostic = diagnostics.first();
	assert_eq!( diagnostic.severity(), Severity::Error );
	assert_eq!( diagnostic.file(), "Typo.wat" );
	assert_eq!( diagnostic.line(), 4 );
	assert_eq!( diagnostic.column(), 5 );
	assert!( runtime.cache().get( "Typo" ).is_none() );

}

#[test]
fn empty_sources_and_modules_fail() {

	let runtime = runtime();
	runtime.load_batch( vec![
		SourceUnit::from_source( "Blank", "  \n" ),
		SourceUnit::from_source( "Hollow", ";; Info: Hollow, Tester, 1.0.0\n(module)" ),
	]);
	settle( &runtime );

	assert!( matches!( runtime.status( "Blank" ).and_then(| report | report.error().map( ToString::to_string )), Some( message ) if message.contains( "empty source" )));
	assert!( matches!( runtime.status( "Hollow" ).expect( "Hollow has no status" ).error(), Some( LoadError::EmptyModule )));

}

#[test]
fn failed_reload_keeps_previous_plugin() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Stable", versioned( "Stable", 1 )));
	settle( &runtime );

	runtime.load( SourceUnit::from_source( "Stable", ";; Info: Stable, Tester, 2.0.0\n(module (func (export \"Stable.version\") (result i32) i64.const 2))" ));
	settle( &runtime );

	assert_eq!( runtime.status( "Stable" ).map(| report | report.phase() ), Some( Phase::Failed ));
	assert!( matches!( runtime.call( "Stable", "version", &[] ), Ok( Some( Val::I32( 1 )))));

}

#[test]
fn unknown_import_module_is_a_compile_error() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Importer", ";; Info: Importer, Tester, 1.0.0\n(module\n\t(import \"nowhere\" \"thing\" (func)))" ));
	settle( &runtime );

	let report = runtime.status( "Importer" ).expect( "Importer has no status" );
	let Some( LoadError::Compile( diagnostics )) = report.error() else { panic!( "Expected a compile error, found: {:#?}", report ) };
	assert!( diagnostics.first().message().contains( "nowhere" ));
	assert_eq!(( diagnostics.first().line(), diagnostics.first().column() ), ( 3, 10 ));

}

#[test]
fn unresolved_reference_is_reported_with_the_error() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Sloppy", ";; Reference: abacus\n;; Info: Sloppy, Tester, 1.0.0\n(module\n  (func (export \"Sloppy.OnTick\") oops))" ));
	settle( &runtime );

	let report = runtime.status( "Sloppy" ).expect( "Sloppy has no status" );
	assert_eq!( report.phase(), Phase::Failed );
	let warnings = report.diagnostics().iter().filter(| diagnostic | diagnostic.severity() == Severity::Warning ).collect::<Vec<_>>();
	assert_eq!( warnings.len(), 1 );
	assert!( warnings[0].message().contains( "abacus" ));
	assert_eq!( warnings[0].line(), 1 );
	assert!( report.diagnostics().iter().any(| diagnostic | diagnostic.severity() == Severity::Error && diagnostic.line() == 4 ));

}

#[test]
fn validation_errors_are_reported_at_the_start_of_the_file() {

	let runtime = runtime();
	runtime.load( SourceUnit::from_source( "Mistyped", ";; Info: Mistyped, Tester, 1.0.0\n(module\n  (func (export \"Mistyped.version\") (result i32) i64.const 2))" ));
	settle( &runtime );

	let report = runtime.status( "Mistyped" ).expect( "Mistyped has no status" );
	let Some( LoadError::Compile( diagnostics )) = report.error() else { panic!( "Expected a compile error, found: {:#?}", report ) };
	let diagnostic = diagnostics.first();
	assert_eq!(( diagnostic.line(), diagnostic.column() ), ( 1, 1 ));
	assert!( diagnostic.message().contains( "type mismatch" ), "{}", diagnostic.message() );

}
