use std::io::Write ;
use std::path::PathBuf ;
use std::time::Duration ;
use wasm_hotload::{ ConfigError, RuntimeConfig };

#[test]
fn defaults_apply_to_missing_keys() {

	let config = RuntimeConfig::from_toml_str( r#"
plugin_directory = "plugins"
strict_hook_validation = true
ignored = [ "Legacy" ]
"# ).expect( "Failed to parse config" );

	assert_eq!( config.plugin_directory, Some( PathBuf::from( "plugins" )));
	assert!( config.strict_hook_validation );
	assert!( config.ignored.contains( "Legacy" ));
	assert_eq!( config.source_extension, "wat" );
	assert!( config.hook_validation );
	assert!( config.hook_time_tracker );
	assert_eq!( config.gate_poll_interval(), Duration::from_millis( 100 ));
	assert_eq!( RuntimeConfig::from_toml_str( "" ).expect( "Failed to parse config" ), RuntimeConfig::default() );

}

#[test]
fn invalid_config_is_a_parse_error() {
	assert!( matches!( RuntimeConfig::from_toml_str( "gate_poll_interval_ms = \"soon\"" ), Err( ConfigError::Parse( _ ))));
}

#[test]
fn loads_from_file() {

	let mut file = tempfile::NamedTempFile::new().expect( "Failed to create config file" );
	writeln!( file, "gate_poll_interval_ms = 25\nsource_extension = \"plugin\"" ).expect( "Failed to write config" );

	let config = RuntimeConfig::load( file.path() ).expect( "Failed to load config" );
	assert_eq!( config.gate_poll_interval(), Duration::from_millis( 25 ));
	assert_eq!( config.source_extension, "plugin" );

	assert!( matches!( RuntimeConfig::load( "/definitely/not/here.toml" ), Err( ConfigError::Io( _ ))));

}
