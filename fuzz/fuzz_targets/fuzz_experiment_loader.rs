#![no_main]

use std::path::Path;

use libfuzzer_sys::fuzz_target;
use lesim::config::loader::ConfigLoader;

fuzz_target!(|data: &[u8]| {
    if let Ok(yaml_str) = std::str::from_utf8(data) {
        let loader = ConfigLoader::with_defaults();

        // Only panics matter; script_file lookups resolve against a missing dir
        let _ = loader.load_str(yaml_str, Path::new("/nonexistent/fuzz.yaml"));
    }
});
