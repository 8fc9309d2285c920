#![no_main]

use libfuzzer_sys::fuzz_target;
use types_installer_lsp::parsers::npm::scan_dependencies;

fuzz_target!(|data: &[u8]| {
    if let Ok(content) = std::str::from_utf8(data) {
        let entries = scan_dependencies(content);
        let lines: Vec<&str> = content.split('\n').collect();

        for entry in &entries {
            assert!(
                (entry.line as usize) < lines.len(),
                "entry.line out of range"
            );

            let line = lines[entry.line as usize];
            let line_len = line.encode_utf16().count() as u32;

            assert!(
                entry.name_start <= entry.name_end,
                "name_start must be <= name_end"
            );
            assert!(
                entry.name_end <= line_len,
                "name_end must be within line bounds"
            );
        }
    }
});
