#![no_main]

use libfuzzer_sys::fuzz_target;
use tabula_core::query::parse_sql;

fuzz_target!(|data: &[u8]| {
    // Convert bytes to string (ignore invalid UTF-8)
    if let Ok(sql) = std::str::from_utf8(data) {
        // Limit query length to prevent timeout
        if sql.len() > 10_000 {
            return;
        }

        // Parsing must return an error, never panic
        let _ = parse_sql(sql);
    }
});
