#![no_main]

use std::io::Write;

use libfuzzer_sys::fuzz_target;
use tabula_formats::{CsvFormat, FileFormat};

fuzz_target!(|data: &[u8]| {
    if data.len() > 64 * 1024 {
        return;
    }
    let Ok(mut file) = tempfile::NamedTempFile::new() else {
        return;
    };
    if file.write_all(data).is_err() {
        return;
    }

    // Inference and reading may fail on malformed input but must not panic
    let format = CsvFormat::default().with_schema_infer_max_records(16);
    let files = vec![file.path().to_path_buf()];
    if let Ok(schema) = format.infer_schema(&files) {
        let _ = format.read(file.path(), &schema, &[], 8);
    }
});
