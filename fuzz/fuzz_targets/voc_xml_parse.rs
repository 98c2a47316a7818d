//! Fuzz target for reading Pascal VOC annotations back from bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use vocprep::voc::from_voc_xml_slice;

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid excessive memory usage.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    if let Ok(annotation) = from_voc_xml_slice(data) {
        // Anything that parses must serialize and parse again.
        let _ = from_voc_xml_slice(annotation.to_xml_string().as_bytes());
    }
});
