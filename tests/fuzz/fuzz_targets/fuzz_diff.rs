#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Diff splitting and hunk walking must not panic on any input.
    if let Ok(s) = std::str::from_utf8(data) {
        for file in prcov::diff::split_unified_diff(s) {
            if let Some(patch) = file.patch.as_deref() {
                let _ = prcov::diff::changed_lines(patch);
            }
        }
    }
});
