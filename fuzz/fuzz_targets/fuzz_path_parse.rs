#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary UTF-8 into the path compiler. A program that compiles must
// keep its tokens through a Display round trip.
fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(program) = jsonpath_engine::compile(s) {
        let again = jsonpath_engine::compile(&program.to_string())
            .expect("canonical spelling must compile");
        assert_eq!(again.tokens(), program.tokens(), "path={s:?}");
    }
});
