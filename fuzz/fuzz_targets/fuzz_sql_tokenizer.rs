//! Fuzz target for the SQL tokenizer: arbitrary byte strings should never
//! panic the lexer, only ever return a token stream or a `SyntaxError`.

#![no_main]

use libfuzzer_sys::fuzz_target;
use normlite_sql::tokenize;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else { return };
    let _ = tokenize(input);
});
