//! Fuzz target for the SQL parser: arbitrary text should never panic the
//! parser, and every variant of statement-shaped prefixes should still
//! parse or fail cleanly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use normlite_sql::Parser;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else { return };
    let _ = Parser::parse_statement(input);

    for prefix in ["CREATE TABLE ", "INSERT INTO ", "SELECT ", "DROP TABLE "] {
        let modified = format!("{prefix}{input}");
        let _ = Parser::parse_statement(&modified);
    }
});
