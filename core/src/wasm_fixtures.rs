//! A minimal, real WASM module used wherever this workspace needs a
//! hypothesis that the Sandbox Interpreter can actually compile and run --
//! `LLM_MODE=mock`'s proposal and the sandbox/runner/solver test suites.
//!
//! Nothing in this workspace cross-compiles a guest crate through
//! `extism-pdk` to `wasm32` (there is no build step here at all), so the
//! module is authored directly in WAT against Extism's own low-level guest
//! ABI (`extism:host/env`: `extism_input_length`, `extism_input_load_u8`,
//! `extism_alloc`, `extism_store_u8`, `extism_output_set`) -- the same
//! import surface `extism-pdk`'s `#[plugin_fn]` macro expands to. It reads
//! the raw input bytes byte-for-byte and writes them back as the output,
//! i.e. the "pass-through module" the test runner's own spec references.
const ECHO_MODULE_WAT: &str = r#"
(module
  (import "extism:host/env" "extism_input_length" (func $input_length (result i64)))
  (import "extism:host/env" "extism_input_load_u8" (func $input_load_u8 (param i64) (result i32)))
  (import "extism:host/env" "extism_alloc" (func $alloc (param i64) (result i64)))
  (import "extism:host/env" "extism_store_u8" (func $store_u8 (param i64 i32)))
  (import "extism:host/env" "extism_output_set" (func $output_set (param i64 i64)))

  (func (export "solve") (result i32)
    (local $len i64)
    (local $ptr i64)
    (local $i i64)
    (local.set $len (call $input_length))
    (local.set $ptr (call $alloc (local.get $len)))
    (block $done
      (loop $copy
        (br_if $done (i64.ge_u (local.get $i) (local.get $len)))
        (call $store_u8
          (i64.add (local.get $ptr) (local.get $i))
          (call $input_load_u8 (local.get $i)))
        (local.set $i (i64.add (local.get $i) (i64.const 1)))
        (br $copy)))
    (call $output_set (local.get $ptr) (local.get $len))
    (i32.const 0)))
"#;

/// Compile the embedded echo-module WAT into WASM bytes. The source is a
/// fixed constant; a parse failure here would mean the fixture itself is
/// broken, not a condition a caller could recover from at runtime.
pub fn echo_module_bytes() -> Vec<u8> {
    wat::parse_str(ECHO_MODULE_WAT).expect("embedded echo module WAT is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_module_parses_to_a_non_empty_wasm_binary() {
        let bytes = echo_module_bytes();
        assert!(bytes.starts_with(b"\0asm"));
        assert!(bytes.len() > 8);
    }
}
