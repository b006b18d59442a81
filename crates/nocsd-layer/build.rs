//! Build script for nocsd-layer
//!
//! Compiles the variadic half of the `g_object_get` override. Walking a C
//! argument list needs the C compiler's `va_list` handling.

fn main() {
    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os == "linux" {
        println!("cargo:rerun-if-changed=src/c/variadic_trampoline.c");

        cc::Build::new()
            .file("src/c/variadic_trampoline.c")
            .opt_level(3)
            .compile("variadic_trampoline");
    }
}
