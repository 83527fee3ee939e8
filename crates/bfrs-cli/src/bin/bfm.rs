//! Identical to `bf`, but with `mimalloc` installed as the global
//! allocator, swapping allocators by shipping a second `main` rather
//! than a runtime flag.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    let opts = match bfrs_cli::parse_args() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("bf: {}", e);
            std::process::exit(2);
        }
    };

    std::process::exit(bfrs_cli::run(&opts));
}
