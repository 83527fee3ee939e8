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
