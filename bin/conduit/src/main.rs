fn main() {
    if let Err(err) = conduit::cli::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}
