fn main() {
    if let Err(err) = sheet_crud::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
