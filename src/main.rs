fn main() {
    if let Err(err) = retail_sales_import::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
