use std::ffi::OsString;

fn main() {
    let mut args: Vec<OsString> = std::env::args_os().collect();
    if args.is_empty() {
        args.push(OsString::from("reqlognetwork"));
    }
    args.insert(1, OsString::from("network"));
    if let Err(err) = reqlogstats::cli::run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
