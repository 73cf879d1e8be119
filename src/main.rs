// src/main.rs
use pacproxy::{PacSession, SessionOptions};
use std::env;
use std::process::ExitCode;

const DEFAULT_URL: &str = "http://www.example.com/";

fn run(args: &[String]) -> pacproxy::Result<()> {
    let specifier = args.first().map(String::as_str).unwrap_or_default();
    let url = args.get(1).map(String::as_str).unwrap_or(DEFAULT_URL);
    let options = SessionOptions::from_env()?.with_authorities(args.iter().skip(2).cloned());
    let session = PacSession::open_with(specifier, options)?;

    println!("{}", session.find_proxy_for_url(url)?);
    for candidate in session.find_proxy(url)? {
        match candidate.uri() {
            Some(uri) => println!("{} {}", candidate.mode(), uri.redacted()),
            None => println!("{}", candidate.mode()),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        eprintln!("usage: pacproxy <pac-source> [url] [authority-uri...]");
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
