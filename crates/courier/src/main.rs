//! Courier - fetch a URL and print or save its body
//!
//! Usage: courier [OPTIONS] <url>

use std::env;
use std::process::ExitCode;

use url::Url;

use courier_net::{HttpClient, Response};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What to do with the response body
#[derive(Debug, Default)]
struct Options {
    url: Option<String>,
    output: Option<String>,
    json: bool,
    headers: bool,
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let args: Vec<String> = env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("courier");

    let mut options = Options::default();
    let mut rest = args.iter().skip(1);

    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--help" | "-h" => {
                print_usage(program);
                return ExitCode::SUCCESS;
            }
            "--version" | "-V" => {
                println!("Courier {}", VERSION);
                return ExitCode::SUCCESS;
            }
            "--output" | "-o" => match rest.next() {
                Some(path) => options.output = Some(path.clone()),
                None => {
                    eprintln!("Usage: {} --output <PATH> <URL>", program);
                    return ExitCode::FAILURE;
                }
            },
            "--json" => options.json = true,
            "--headers" => options.headers = true,
            url_str => options.url = Some(url_str.to_string()),
        }
    }

    let Some(url_str) = options.url.clone() else {
        print_usage(program);
        return ExitCode::FAILURE;
    };

    if let Err(e) = fetch(&url_str, &options) {
        eprintln!("Error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_usage(program: &str) {
    println!(
        r#"Courier {} - fetch a URL

USAGE:
    {} [OPTIONS] <URL>

OPTIONS:
    -h, --help            Print this help message
    -V, --version         Print version information
    -o, --output <PATH>   Save the body to a file
    --json                Pretty-print the body as JSON
    --headers             Print response headers

EXAMPLES:
    {} https://example.com
    {} --json https://httpbin.org/json
    {} --output page.html https://example.com
"#,
        VERSION, program, program, program, program
    );
}

/// Fetch a URL and handle its body according to `options`
fn fetch(url_str: &str, options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let url = if url_str.contains("://") {
        Url::parse(url_str)?
    } else {
        Url::parse(&format!("https://{}", url_str))?
    };

    let client = HttpClient::new()?;
    let mut response = client.get(&url);

    if let Some(err) = response.error() {
        return Err(format!("Request to {} failed: {}", url, err).into());
    }

    println!("HTTP {}", response.status());
    if options.headers {
        print_headers(&response);
    }

    if !response.is_success() {
        return Err(format!("HTTP error: {}", response.status()).into());
    }

    if let Some(path) = &options.output {
        let written = response.download_to_file(path)?;
        println!("Saved {} bytes to {}", written, path);
    } else if options.json {
        let value: serde_json::Value = response.json()?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", String::from_utf8_lossy(response.try_bytes()?));
    }

    Ok(())
}

fn print_headers(response: &Response) {
    for (name, value) in response.headers() {
        println!("{}: {}", name, value.to_str().unwrap_or("<binary>"));
    }
    println!();
}
