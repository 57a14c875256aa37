use std::path::PathBuf;

use feedsync::RunOptions;

const HELP: &str = "feedsync - Reconcile and page a ledger-backed feed from the terminal.

  --version, -V          Show version and exit
  --help,    -h          Show this help message
  --config <path>        Read settings from <path> instead of the default config file
  --pages <n>            Number of pages to load before printing
  --json                 Print the feed as JSON
  --demo-submit          Play a submission through pending and confirmed";

enum Cli {
    Exit,
    Run(RunOptions),
}

fn main() {
    let options = match parse_args(std::env::args().skip(1)) {
        Ok(Cli::Exit) => return,
        Ok(Cli::Run(options)) => options,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = feedsync::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Cli, String> {
    let mut options = RunOptions::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("feedsync {}", feedsync::VERSION);
                return Ok(Cli::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Cli::Exit);
            }
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                options.config_file = Some(PathBuf::from(path));
            }
            "--pages" => {
                let value = args.next().ok_or("--pages needs a number")?;
                let pages = value
                    .parse::<usize>()
                    .map_err(|_| format!("invalid page count: {value}"))?;
                options.pages = Some(pages);
            }
            "--json" => options.json = true,
            "--demo-submit" => options.demo_submission = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(Cli::Run(options))
}
