use clap::error::ErrorKind;
use clap::Parser;
use hwi_app::{Error, ErrorResponse};
use hwi_cli::{inner_main, Cli};

fn main() {
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => fail(ErrorResponse::from(&Error::InvalidArgument(e.to_string()))),
    };

    match inner_main(args) {
        Ok(value) => println!("{value:#}"),
        Err(e) => {
            let response = match e.downcast_ref::<Error>() {
                Some(e) => ErrorResponse::from(e),
                None => ErrorResponse::unknown(format!("{e:#}")),
            };
            fail(response)
        }
    }
}

fn fail(response: ErrorResponse) -> ! {
    match serde_json::to_string(&response) {
        Ok(s) => eprintln!("{s}"),
        Err(_) => eprintln!("{}", response.error),
    }
    std::process::exit(1)
}
