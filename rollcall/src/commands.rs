use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("rollcall")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("rollcall")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress headers and non-essential output").required(false))
        .arg(arg!(-v --"verbose" "Log request and retry details to stderr").required(false))
        .arg(
            arg!(--"db" <PATH>)
                .required(false)
                .global(true)
                .help("Directory holding the rollcall database and exports")
                .default_value("~/.config/rollcall/"),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the rollcall database on your filesystem")
                .arg(
                    arg!(-f --"force")
                        .help("Discards any existing database at the configured location")
                        .required(false),
                ),
        )
        .subcommand(
            command!("load")
                .about(
                    "Loads a profile list (.json, .csv or one id per line) and resets progress",
                )
                .arg(
                    arg!(<FILE>)
                        .required(true)
                        .help("Path to the profile list")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("config")
                .about("Shows or updates the API configuration")
                .arg(
                    arg!(-p --"preset" <DOMAIN>)
                        .required(false)
                        .help("Start from a built-in platform preset (see `rollcall presets`)"),
                )
                .arg(
                    arg!(-t --"api-type" <TYPE>)
                        .required(false)
                        .help("API style of the platform")
                        .value_parser(["REST", "GraphQL", "CUSTOM"])
                        .ignore_case(true),
                )
                .arg(
                    arg!(-e --"endpoint" <URL>)
                        .required(false)
                        .help("Profile endpoint URL")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-d --"target-domain" <DOMAIN>)
                        .required(false)
                        .help("Domain the profiles belong to")
                        .conflicts_with("preset"),
                )
                .arg(arg!(-m --"method" <METHOD>).required(false).help("HTTP method for CUSTOM APIs"))
                .arg(arg!(--"event-path" <PATH>).required(false).help("REST event path"))
                .arg(arg!(--"operation-name" <NAME>).required(false).help("GraphQL operation name"))
                .arg(arg!(--"sha256-hash" <HASH>).required(false).help("GraphQL persisted query hash"))
                .arg(arg!(--"event-id" <ID>).required(false).help("GraphQL event id"))
                .arg(arg!(--"client-version" <VERSION>).required(false).help("Client version header value"))
                .arg(arg!(--"auth-token" <TOKEN>).required(false).help("Authorization header value"))
                .arg(arg!(--"cookies" <COOKIES>).required(false).help("Session cookies to send"))
                .arg(
                    arg!(--"dynamic-params" <JSON>)
                        .required(false)
                        .help("JSON object merged into the GraphQL variables"),
                )
                .arg(
                    arg!(-H --"headers" <JSON>)
                        .required(false)
                        .help("JSON object of extra request headers"),
                ),
        )
        .subcommand(
            command!("settings").about("Updates run settings").arg(
                arg!(--"delay" <MS>)
                    .required(true)
                    .help("Delay between profiles in milliseconds (0 restores the default)")
                    .value_parser(clap::value_parser!(u64)),
            ),
        )
        .subcommand(
            command!("run")
                .about("Starts or resumes scraping the loaded profiles. Ctrl-C pauses.")
                .arg(
                    arg!(-o --"output" <DIR>)
                        .required(false)
                        .help("Directory for the results export (default: <db>/exports)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Request timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                ),
        )
        .subcommand(command!("status").about("Shows progress of the current profile list"))
        .subcommand(
            command!("export").about("Writes all results to a JSON file").arg(
                arg!(-o --"output" <DIR>)
                    .required(false)
                    .help("Directory for the export (default: <db>/exports)")
                    .value_parser(clap::value_parser!(std::path::PathBuf)),
            ),
        )
        .subcommand(command!("presets").about("Lists the built-in platform presets"))
}
