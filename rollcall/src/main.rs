use colored::Colorize;
use commands::command_argument_builder;
use rollcall::handlers::{
    data_dir_from, handle_config, handle_export, handle_init, handle_load, handle_presets, handle_run,
    handle_settings, handle_status, init_tracing,
};

mod commands;

#[tokio::main]
async fn main() {
    let mut cmd = command_argument_builder();
    let chosen_command = cmd.clone().get_matches();
    let quiet = chosen_command.get_flag("quiet");
    init_tracing(chosen_command.get_flag("verbose"));

    let result = match chosen_command.subcommand() {
        None => cmd.print_help().map_err(anyhow::Error::from),
        Some(("init", primary_command)) => {
            handle_init(primary_command, &data_dir_from(primary_command), quiet)
        }
        Some(("load", primary_command)) => handle_load(primary_command, &data_dir_from(primary_command)),
        Some(("config", primary_command)) => {
            handle_config(primary_command, &data_dir_from(primary_command), quiet)
        }
        Some(("settings", primary_command)) => {
            handle_settings(primary_command, &data_dir_from(primary_command))
        }
        Some(("run", primary_command)) => {
            handle_run(primary_command, &data_dir_from(primary_command), quiet).await
        }
        Some(("status", primary_command)) => handle_status(&data_dir_from(primary_command), quiet),
        Some(("export", primary_command)) => {
            handle_export(primary_command, &data_dir_from(primary_command))
        }
        Some(("presets", _)) => {
            handle_presets();
            Ok(())
        }
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "✗".red().bold(), e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
