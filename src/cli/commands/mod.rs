use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("reakiri")
        .about("Account recovery and session bootstrap")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("provider-url")
                .short('u')
                .long("provider-url")
                .help("Identity provider base URL, example: https://<project>.supabase.co")
                .env("REAKIRI_PROVIDER_URL")
                .required(true),
        )
        .arg(
            Arg::new("api-key")
                .short('k')
                .long("api-key")
                .help("Project API key sent with every provider request")
                .env("REAKIRI_API_KEY")
                .required(true),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("REAKIRI_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(
            Command::new("request")
                .about("Send a password recovery email")
                .arg(
                    Arg::new("email")
                        .short('e')
                        .long("email")
                        .help("Email address to send the recovery link to")
                        .env("REAKIRI_EMAIL")
                        .required(true),
                )
                .arg(
                    Arg::new("redirect-url")
                        .short('r')
                        .long("redirect-url")
                        .help("Reset page URL embedded in the recovery email")
                        .env("REAKIRI_REDIRECT_URL")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("reset")
                .about("Complete a recovery link and set a new password")
                .arg(
                    Arg::new("url")
                        .long("url")
                        .help("Recovery link from the email, with its query/fragment intact")
                        .required(true),
                )
                .arg(
                    Arg::new("password")
                        .long("password")
                        .help("New password; prefer passing it via REAKIRI_NEW_PASSWORD")
                        .env("REAKIRI_NEW_PASSWORD")
                        .hide_env_values(true)
                        .required(true),
                )
                .arg(
                    Arg::new("confirm")
                        .long("confirm")
                        .help("Confirmation; defaults to the password value")
                        .env("REAKIRI_CONFIRM_PASSWORD")
                        .hide_env_values(true),
                )
                .arg(
                    Arg::new("check-timeout")
                        .long("check-timeout")
                        .help("Seconds to wait while verifying the recovery link")
                        .env("REAKIRI_CHECK_TIMEOUT")
                        .default_value("5")
                        .value_parser(clap::value_parser!(u64).range(1..)),
                )
                .arg(
                    Arg::new("update-timeout")
                        .long("update-timeout")
                        .help("Seconds to wait for the password update call")
                        .env("REAKIRI_UPDATE_TIMEOUT")
                        .default_value("15")
                        .value_parser(clap::value_parser!(u64).range(1..)),
                ),
        )
}
