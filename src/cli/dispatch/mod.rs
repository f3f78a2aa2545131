use crate::cli::{
    actions::{request, reset, Action},
    globals::GlobalArgs,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<(GlobalArgs, Action)> {
    let provider_url = matches
        .get_one::<String>("provider-url")
        .cloned()
        .context("missing required argument: --provider-url")?;

    let api_key = matches
        .get_one::<String>("api-key")
        .cloned()
        .context("missing required argument: --api-key")?;

    let mut globals = GlobalArgs::new(provider_url);
    globals.set_api_key(SecretString::from(api_key));

    let action = match matches.subcommand() {
        Some(("request", sub)) => {
            let email = sub
                .get_one::<String>("email")
                .cloned()
                .context("missing required argument: --email")?;
            let redirect_url = sub
                .get_one::<String>("redirect-url")
                .context("missing required argument: --redirect-url")?;
            let redirect_url = Url::parse(redirect_url).context("invalid REAKIRI_REDIRECT_URL")?;

            Action::Request(request::Args {
                email,
                redirect_url,
            })
        }
        Some(("reset", sub)) => {
            let url = sub
                .get_one::<String>("url")
                .cloned()
                .context("missing required argument: --url")?;
            let password = sub
                .get_one::<String>("password")
                .cloned()
                .map(SecretString::from)
                .context("missing required argument: --password")?;
            // Confirmation defaults to the password itself; an embedder with
            // two input fields passes both.
            let confirmation = sub
                .get_one::<String>("confirm")
                .cloned()
                .map_or_else(|| password.clone(), SecretString::from);
            let check_timeout = sub
                .get_one::<u64>("check-timeout")
                .copied()
                .map_or(crate::recovery::state::DEFAULT_CHECK_DEADLINE, Duration::from_secs);
            let update_timeout = sub
                .get_one::<u64>("update-timeout")
                .copied()
                .map_or(crate::recovery::password::DEFAULT_UPDATE_TIMEOUT, Duration::from_secs);

            Action::Reset(reset::Args {
                url,
                password,
                confirmation,
                check_timeout,
                update_timeout,
            })
        }
        _ => anyhow::bail!("missing subcommand"),
    };

    Ok((globals, action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;
    use secrecy::ExposeSecret;

    #[test]
    fn handler_builds_request_action() {
        let matches = commands::new().get_matches_from(vec![
            "reakiri",
            "--provider-url",
            "https://project.supabase.co",
            "--api-key",
            "anon-key",
            "request",
            "--email",
            "user@example.com",
            "--redirect-url",
            "https://app.example/reset-password",
        ]);

        let (globals, action) = handler(&matches).unwrap();
        assert_eq!(globals.provider_url, "https://project.supabase.co");
        assert_eq!(globals.api_key.expose_secret(), "anon-key");

        match action {
            Action::Request(args) => {
                assert_eq!(args.email, "user@example.com");
                assert_eq!(
                    args.redirect_url.as_str(),
                    "https://app.example/reset-password"
                );
            }
            Action::Reset(_) => panic!("expected a request action"),
        }
    }

    #[test]
    fn handler_builds_reset_action_with_defaults() {
        let matches = commands::new().get_matches_from(vec![
            "reakiri",
            "--provider-url",
            "https://project.supabase.co",
            "--api-key",
            "anon-key",
            "reset",
            "--url",
            "https://app.example/reset-password?code=abc",
            "--password",
            "NewPass1!",
        ]);

        let (_, action) = handler(&matches).unwrap();
        match action {
            Action::Reset(args) => {
                assert_eq!(args.url, "https://app.example/reset-password?code=abc");
                assert_eq!(
                    args.confirmation.expose_secret(),
                    args.password.expose_secret()
                );
                assert_eq!(args.check_timeout, Duration::from_secs(5));
                assert_eq!(args.update_timeout, Duration::from_secs(15));
            }
            Action::Request(_) => panic!("expected a reset action"),
        }
    }

    #[test]
    fn handler_rejects_bad_redirect_url() {
        let matches = commands::new().get_matches_from(vec![
            "reakiri",
            "--provider-url",
            "https://project.supabase.co",
            "--api-key",
            "anon-key",
            "request",
            "--email",
            "user@example.com",
            "--redirect-url",
            "not a url",
        ]);

        assert!(handler(&matches).is_err());
    }
}
